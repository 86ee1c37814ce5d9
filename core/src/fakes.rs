// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory stand-ins for the hardware and system services, shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::debouncer::ButtonSource;
use crate::definitions::{ButtonEvent, LedMode, Volume};
use crate::errors::{InputError, MountError};
use crate::led::LedBackend;
use crate::mount_service::MountService;

pub struct ChannelButtonSource {
    events: mpsc::UnboundedReceiver<Result<ButtonEvent, InputError>>,
}

impl ChannelButtonSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<ButtonEvent, InputError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { events: rx }, tx)
    }
}

#[async_trait]
impl ButtonSource for ChannelButtonSource {
    async fn next_event(&mut self) -> Result<ButtonEvent, InputError> {
        match self.events.recv().await {
            Some(event) => event,
            None => Err(InputError::Read(io::Error::new(io::ErrorKind::UnexpectedEof, "event feed closed"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingLed {
    modes: Arc<Mutex<Vec<LedMode>>>,
}

impl RecordingLed {
    pub fn modes(&self) -> Vec<LedMode> {
        self.modes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<LedMode> {
        self.modes.lock().unwrap().last().copied()
    }
}

impl LedBackend for RecordingLed {
    fn set_mode(&self, mode: LedMode) -> io::Result<()> {
        self.modes.lock().unwrap().push(mode);
        Ok(())
    }
}

/// Scriptable mount service. Mounts succeed at `/media/<device name>` unless a mount point or an
/// error was queued for the volume.
#[derive(Default)]
pub struct FakeMountService {
    volumes: Mutex<Vec<Volume>>,
    list_error: Mutex<Option<MountError>>,
    mount_points: Mutex<HashMap<String, PathBuf>>,
    mount_errors: Mutex<VecDeque<MountError>>,
    unmount_results: Mutex<VecDeque<Result<(), MountError>>>,
    unmounted: Mutex<Vec<String>>,
    hang_list: AtomicBool,
    hang_mount: AtomicBool,
    list_calls: AtomicUsize,
    mount_calls: AtomicUsize,
    unmount_calls: AtomicUsize,
}

impl FakeMountService {
    pub fn new(volumes: Vec<Volume>) -> Arc<Self> {
        Arc::new(Self { volumes: Mutex::new(volumes), ..Default::default() })
    }

    pub fn set_volumes(&self, volumes: Vec<Volume>) {
        *self.volumes.lock().unwrap() = volumes;
    }

    pub fn fail_listing(&self, error: MountError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    pub fn hang_listing(&self, hang: bool) {
        self.hang_list.store(hang, Ordering::SeqCst);
    }

    pub fn hang_mounting(&self, hang: bool) {
        self.hang_mount.store(hang, Ordering::SeqCst);
    }

    pub fn mount_at(&self, volume_id: &str, mount_point: impl Into<PathBuf>) {
        self.mount_points.lock().unwrap().insert(volume_id.to_string(), mount_point.into());
    }

    pub fn queue_mount_error(&self, error: MountError) {
        self.mount_errors.lock().unwrap().push_back(error);
    }

    pub fn queue_unmount_result(&self, result: Result<(), MountError>) {
        self.unmount_results.lock().unwrap().push_back(result);
    }

    pub fn unmounted(&self) -> Vec<String> {
        self.unmounted.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountService for FakeMountService {
    async fn list_removable_volumes(&self) -> Result<Vec<Volume>, MountError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_list.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.volumes.lock().unwrap().clone())
    }

    async fn mount(&self, volume_id: &str) -> Result<PathBuf, MountError> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_mount.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.mount_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let scripted = self.mount_points.lock().unwrap().get(volume_id).cloned();
        Ok(scripted.unwrap_or_else(|| {
            let name = volume_id.rsplit('/').next().unwrap_or(volume_id);
            PathBuf::from("/media").join(name)
        }))
    }

    async fn unmount(&self, volume_id: &str) -> Result<(), MountError> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.unmount_results.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.unmounted.lock().unwrap().push(volume_id.to_string());
        }
        result
    }
}
