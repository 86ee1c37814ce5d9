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

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use evdev::{Device, EventStream, EventType, InputEvent};
use log::{debug, info};

use crate::config::InputConfig;
use crate::debouncer::ButtonSource;
use crate::definitions::{ButtonEdge, ButtonEvent};
use crate::errors::InputError;

const KEY_RELEASED: i32 = 0;
const KEY_PRESSED: i32 = 1;

/// Copy button backed by a Linux evdev input node.
pub struct EvdevButton {
    stream: EventStream,
    key_code: u16,
}

impl EvdevButton {
    pub fn open(path: &Path, key_code: u16) -> Result<Self, InputError> {
        let device = Device::open(path).map_err(|source| InputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_device(device, path, key_code)
    }

    /// Opens the configured node, or looks the device up by name.
    pub fn from_config(config: &InputConfig) -> Result<Self, InputError> {
        if let Some(path) = &config.device {
            return Self::open(path, config.key_code);
        }
        let (path, device) = find_device_by_name(&config.name)?;
        info!("Using input device {:?} ({})", path, config.name);
        Self::from_device(device, &path, config.key_code)
    }

    fn from_device(device: Device, path: &Path, key_code: u16) -> Result<Self, InputError> {
        let stream = device.into_event_stream().map_err(|source| InputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { stream, key_code })
    }
}

fn find_device_by_name(name: &str) -> Result<(PathBuf, Device), InputError> {
    evdev::enumerate()
        .find(|(_, device)| device.name() == Some(name))
        .ok_or_else(|| InputError::DeviceNotFound { name: name.to_string() })
}

/// Maps a raw input event to a button edge. Autorepeat and unrelated events yield `None`.
pub(crate) fn decode_key_event(
    event_type: EventType,
    code: u16,
    value: i32,
    key_code: u16,
) -> Option<ButtonEdge> {
    if event_type != EventType::KEY || code != key_code {
        return None;
    }
    match value {
        KEY_PRESSED => Some(ButtonEdge::Pressed),
        KEY_RELEASED => Some(ButtonEdge::Released),
        _ => None,
    }
}

#[async_trait]
impl ButtonSource for EvdevButton {
    async fn next_event(&mut self) -> Result<ButtonEvent, InputError> {
        loop {
            let event: InputEvent = self.stream.next_event().await?;
            if let Some(edge) =
                decode_key_event(event.event_type(), event.code(), event.value(), self.key_code)
            {
                debug!("Copy button edge: {:?}", edge);
                return Ok(ButtonEvent { timestamp: Instant::now(), edge });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_KEY_CODE;

    #[test]
    fn key_edges_are_decoded() {
        assert_eq!(
            decode_key_event(EventType::KEY, DEFAULT_KEY_CODE, 1, DEFAULT_KEY_CODE),
            Some(ButtonEdge::Pressed)
        );
        assert_eq!(
            decode_key_event(EventType::KEY, DEFAULT_KEY_CODE, 0, DEFAULT_KEY_CODE),
            Some(ButtonEdge::Released)
        );
    }

    #[test]
    fn autorepeat_and_other_events_are_skipped() {
        assert_eq!(decode_key_event(EventType::KEY, DEFAULT_KEY_CODE, 2, DEFAULT_KEY_CODE), None);
        assert_eq!(decode_key_event(EventType::KEY, 0x101, 1, DEFAULT_KEY_CODE), None);
        assert_eq!(decode_key_event(EventType::SYNCHRONIZATION, 0, 0, DEFAULT_KEY_CODE), None);
    }

    #[test]
    fn missing_node_is_reported() {
        let err = EvdevButton::open(Path::new("/nonexistent/event99"), DEFAULT_KEY_CODE)
            .err()
            .unwrap();
        assert!(matches!(err, InputError::Open { .. }));
    }
}
