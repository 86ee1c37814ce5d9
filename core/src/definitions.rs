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

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

/// Edge reported by the copy button input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// A single raw button notification. Timestamps are taken from a monotonic clock when the
/// event is read, so the debouncer never sees time going backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub timestamp: Instant,
    pub edge: ButtonEdge,
}

impl ButtonEvent {
    pub fn pressed(timestamp: Instant) -> Self {
        Self { timestamp, edge: ButtonEdge::Pressed }
    }

    pub fn released(timestamp: Instant) -> Self {
        Self { timestamp, edge: ButtonEdge::Released }
    }
}

/// Logical "copy button pressed" event, emitted by the debouncer at most once per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger;

/// A removable storage volume as reported by the mount service.
///
/// Volumes are re-queried for every job; mount state may change between two presses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Identifier understood by the mount service (block device path on Linux).
    pub id: String,
    pub label: Option<String>,
    pub fs_type: String,
    pub mount_point: Option<PathBuf>,
    /// Disk the volume lives on, if the service knows it.
    pub drive: Option<String>,
    /// When the volume showed up, if the service knows it.
    pub detected_at: Option<SystemTime>,
}

impl Volume {
    pub fn new(id: impl Into<String>, fs_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            fs_type: fs_type.into(),
            mount_point: None,
            drive: None,
            detected_at: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = Some(mount_point.into());
        self
    }

    pub fn with_drive(mut self, drive: impl Into<String>) -> Self {
        self.drive = Some(drive.into());
        self
    }

    pub fn with_detected_at(mut self, detected_at: SystemTime) -> Self {
        self.detected_at = Some(detected_at);
        self
    }

    /// Name used for the per-volume destination directory: the label when there is a usable one,
    /// otherwise the last component of the device identifier.
    pub fn directory_name(&self) -> String {
        let sanitize = |s: &str| s.trim().replace(['/', '\0'], "_");
        if let Some(label) = self.label.as_deref().map(sanitize) {
            if !label.is_empty() && label != "." && label != ".." {
                return label;
            }
        }
        let id = self.id.rsplit('/').next().unwrap_or(&self.id);
        sanitize(id)
    }
}

impl Display for Volume {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({}, \"{}\")", self.id, self.fs_type, label),
            None => write!(f, "{} ({})", self.id, self.fs_type),
        }
    }
}

/// Modes understood by the LED backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    Blink,
    /// Steady light. Used for the short acknowledgement after a successful copy and, held longer,
    /// as the error indication.
    Solid,
}

/// Lifecycle of a copy job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
