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

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No eligible removable volume attached")]
    NoDevice,

    #[error("More than one eligible volume attached: {}", .0.join(", "))]
    Ambiguous(Vec<String>),

    #[error("Mount service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No mountable filesystem: {0}")]
    NoFilesystem(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Reply of the mount service to an unmount request for a volume that is not mounted.
    /// Never surfaces from the mount coordinator.
    #[error("Volume is not mounted")]
    NotMounted,

    #[error("Mount service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    /// Non-fatal: one entry could not be copied, the job goes on with the next one.
    #[error("Failed to copy {path:?}: {reason}")]
    PerItemFailure { path: PathBuf, reason: String },

    #[error("Source {path:?} cannot be read: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Destination {0:?} is full")]
    DestinationFull(PathBuf),

    #[error("Destination {path:?} is unavailable: {reason}")]
    DestinationUnavailable { path: PathBuf, reason: String },
}

impl CopyError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CopyError::PerItemFailure { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input device {name:?} not found")]
    DeviceNotFound { name: String },

    #[error("Failed to open input device {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input device read failed: {0}")]
    Read(#[from] std::io::Error),
}
