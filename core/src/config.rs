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

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/onetouchcopy/config.toml";

/// `BTN_2`, the code the qnap8528 kernel module reports for the copy button.
pub const DEFAULT_KEY_CODE: u16 = 0x102;

/// udev link the appliance creates for the disk behind the front USB port.
pub const DEFAULT_PORT_DEVICE: &str = "/dev/qnap-one-touch-copy";

/// What to do when more than one eligible volume is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousPolicy {
    /// Refuse to guess and fail the job.
    #[default]
    Refuse,
    /// Pick the volume that was detected last.
    MostRecent,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Explicit evdev node. Takes priority over `name`.
    pub device: Option<PathBuf>,
    /// Name of the evdev device to look for when no explicit node is given.
    pub name: String,
    pub key_code: u16,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: None,
            name: "qnap8528".to_string(),
            key_code: DEFAULT_KEY_CODE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedConfig {
    pub sysfs_root: PathBuf,
    pub name: String,
    pub blink_delay_ms: u64,
    pub ack_pulse_ms: u64,
    pub error_hold_ms: u64,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/leds"),
            name: "qnap8528::usb".to_string(),
            blink_delay_ms: 200,
            ack_pulse_ms: 1500,
            error_hold_ms: 5000,
        }
    }
}

/// Daemon configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtcConfig {
    pub debounce_ms: u64,
    pub copy_destination: Option<PathBuf>,
    pub allowed_filesystems: BTreeSet<String>,
    pub mount_timeout_s: u64,
    pub unmount_retry_delay_s: u64,
    pub ambiguous_policy: AmbiguousPolicy,
    pub per_volume_subdirectory: bool,
    pub update_only: bool,
    pub leave_premounted: bool,
    /// Only volumes on the disk this link points to are eligible. `""` in the file disables it.
    #[serde(deserialize_with = "empty_path_is_none")]
    pub port_device: Option<PathBuf>,
    pub excluded_devices: BTreeSet<String>,
    pub input: InputConfig,
    pub led: LedConfig,
}

impl Default for OtcConfig {
    fn default() -> Self {
        let allowed_filesystems = [
            "vfat", "exfat", "ntfs", "ntfs3", "ext4", "ext3", "ext2", "btrfs", "xfs", "hfsplus",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self {
            debounce_ms: 300,
            copy_destination: None,
            allowed_filesystems,
            mount_timeout_s: 10,
            unmount_retry_delay_s: 2,
            ambiguous_policy: AmbiguousPolicy::Refuse,
            per_volume_subdirectory: true,
            update_only: true,
            leave_premounted: false,
            port_device: Some(PathBuf::from(DEFAULT_PORT_DEVICE)),
            excluded_devices: BTreeSet::new(),
            input: InputConfig::default(),
            led: LedConfig::default(),
        }
    }
}

fn empty_path_is_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
    let path = PathBuf::deserialize(deserializer)?;
    Ok(if path.as_os_str().is_empty() { None } else { Some(path) })
}

impl OtcConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configuration file. A missing file yields the defaults, any other read error is
    /// reported.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Read { path: path.to_path_buf(), source }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let destination = self
            .copy_destination
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("copy destination is not set".to_string()))?;
        if !destination.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "copy destination {:?} is not an absolute path",
                destination
            )));
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be greater than 0".to_string()));
        }
        if self.mount_timeout_s == 0 {
            return Err(ConfigError::Invalid("mount_timeout_s must be greater than 0".to_string()));
        }
        if self.allowed_filesystems.is_empty() {
            return Err(ConfigError::Invalid("allowed_filesystems is empty".to_string()));
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_secs(self.mount_timeout_s)
    }

    pub fn unmount_retry_delay(&self) -> Duration {
        Duration::from_secs(self.unmount_retry_delay_s)
    }
}
