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

use log::{debug, info, warn};

use crate::config::{AmbiguousPolicy, OtcConfig};
use crate::definitions::Volume;
use crate::errors::{MountError, ResolveError};
use crate::mount_service::MountService;

/// Mount points that belong to the appliance itself.
const SYSTEM_MOUNT_POINTS: [&str; 3] = ["/", "/boot", "/boot/efi"];

/// Eligibility rules applied to the volumes reported by the mount service.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub allowed_filesystems: BTreeSet<String>,
    pub excluded_devices: BTreeSet<String>,
    pub port_device: Option<PathBuf>,
    pub ambiguous_policy: AmbiguousPolicy,
    pub timeout: Duration,
}

impl ResolverSettings {
    pub fn from_config(config: &OtcConfig) -> Self {
        Self {
            allowed_filesystems: config.allowed_filesystems.clone(),
            excluded_devices: config.excluded_devices.clone(),
            port_device: config.port_device.clone(),
            ambiguous_policy: config.ambiguous_policy,
            timeout: config.mount_timeout(),
        }
    }
}

/// Finds the single volume a button press refers to.
pub struct DeviceResolver<M: MountService> {
    service: M,
    settings: ResolverSettings,
}

impl<M: MountService> DeviceResolver<M> {
    pub fn new(service: M, settings: ResolverSettings) -> Self {
        Self { service, settings }
    }

    /// Queries the mount service and classifies the eligible volumes. Read-only.
    pub async fn resolve(&self) -> Result<Volume, ResolveError> {
        let listed = tokio::time::timeout(self.settings.timeout, self.service.list_removable_volumes())
            .await
            .map_err(|_| {
                ResolveError::ServiceUnavailable(format!(
                    "no answer to volume listing within {:?}",
                    self.settings.timeout
                ))
            })?
            .map_err(|e| match e {
                MountError::ServiceUnavailable(reason) => ResolveError::ServiceUnavailable(reason),
                other => ResolveError::ServiceUnavailable(other.to_string()),
            })?;

        let port_drive = match &self.settings.port_device {
            Some(link) => match tokio::fs::canonicalize(link).await {
                Ok(target) => Some(target),
                Err(e) => {
                    debug!("Front port link {:?} does not resolve: {}", link, e);
                    return Err(ResolveError::NoDevice);
                }
            },
            None => None,
        };

        let mut eligible: Vec<Volume> = listed
            .into_iter()
            .filter(|v| self.is_eligible(v, port_drive.as_deref()))
            .collect();

        match eligible.len() {
            0 => Err(ResolveError::NoDevice),
            1 => Ok(eligible.remove(0)),
            _ => self.pick_among(eligible),
        }
    }

    fn is_eligible(&self, volume: &Volume, port_drive: Option<&Path>) -> bool {
        if !self.settings.allowed_filesystems.contains(&volume.fs_type) {
            debug!("Skipping {}: filesystem not allowed", volume);
            return false;
        }
        if self.settings.excluded_devices.contains(&volume.id) {
            debug!("Skipping {}: excluded", volume);
            return false;
        }
        if let Some(mount_point) = &volume.mount_point {
            if SYSTEM_MOUNT_POINTS.iter().any(|system| mount_point == Path::new(system)) {
                debug!("Skipping {}: system volume", volume);
                return false;
            }
        }
        if let Some(port_drive) = port_drive {
            let on_port = volume.drive.as_deref().map(Path::new) == Some(port_drive)
                || Path::new(&volume.id) == port_drive;
            if !on_port {
                debug!("Skipping {}: not on the front port", volume);
                return false;
            }
        }
        true
    }

    fn pick_among(&self, candidates: Vec<Volume>) -> Result<Volume, ResolveError> {
        let ids = || candidates.iter().map(|v| v.id.clone()).collect::<Vec<_>>();
        match self.settings.ambiguous_policy {
            AmbiguousPolicy::Refuse => Err(ResolveError::Ambiguous(ids())),
            AmbiguousPolicy::MostRecent => {
                if candidates.iter().any(|v| v.detected_at.is_none()) {
                    warn!("Cannot tell which volume was inserted last");
                    return Err(ResolveError::Ambiguous(ids()));
                }
                let newest = candidates
                    .iter()
                    .max_by_key(|v| v.detected_at)
                    .cloned()
                    .ok_or(ResolveError::NoDevice)?;
                info!("Several volumes attached, picking the most recent one: {}", newest);
                Ok(newest)
            }
        }
    }
}
