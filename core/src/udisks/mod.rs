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

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::definitions::Volume;
use crate::errors::MountError;
use crate::mount_service::MountService;

pub mod lsblk;
pub mod replies;

/// Mount service backed by the UDisks2 daemon through its command line clients:
/// `lsblk` for enumeration and `udisksctl` for mounting and unmounting.
#[derive(Debug, Clone)]
pub struct UdisksCtl {
    lsblk: PathBuf,
    udisksctl: PathBuf,
}

impl Default for UdisksCtl {
    fn default() -> Self {
        Self::new("lsblk", "udisksctl")
    }
}

impl UdisksCtl {
    pub fn new(lsblk: impl Into<PathBuf>, udisksctl: impl Into<PathBuf>) -> Self {
        Self { lsblk: lsblk.into(), udisksctl: udisksctl.into() }
    }

    async fn run<I, S>(program: &Path, args: I) -> Result<Output, MountError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        debug!("Running {:?}", command);
        command
            .output()
            .await
            .map_err(|e| MountError::ServiceUnavailable(format!("cannot run {:?}: {}", program, e)))
    }
}

/// Device nodes are created when the kernel detects the device, so their modification time is
/// a usable insertion timestamp.
fn detection_time(volume: &mut Volume) {
    if let Ok(modified) = std::fs::metadata(&volume.id).and_then(|m| m.modified()) {
        volume.detected_at = Some(modified);
    }
}

#[async_trait]
impl MountService for UdisksCtl {
    async fn list_removable_volumes(&self) -> Result<Vec<Volume>, MountError> {
        let args = ["--json", "--paths", "--output", lsblk::LSBLK_COLUMNS];
        let output = Self::run(&self.lsblk, args).await?;
        if !output.status.success() {
            return Err(MountError::ServiceUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut volumes = lsblk::parse_lsblk(&stdout)
            .map_err(|e| MountError::ServiceUnavailable(format!("unexpected lsblk output: {}", e)))?;
        volumes.iter_mut().for_each(detection_time);
        Ok(volumes)
    }

    async fn mount(&self, volume_id: &str) -> Result<PathBuf, MountError> {
        let args = ["mount", "--block-device", volume_id, "--no-user-interaction"];
        let output = Self::run(&self.udisksctl, args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            return replies::parse_mounted_at(&stdout).ok_or_else(|| {
                MountError::ServiceUnavailable(format!("unexpected udisksctl reply: {}", stdout.trim()))
            });
        }
        if let Some(mount_point) = replies::parse_already_mounted(&stderr) {
            return Ok(mount_point);
        }
        Err(replies::classify_error(&stderr))
    }

    async fn unmount(&self, volume_id: &str) -> Result<(), MountError> {
        let args = ["unmount", "--block-device", volume_id, "--no-user-interaction"];
        let output = Self::run(&self.udisksctl, args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(replies::classify_error(&String::from_utf8_lossy(&output.stderr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tools_mean_service_unavailable() {
        let service = UdisksCtl::new("/nonexistent/lsblk", "/nonexistent/udisksctl");
        assert!(matches!(
            service.list_removable_volumes().await,
            Err(MountError::ServiceUnavailable(_))
        ));
        assert!(matches!(service.mount("/dev/sdb1").await, Err(MountError::ServiceUnavailable(_))));
        assert!(matches!(service.unmount("/dev/sdb1").await, Err(MountError::ServiceUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn replies_of_a_scripted_udisksctl_are_interpreted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("udisksctl");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             if [ \"$1\" = mount ]; then echo \"Mounted $3 at /media/otc/STICK.\"; exit 0; fi\n\
             echo \"Error unmounting $3: GDBus.Error:org.freedesktop.UDisks2.Error.DeviceBusy: target is busy\" >&2\n\
             exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let service = UdisksCtl::new("lsblk", &script);
        assert_eq!(service.mount("/dev/sdb1").await.unwrap(), PathBuf::from("/media/otc/STICK"));
        assert!(matches!(service.unmount("/dev/sdb1").await, Err(MountError::DeviceBusy(_))));
    }
}
