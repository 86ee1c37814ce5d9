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

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};

use crate::definitions::Volume;
use crate::errors::MountError;
use crate::mount_service::MountService;

/// Mounts the chosen volume and releases it after the job.
pub struct MountCoordinator<M: MountService> {
    service: M,
    timeout: Duration,
    retry_delay: Duration,
}

impl<M: MountService> MountCoordinator<M> {
    pub fn new(service: M, timeout: Duration, retry_delay: Duration) -> Self {
        Self { service, timeout, retry_delay }
    }

    /// Returns the mount point of `volume`, mounting it first if needed.
    ///
    /// A volume that already reports a mount point is used as is, without asking the service.
    pub async fn ensure_mounted(&self, volume: &Volume) -> Result<PathBuf, MountError> {
        if let Some(mount_point) = &volume.mount_point {
            debug!("{} already mounted at {:?}", volume, mount_point);
            return Ok(mount_point.clone());
        }
        let mount_point = self.bounded("mount", self.service.mount(&volume.id)).await?;
        info!("Mounted {} at {:?}", volume, mount_point);
        Ok(mount_point)
    }

    /// Unmounts `volume`. A volume that is not mounted counts as success; a busy volume gets one
    /// more attempt after the retry delay.
    pub async fn ensure_unmounted(&self, volume: &Volume) -> Result<(), MountError> {
        match self.unmount_once(volume).await {
            Err(MountError::DeviceBusy(reason)) => {
                warn!("{} is busy ({}), retrying unmount in {:?}", volume, reason, self.retry_delay);
                tokio::time::sleep(self.retry_delay).await;
                self.unmount_once(volume).await
            }
            other => other,
        }
    }

    async fn unmount_once(&self, volume: &Volume) -> Result<(), MountError> {
        match self.bounded("unmount", self.service.unmount(&volume.id)).await {
            Ok(()) => {
                info!("Unmounted {}", volume);
                Ok(())
            }
            Err(MountError::NotMounted) => {
                debug!("{} was not mounted", volume);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, MountError>>,
    ) -> Result<T, MountError> {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            MountError::ServiceUnavailable(format!("no answer to {} within {:?}", operation, self.timeout))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeMountService;
    use std::path::Path;
    use std::sync::Arc;

    fn coordinator(service: &Arc<FakeMountService>) -> MountCoordinator<Arc<FakeMountService>> {
        MountCoordinator::new(service.clone(), Duration::from_secs(10), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn unmounted_volume_gets_mounted() {
        let service = FakeMountService::new(vec![]);
        service.mount_at("/dev/sdb1", "/media/otc/PHOTOS");
        let volume = Volume::new("/dev/sdb1", "exfat");
        let mount_point = coordinator(&service).ensure_mounted(&volume).await.unwrap();
        assert_eq!(mount_point, Path::new("/media/otc/PHOTOS"));
        assert_eq!(service.mount_calls(), 1);
    }

    #[tokio::test]
    async fn mounting_twice_calls_service_at_most_once() {
        let service = FakeMountService::new(vec![]);
        let c = coordinator(&service);
        let mut volume = Volume::new("/dev/sdb1", "vfat");
        let first = c.ensure_mounted(&volume).await.unwrap();
        volume.mount_point = Some(first.clone());
        let second = c.ensure_mounted(&volume).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.mount_calls(), 1);
    }

    #[tokio::test]
    async fn premounted_volume_is_not_remounted() {
        let service = FakeMountService::new(vec![]);
        let volume = Volume::new("/dev/sdb1", "vfat").with_mount_point("/mnt/usb");
        assert_eq!(coordinator(&service).ensure_mounted(&volume).await.unwrap(), Path::new("/mnt/usb"));
        assert_eq!(service.mount_calls(), 0);
    }

    #[tokio::test]
    async fn mount_errors_are_passed_through() {
        let service = FakeMountService::new(vec![]);
        service.queue_mount_error(MountError::NoFilesystem("/dev/sdb".into()));
        let volume = Volume::new("/dev/sdb", "vfat");
        assert_eq!(
            coordinator(&service).ensure_mounted(&volume).await,
            Err(MountError::NoFilesystem("/dev/sdb".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_mount_times_out() {
        let service = FakeMountService::new(vec![]);
        service.hang_mounting(true);
        let volume = Volume::new("/dev/sdb1", "vfat");
        assert!(matches!(
            coordinator(&service).ensure_mounted(&volume).await,
            Err(MountError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn not_mounted_counts_as_unmounted() {
        let service = FakeMountService::new(vec![]);
        service.queue_unmount_result(Err(MountError::NotMounted));
        let volume = Volume::new("/dev/sdb1", "vfat");
        assert_eq!(coordinator(&service).ensure_unmounted(&volume).await, Ok(()));
        assert_eq!(service.unmount_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_volume_is_retried_once() {
        let service = FakeMountService::new(vec![]);
        service.queue_unmount_result(Err(MountError::DeviceBusy("target is busy".into())));
        let volume = Volume::new("/dev/sdb1", "vfat");
        assert_eq!(coordinator(&service).ensure_unmounted(&volume).await, Ok(()));
        assert_eq!(service.unmount_calls(), 2);
        assert_eq!(service.unmounted(), vec!["/dev/sdb1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn persistently_busy_volume_reports_busy() {
        let service = FakeMountService::new(vec![]);
        service.queue_unmount_result(Err(MountError::DeviceBusy("busy".into())));
        service.queue_unmount_result(Err(MountError::DeviceBusy("still busy".into())));
        let volume = Volume::new("/dev/sdb1", "vfat");
        assert_eq!(
            coordinator(&service).ensure_unmounted(&volume).await,
            Err(MountError::DeviceBusy("still busy".into()))
        );
    }
}
