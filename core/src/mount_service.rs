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
use std::sync::Arc;

use async_trait::async_trait;

use crate::definitions::Volume;
use crate::errors::MountError;

/// Request/response API of the system's device and mount manager.
///
/// Any call may hang or fail independently; callers bound every call with a timeout.
#[async_trait]
pub trait MountService: Send + Sync {
    /// Currently attached removable volumes. Only `ServiceUnavailable` is expected as an error.
    async fn list_removable_volumes(&self) -> Result<Vec<Volume>, MountError>;

    /// Mounts the volume and returns where it got mounted.
    async fn mount(&self, volume_id: &str) -> Result<PathBuf, MountError>;

    async fn unmount(&self, volume_id: &str) -> Result<(), MountError>;
}

#[async_trait]
impl<T: MountService + ?Sized> MountService for Arc<T> {
    async fn list_removable_volumes(&self) -> Result<Vec<Volume>, MountError> {
        (**self).list_removable_volumes().await
    }

    async fn mount(&self, volume_id: &str) -> Result<PathBuf, MountError> {
        (**self).mount(volume_id).await
    }

    async fn unmount(&self, volume_id: &str) -> Result<(), MountError> {
        (**self).unmount(volume_id).await
    }
}
