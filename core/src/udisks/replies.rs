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

//! Interpretation of `udisksctl` output. UDisks2 reports failures as D-Bus error names embedded
//! in the message, e.g. `GDBus.Error:org.freedesktop.UDisks2.Error.DeviceBusy: ...`.

use std::path::PathBuf;

use crate::errors::MountError;

/// Extracts the mount point from `Mounted /dev/sdb1 at /media/user/LABEL` (some releases add
/// a trailing dot).
pub fn parse_mounted_at(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().find(|l| l.trim_start().starts_with("Mounted "))?;
    let (_, path) = line.split_once(" at ")?;
    let path = path.trim().trim_end_matches('.');
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Extracts the existing mount point from an `AlreadyMounted` error,
/// `... is already mounted at `/media/user/LABEL'.`
pub fn parse_already_mounted(stderr: &str) -> Option<PathBuf> {
    if !stderr.contains("AlreadyMounted") {
        return None;
    }
    let start = stderr.find('`')? + 1;
    let end = start + stderr[start..].find('\'')?;
    let path = &stderr[start..end];
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Maps a failed `udisksctl` invocation to the mount error taxonomy.
pub fn classify_error(stderr: &str) -> MountError {
    let message = stderr.trim().to_string();
    let has = |needle: &str| stderr.contains(needle);
    if has("NotAuthorized") || has("Not authorized") || has("Permission denied") {
        MountError::PermissionDenied(message)
    } else if has("NotMounted") || has("is not mounted") {
        MountError::NotMounted
    } else if has("DeviceBusy") || has("target is busy") || has("device is busy") {
        MountError::DeviceBusy(message)
    } else if has("NotSupported")
        || has("No usable filesystem")
        || has("doesn't implement")
        || has("unknown filesystem type")
        || has("wrong fs type")
    {
        MountError::NoFilesystem(message)
    } else {
        MountError::ServiceUnavailable(message)
    }
}
