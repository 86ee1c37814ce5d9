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

use serde::Deserialize;

use crate::definitions::Volume;

/// Columns requested from `lsblk --json --paths`.
pub const LSBLK_COLUMNS: &str = "NAME,LABEL,FSTYPE,MOUNTPOINT,RM,HOTPLUG,TYPE";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<BlockDevice>,
}

/// lsblk prints flags as JSON booleans in recent util-linux releases and as "0"/"1" strings
/// in older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(u8),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Number(n) => *n != 0,
            Flag::Text(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    name: String,
    label: Option<String>,
    fstype: Option<String>,
    mountpoint: Option<String>,
    rm: Option<Flag>,
    hotplug: Option<Flag>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    children: Vec<BlockDevice>,
}

impl BlockDevice {
    fn is_removable(&self) -> bool {
        self.rm.as_ref().is_some_and(Flag::is_set) || self.hotplug.as_ref().is_some_and(Flag::is_set)
    }
}

/// Turns `lsblk` JSON output into the removable volumes carrying a filesystem.
///
/// A partition counts as removable when it or its disk is flagged removable or hot-pluggable.
pub fn parse_lsblk(json: &str) -> Result<Vec<Volume>, serde_json::Error> {
    let output: LsblkOutput = serde_json::from_str(json)?;
    let mut volumes = Vec::new();
    for device in &output.blockdevices {
        collect(device, None, false, &mut volumes);
    }
    Ok(volumes)
}

fn collect(device: &BlockDevice, drive: Option<&str>, parent_removable: bool, out: &mut Vec<Volume>) {
    let removable = parent_removable || device.is_removable();
    let is_disk = device.kind.as_deref() == Some("disk");
    if let Some(fs_type) = device.fstype.as_deref().filter(|fs| !fs.is_empty()) {
        if removable {
            let mut volume = Volume::new(device.name.clone(), fs_type);
            volume.label = device.label.clone().filter(|l| !l.is_empty());
            volume.mount_point = device
                .mountpoint
                .as_deref()
                .filter(|m| !m.is_empty())
                .map(PathBuf::from);
            volume.drive = if is_disk { Some(device.name.clone()) } else { drive.map(String::from) };
            out.push(volume);
        }
    }
    let child_drive = if is_disk { Some(device.name.as_str()) } else { drive };
    for child in &device.children {
        collect(child, child_drive, removable, out);
    }
}
