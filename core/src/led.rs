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

use log::{debug, warn};

use crate::config::LedConfig;
use crate::definitions::{JobStatus, LedMode};
use crate::orchestrator::{JobOutcome, OrchestratorState};

/// Write-only LED sink. No read-back, no acknowledgement.
pub trait LedBackend: Send + Sync {
    fn set_mode(&self, mode: LedMode) -> std::io::Result<()>;
}

/// LED exposed through the kernel LED class (`/sys/class/leds/<name>`).
pub struct SysfsLed {
    dir: PathBuf,
    blink_delay_ms: u64,
}

impl SysfsLed {
    pub fn new(dir: impl Into<PathBuf>, blink_delay_ms: u64) -> Self {
        Self { dir: dir.into(), blink_delay_ms }
    }

    pub fn from_config(config: &LedConfig) -> Self {
        Self::new(config.sysfs_root.join(&config.name), config.blink_delay_ms)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, attribute: &str, value: &str) -> std::io::Result<()> {
        let path = self.dir.join(attribute);
        std::fs::write(&path, value)?;
        debug!("Written {} to {:?}", value, path);
        Ok(())
    }
}

impl LedBackend for SysfsLed {
    fn set_mode(&self, mode: LedMode) -> std::io::Result<()> {
        match mode {
            LedMode::Off => {
                self.write("trigger", "none")?;
                self.write("brightness", "0")
            }
            LedMode::Solid => {
                self.write("trigger", "none")?;
                self.write("brightness", "1")
            }
            LedMode::Blink => {
                let delay = self.blink_delay_ms.to_string();
                self.write("trigger", "timer")?;
                self.write("brightness", "1")?;
                self.write("delay_on", &delay)?;
                self.write("delay_off", &delay)
            }
        }
    }
}

/// LED mode for a given orchestrator state.
///
/// `Done` shows the solid light for successes (acknowledgement pulse) and failures (error hold);
/// the orchestrator decides how long it stays on. A cancelled job just goes dark.
pub fn mode_for(state: &OrchestratorState) -> LedMode {
    match state {
        OrchestratorState::Idle | OrchestratorState::Resolving => LedMode::Off,
        OrchestratorState::Mounting
        | OrchestratorState::Copying
        | OrchestratorState::Unmounting => LedMode::Blink,
        OrchestratorState::Done(outcome) => match outcome {
            JobOutcome::ResolveFailed(_) | JobOutcome::MountFailed(_) => LedMode::Solid,
            JobOutcome::Finished { status: JobStatus::Cancelled, .. } => LedMode::Off,
            JobOutcome::Finished { .. } => LedMode::Solid,
        },
    }
}

/// Pushes LED modes to the backend. Backend failures are logged and otherwise ignored.
pub struct LedController<B: LedBackend> {
    backend: B,
}

impl<B: LedBackend> LedController<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Sends `mode` to the backend. Every call writes, so a backend that lost its state catches
    /// up on the next transition.
    pub fn show(&self, mode: LedMode) {
        if let Err(e) = self.backend.set_mode(mode) {
            warn!("Failed to set LED to {:?}: {}", mode, e);
        }
    }
}
