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

use anyhow::Context;
use log::info;
use tokio::sync::mpsc;

use crate::config::OtcConfig;
use crate::debouncer::{run_button_watch, ButtonSource, Debouncer};
use crate::input::EvdevButton;
use crate::led::{LedBackend, SysfsLed};
use crate::mount_service::MountService;
use crate::orchestrator::Orchestrator;
use crate::service::MultiServiceHandle;
use crate::udisks::UdisksCtl;

/// Presses beyond this many pending triggers are dropped by the button watch.
const TRIGGER_QUEUE: usize = 4;

/// Creates the copy destination directory. The configuration must have been validated.
pub fn prepare_destination(config: &OtcConfig) -> anyhow::Result<PathBuf> {
    let destination = config
        .copy_destination
        .clone()
        .context("copy destination is not configured")?;
    std::fs::create_dir_all(&destination)
        .with_context(|| format!("cannot create copy destination {:?}", destination))?;
    Ok(destination)
}

/// Wires the given backends together and starts the button watch and the orchestrator.
///
/// The button watch is registered first so that, on shutdown, no new trigger can arrive while
/// the orchestrator tears down an active job.
pub fn start_service<S, M, B>(config: &OtcConfig, source: S, service: M, led: B) -> MultiServiceHandle
where
    S: ButtonSource + 'static,
    M: MountService + Clone + 'static,
    B: LedBackend + 'static,
{
    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
    let mut handles = MultiServiceHandle::with_capacity(2);
    handles.add(run_button_watch(source, Debouncer::new(config.debounce_window()), trigger_tx));
    handles.add(Orchestrator::from_config(config, trigger_rx, service, led).run());
    handles
}

/// Starts the daemon on the real hardware: evdev button, UDisks2 and the sysfs LED.
pub fn run_service(config: &OtcConfig) -> anyhow::Result<MultiServiceHandle> {
    let button = EvdevButton::from_config(&config.input).context("cannot open the copy button")?;
    let led = SysfsLed::from_config(&config.led);
    info!("Driving LED at {:?}", led.dir());
    Ok(start_service(config, button, Arc::new(UdisksCtl::default()), led))
}
