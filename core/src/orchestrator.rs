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
use tokio::select;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::config::OtcConfig;
use crate::copy_engine::{CopyEngine, CopyHandle, CopyJob, CopySettings};
use crate::definitions::{JobStatus, LedMode, Trigger, Volume};
use crate::errors::{MountError, ResolveError};
use crate::led::{mode_for, LedBackend, LedController};
use crate::mount_coordinator::MountCoordinator;
use crate::mount_service::MountService;
use crate::resolver::{DeviceResolver, ResolverSettings};
use crate::service::{spawn_service, ServiceHandle, StopHandle};

/// How a job attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    ResolveFailed(ResolveError),
    MountFailed(MountError),
    /// The copy ran (or was skipped because of shutdown) and teardown was attempted.
    Finished { status: JobStatus, failed_items: usize },
}

impl JobOutcome {
    fn is_clean_success(&self) -> bool {
        matches!(self, JobOutcome::Finished { status: JobStatus::Succeeded, failed_items: 0 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Resolving,
    Mounting,
    Copying,
    Unmounting,
    /// Terminal per job, immediately followed by `Idle`.
    Done(JobOutcome),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub copy_destination: PathBuf,
    pub per_volume_subdirectory: bool,
    pub leave_premounted: bool,
    /// How long the LED stays solid after a clean success.
    pub ack_pulse: Duration,
    /// How long the LED stays solid after a failed or partial job.
    pub error_hold: Duration,
}

impl OrchestratorSettings {
    pub fn new(copy_destination: impl Into<PathBuf>) -> Self {
        Self {
            copy_destination: copy_destination.into(),
            per_volume_subdirectory: true,
            leave_premounted: false,
            ack_pulse: Duration::from_millis(1500),
            error_hold: Duration::from_millis(5000),
        }
    }

    /// Expects a validated configuration; a missing destination falls back to the current directory.
    pub fn from_config(config: &OtcConfig) -> Self {
        Self {
            copy_destination: config.copy_destination.clone().unwrap_or_default(),
            per_volume_subdirectory: config.per_volume_subdirectory,
            leave_premounted: config.leave_premounted,
            ack_pulse: Duration::from_millis(config.led.ack_pulse_ms),
            error_hold: Duration::from_millis(config.led.error_hold_ms),
        }
    }
}

/// Owns the job state machine. Triggers arrive on a queue; resolving, mounting and unmounting
/// are awaited in place, the copy runs on its own task so a re-press can cancel it.
pub struct Orchestrator<M: MountService + Clone, B: LedBackend> {
    triggers: mpsc::Receiver<Trigger>,
    triggers_open: bool,
    resolver: DeviceResolver<M>,
    mounts: MountCoordinator<M>,
    engine: CopyEngine,
    led: LedController<B>,
    settings: OrchestratorSettings,
    state: OrchestratorState,
    state_tx: broadcast::Sender<OrchestratorState>,
    led_hold: Option<Instant>,
    stopping: bool,
}

impl<M: MountService + Clone + 'static, B: LedBackend + 'static> Orchestrator<M, B> {
    pub fn new(
        triggers: mpsc::Receiver<Trigger>,
        service: M,
        led: B,
        resolver_settings: ResolverSettings,
        copy_settings: CopySettings,
        retry_delay: Duration,
        settings: OrchestratorSettings,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        let timeout = resolver_settings.timeout;
        Self {
            triggers,
            triggers_open: true,
            resolver: DeviceResolver::new(service.clone(), resolver_settings),
            mounts: MountCoordinator::new(service, timeout, retry_delay),
            engine: CopyEngine::new(copy_settings),
            led: LedController::new(led),
            settings,
            state: OrchestratorState::Idle,
            state_tx,
            led_hold: None,
            stopping: false,
        }
    }

    pub fn from_config(config: &OtcConfig, triggers: mpsc::Receiver<Trigger>, service: M, led: B) -> Self {
        Self::new(
            triggers,
            service,
            led,
            ResolverSettings::from_config(config),
            CopySettings { update_only: config.update_only },
            config.unmount_retry_delay(),
            OrchestratorSettings::from_config(config),
        )
    }

    /// Receives every state the orchestrator enters.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    /// Spawns the event loop. Shutting the handle down cancels an active copy and tears the
    /// mount down before the task ends.
    pub fn run(mut self) -> ServiceHandle {
        spawn_service(move |mut stop| async move {
            self.led.show(LedMode::Off);
            info!("Orchestrator started, waiting for the copy button");
            while !self.stopping {
                let hold = self.led_hold;
                select! {
                    biased;
                    _ = stop.signaled() => {
                        info!("Orchestrator shutdown requested");
                        self.stopping = true;
                    }
                    _ = sleep_until(hold.unwrap_or_else(Instant::now)), if hold.is_some() => {
                        self.led_hold = None;
                        self.led.show(mode_for(&self.state));
                    }
                    trigger = self.triggers.recv(), if self.triggers_open => {
                        match trigger {
                            Some(Trigger) => self.run_job(&mut stop).await,
                            None => {
                                info!("Trigger source closed, no further jobs will start");
                                self.triggers_open = false;
                            }
                        }
                    }
                }
            }
            self.led_hold = None;
            self.led.show(LedMode::Off);
            info!("Orchestrator stopped");
        })
    }

    fn transition(&mut self, state: OrchestratorState) {
        debug!("Orchestrator state {:?} -> {:?}", self.state, state);
        let mode = if state == OrchestratorState::Idle && self.led_hold.is_some() {
            LedMode::Solid
        } else {
            self.led_hold = None;
            mode_for(&state)
        };
        self.led.show(mode);
        self.state = state.clone();
        let _ = self.state_tx.send(state);
    }

    fn finish(&mut self, id: &Uuid, outcome: JobOutcome) {
        let hold = match &outcome {
            JobOutcome::Finished { status: JobStatus::Cancelled, .. } => None,
            o if o.is_clean_success() => Some(self.settings.ack_pulse),
            _ => Some(self.settings.error_hold),
        };
        info!("Job {}: done ({:?})", id, outcome);
        self.transition(OrchestratorState::Done(outcome));
        self.led_hold = hold.map(|d| Instant::now() + d);
        self.transition(OrchestratorState::Idle);
    }

    fn destination_for(&self, volume: &Volume) -> PathBuf {
        if self.settings.per_volume_subdirectory {
            self.settings.copy_destination.join(volume.directory_name())
        } else {
            self.settings.copy_destination.clone()
        }
    }

    async fn run_job(&mut self, stop: &mut StopHandle) {
        let id = Uuid::new_v4();
        info!("Job {}: started", id);

        self.transition(OrchestratorState::Resolving);
        let resolved = guarded(
            &id,
            "resolving",
            &mut self.triggers,
            &mut self.triggers_open,
            stop,
            &mut self.stopping,
            self.resolver.resolve(),
        )
        .await;
        let volume = match resolved {
            Ok(volume) => volume,
            Err(e) => {
                warn!("Job {}: no copy source: {}", id, e);
                self.finish(&id, JobOutcome::ResolveFailed(e));
                return;
            }
        };
        info!("Job {}: using {}", id, volume);

        self.transition(OrchestratorState::Mounting);
        let premounted = volume.mount_point.is_some();
        let mounted = guarded(
            &id,
            "mounting",
            &mut self.triggers,
            &mut self.triggers_open,
            stop,
            &mut self.stopping,
            self.mounts.ensure_mounted(&volume),
        )
        .await;
        let mount_point = match mounted {
            Ok(mount_point) => mount_point,
            Err(e) => {
                warn!("Job {}: cannot mount {}: {}", id, volume, e);
                self.finish(&id, JobOutcome::MountFailed(e));
                return;
            }
        };

        let (status, failed_items) = if self.stopping {
            info!("Job {}: shutting down, copy not started", id);
            (JobStatus::Cancelled, 0)
        } else {
            let destination = self.destination_for(&volume);
            self.transition(OrchestratorState::Copying);
            let mut handle = self.engine.start(id, &mount_point, &destination);
            let job = self.supervise_copy(&id, &mut handle, stop).await;
            (job.status, job.summary.failed_items)
        };

        self.transition(OrchestratorState::Unmounting);
        if premounted && self.settings.leave_premounted {
            info!("Job {}: {} was mounted before the job, leaving it mounted", id, volume);
        } else {
            let unmounted = guarded(
                &id,
                "unmounting",
                &mut self.triggers,
                &mut self.triggers_open,
                stop,
                &mut self.stopping,
                self.mounts.ensure_unmounted(&volume),
            )
            .await;
            if let Err(e) = unmounted {
                warn!("Job {}: could not unmount {}, it may need a manual unmount: {}", id, volume, e);
            }
        }

        self.finish(&id, JobOutcome::Finished { status, failed_items });
    }

    /// Waits for the copy while treating the first press (or a shutdown) as a cancel request.
    async fn supervise_copy(&mut self, id: &Uuid, handle: &mut CopyHandle, stop: &mut StopHandle) -> CopyJob {
        loop {
            select! {
                biased;
                job = handle.wait() => {
                    drain_ignored(id, "copying", &mut self.triggers, &mut self.triggers_open);
                    return job;
                }
                _ = stop.signaled(), if !self.stopping => {
                    self.stopping = true;
                    if !handle.is_cancelled() {
                        info!("Job {}: shutdown requested, cancelling copy", id);
                        handle.cancel();
                    }
                }
                trigger = self.triggers.recv(), if self.triggers_open => {
                    match trigger {
                        Some(Trigger) if !handle.is_cancelled() => {
                            info!("Job {}: copy button pressed during copy, cancelling ({} bytes copied)", id, handle.bytes_copied());
                            handle.cancel();
                        }
                        Some(Trigger) => debug!("Job {}: already cancelling, press ignored", id),
                        None => self.triggers_open = false,
                    }
                }
            }
        }
    }
}

/// Presses already queued when a phase ends belong to that phase and are dropped.
fn drain_ignored(id: &Uuid, phase: &str, triggers: &mut mpsc::Receiver<Trigger>, triggers_open: &mut bool) {
    loop {
        match triggers.try_recv() {
            Ok(Trigger) => info!("Job {}: copy button ignored while {}", id, phase),
            Err(mpsc::error::TryRecvError::Empty) => break,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                *triggers_open = false;
                break;
            }
        }
    }
}

/// Drives `call` to completion while logging presses that cannot be acted upon in this phase and
/// remembering a shutdown request for later.
async fn guarded<F: Future>(
    id: &Uuid,
    phase: &str,
    triggers: &mut mpsc::Receiver<Trigger>,
    triggers_open: &mut bool,
    stop: &mut StopHandle,
    stopping: &mut bool,
    call: F,
) -> F::Output {
    tokio::pin!(call);
    loop {
        select! {
            biased;
            out = &mut call => {
                drain_ignored(id, phase, triggers, triggers_open);
                return out;
            }
            _ = stop.signaled(), if !*stopping => {
                info!("Job {}: shutdown requested, finishing {} first", id, phase);
                *stopping = true;
            }
            trigger = triggers.recv(), if *triggers_open => {
                match trigger {
                    Some(Trigger) => info!("Job {}: copy button ignored while {}", id, phase),
                    None => *triggers_open = false,
                }
            }
        }
    }
}
