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

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::select;
use tokio::sync::mpsc;

use crate::definitions::{ButtonEdge, ButtonEvent, Trigger};
use crate::errors::InputError;
use crate::service::{spawn_service, ServiceHandle};

/// Source of raw button notifications.
#[async_trait]
pub trait ButtonSource: Send {
    /// Waits for the next press or release edge of the copy button.
    async fn next_event(&mut self) -> Result<ButtonEvent, InputError>;
}

/// Collapses noisy press edges into logical triggers.
///
/// A press edge yields a trigger unless it falls within `window` of the previously emitted
/// trigger. Release edges are ignored. Dropped presses do not extend the window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_trigger: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_trigger: None }
    }

    pub fn on_event(&mut self, event: &ButtonEvent) -> Option<Trigger> {
        if event.edge != ButtonEdge::Pressed {
            return None;
        }
        if let Some(last) = self.last_trigger {
            if event.timestamp.saturating_duration_since(last) < self.window {
                return None;
            }
        }
        self.last_trigger = Some(event.timestamp);
        Some(Trigger)
    }
}

/// Reads the button source, debounces it and forwards triggers to the orchestrator.
///
/// The task ends when the source fails, the receiving side goes away or a shutdown is requested.
pub fn run_button_watch<S>(
    mut source: S,
    mut debouncer: Debouncer,
    triggers: mpsc::Sender<Trigger>,
) -> ServiceHandle
where
    S: ButtonSource + 'static,
{
    spawn_service(move |mut stop| async move {
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    debug!("Shutdown requested, stopping button watch");
                    break;
                }
                event = source.next_event() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            error!("Copy button input failed, no further presses will be handled: {}", e);
                            break;
                        }
                    };
                    let Some(trigger) = debouncer.on_event(&event) else {
                        continue;
                    };
                    info!("Copy button pressed");
                    match triggers.try_send(trigger) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("Trigger queue full, dropping button press");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!("Trigger receiver closed, stopping button watch");
                            break;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ChannelButtonSource;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_press_triggers() {
        let mut d = Debouncer::new(ms(300));
        assert_eq!(d.on_event(&ButtonEvent::pressed(Instant::now())), Some(Trigger));
    }

    #[test]
    fn releases_are_ignored() {
        let mut d = Debouncer::new(ms(300));
        let t0 = Instant::now();
        assert_eq!(d.on_event(&ButtonEvent::released(t0)), None);
        assert_eq!(d.on_event(&ButtonEvent::released(t0 + ms(1000))), None);
    }

    #[test]
    fn burst_within_window_yields_one_trigger() {
        let mut d = Debouncer::new(ms(300));
        let t0 = Instant::now();
        let events = [
            ButtonEvent::pressed(t0),
            ButtonEvent::released(t0 + ms(10)),
            ButtonEvent::pressed(t0 + ms(20)),
            ButtonEvent::pressed(t0 + ms(150)),
            ButtonEvent::released(t0 + ms(160)),
            ButtonEvent::pressed(t0 + ms(299)),
        ];
        let count = events.iter().filter_map(|e| d.on_event(e)).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn dropped_presses_do_not_extend_window() {
        let mut d = Debouncer::new(ms(300));
        let t0 = Instant::now();
        assert!(d.on_event(&ButtonEvent::pressed(t0)).is_some());
        assert!(d.on_event(&ButtonEvent::pressed(t0 + ms(250))).is_none());
        assert!(d.on_event(&ButtonEvent::pressed(t0 + ms(300))).is_some());
        assert!(d.on_event(&ButtonEvent::pressed(t0 + ms(599))).is_none());
        assert!(d.on_event(&ButtonEvent::pressed(t0 + ms(600))).is_some());
    }

    #[tokio::test]
    async fn button_watch_forwards_debounced_triggers() {
        let (source, events) = ChannelButtonSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = run_button_watch(source, Debouncer::new(ms(300)), tx);

        let t0 = Instant::now();
        events.send(Ok(ButtonEvent::pressed(t0))).unwrap();
        events.send(Ok(ButtonEvent::released(t0 + ms(5)))).unwrap();
        events.send(Ok(ButtonEvent::pressed(t0 + ms(40)))).unwrap();
        events.send(Ok(ButtonEvent::pressed(t0 + ms(400)))).unwrap();

        assert_eq!(rx.recv().await, Some(Trigger));
        assert_eq!(rx.recv().await, Some(Trigger));
        handle.shutdown().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn button_watch_stops_on_input_error() {
        let (source, events) = ChannelButtonSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = run_button_watch(source, Debouncer::new(ms(300)), tx);

        let gone = std::io::Error::new(std::io::ErrorKind::Other, "device unplugged");
        events.send(Err(InputError::Read(gone))).unwrap();
        handle.await_join().await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
