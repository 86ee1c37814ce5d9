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
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A handle passed to background tasks that lets them observe a stop/shutdown request.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    fn new(shutdown_rx: oneshot::Receiver<()>) -> Self { Self { shutdown_rx } }

    /// Resolves once shutdown has been requested or the owning [`ServiceHandle`] was dropped.
    /// Must not be awaited again after it resolved.
    pub async fn signaled(&mut self) {
        (&mut self.shutdown_rx).await.unwrap_or_default();
    }
}

/// A unified handle for background service tasks that support cooperative shutdown.
pub struct ServiceHandle {
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn new(join: JoinHandle<()>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self { join, shutdown_tx: Some(shutdown_tx) }
    }

    /// Request cooperative shutdown signal without awaiting task completion.
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Await task completion without sending a shutdown signal.
    pub async fn await_join(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }

    /// Request cooperative shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.request_shutdown();
        self.await_join().await
    }
}

/// Spawn a background service task with a standard stop mechanism.
///
/// The provided function will receive a StopHandle to await for shutdown, and will be executed
/// on a Tokio task. The returned ServiceHandle allows triggering a cooperative shutdown.
pub fn spawn_service<Fut, Func>(f: Func) -> ServiceHandle
where
    Fut: Future<Output=()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let stop = StopHandle::new(shutdown_rx);
    let join = tokio::spawn(async move {
        f(stop).await;
    });
    ServiceHandle::new(join, shutdown_tx)
}

/// A container for multiple ServiceHandles with a single shutdown method.
pub struct MultiServiceHandle {
    handles: Vec<ServiceHandle>,
}

impl MultiServiceHandle {
    pub fn with_capacity(cap: usize) -> Self { Self { handles: Vec::with_capacity(cap) } }

    pub fn add(&mut self, handle: ServiceHandle) { self.handles.push(handle); }

    /// Request shutdown for all services in insertion order, awaiting each before signalling the
    /// next one. Returns the first JoinError encountered, if any.
    ///
    /// Sequential shutdown lets the input side stop before the orchestrator tears down an
    /// active job.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        let mut first_err: Option<tokio::task::JoinError> = None;
        for h in self.handles.into_iter() {
            if let Err(e) = h.shutdown().await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn shutdown_signals_task() {
        let stopped = Arc::new(Mutex::new(false));
        let flag = stopped.clone();
        let handle = spawn_service(move |mut stop| async move {
            stop.signaled().await;
            *flag.lock().unwrap() = true;
        });
        handle.shutdown().await.unwrap();
        assert!(*stopped.lock().unwrap());
    }

    #[tokio::test]
    async fn multi_handle_stops_in_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiServiceHandle::with_capacity(2);
        for name in ["input", "orchestrator"] {
            let order = order.clone();
            multi.add(spawn_service(move |mut stop| async move {
                stop.signaled().await;
                order.lock().unwrap().push(name);
            }));
        }
        multi.shutdown().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["input", "orchestrator"]);
    }

    #[tokio::test]
    async fn dropped_handle_releases_task() {
        let handle = spawn_service(|mut stop| async move {
            stop.signaled().await;
        });
        let ServiceHandle { join, shutdown_tx } = handle;
        drop(shutdown_tx);
        join.await.unwrap();
    }
}
