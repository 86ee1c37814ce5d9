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

pub mod config;
pub mod copy_engine;
pub mod debouncer;
pub mod definitions;
pub mod errors;
pub mod input;
pub mod led;
pub mod mount_coordinator;
pub mod mount_service;
pub mod orchestrator;
pub mod resolver;
pub mod service;
pub mod udisks;

mod service_entry;

#[cfg(test)]
mod fakes;

pub use config::OtcConfig;
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use service::{MultiServiceHandle, ServiceHandle};
pub use service_entry::{prepare_destination, run_service, start_service};
