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

use clap::Parser;
use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};

use otc_core::{prepare_destination, run_service};
use otc_native_service::cli::Cli;
use otc_native_service::load_config;
use otc_native_service::logger::init_logger;

async fn wait_for_termination() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level, cli.log_file.as_ref())?;

    let config = load_config(&cli)?;
    let destination = prepare_destination(&config)?;
    info!("Copying to {:?}", destination);

    let services = run_service(&config)?;
    info!("Service started");

    if let Err(e) = wait_for_termination().await {
        error!("Cannot listen for termination signals: {}", e);
    }
    info!("Termination requested, stopping");
    if let Err(e) = services.shutdown().await {
        error!("Service task ended abnormally: {}", e);
    }
    info!("Service stopped");
    Ok(())
}
