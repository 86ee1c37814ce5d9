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

use anyhow::Context;
use log::{info, warn};
use otc_core::OtcConfig;

pub mod cli;
pub mod logger;

use cli::Cli;

/// Loads the configuration file and applies the command line overrides. The destination given on
/// the command line (or through `OTC_DEST`) wins over the file.
pub fn load_config(cli: &Cli) -> anyhow::Result<OtcConfig> {
    let mut config = match OtcConfig::load(&cli.config)? {
        Some(config) => {
            info!("Configuration loaded from {:?}", cli.config);
            config
        }
        None => {
            warn!("Configuration file {:?} not found, using defaults", cli.config);
            OtcConfig::default()
        }
    };
    if let Some(destination) = &cli.destination {
        config.copy_destination = Some(destination.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}
