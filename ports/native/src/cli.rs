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

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use otc_core::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory the drive content is copied to (overrides the configuration file)
    #[arg(short, long, env = "OTC_DEST")]
    pub destination: Option<PathBuf>,

    /// Set the log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["onetouchcopyd"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.log_file, None);
    }

    #[test]
    fn all_options() {
        let cli = Cli::try_parse_from([
            "onetouchcopyd",
            "-c",
            "/tmp/otc.toml",
            "-d",
            "/share/usb",
            "--log-level",
            "debug",
            "--log-file",
            "/var/log/otc.log",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/otc.toml"));
        assert_eq!(cli.destination, Some(PathBuf::from("/share/usb")));
        assert_eq!(cli.log_level.to_level_filter(), LevelFilter::Debug);
        assert_eq!(cli.log_file, Some(PathBuf::from("/var/log/otc.log")));
    }

    #[test]
    fn log_level_values_come_from_the_enum() {
        assert_eq!(<LogLevel as ValueEnum>::from_str("WARN", true), Ok(LogLevel::Warn));
        assert!(Cli::try_parse_from(["onetouchcopyd", "--log-level", "loud"]).is_err());
    }
}
