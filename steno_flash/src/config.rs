// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `--config` file.
//!
//! Every key is optional; anything left out keeps its built-in default and
//! command-line flags override both. Addresses may be written as integers
//! or as strings in any base `parse_int` understands:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! timeout-ms = 10000
//!
//! [retry]
//! attempts = 10
//! backoff-ms = 1000
//!
//! [region]
//! base = "0x08002000"
//! end = "0x08040000"
//! page-size = "0x800"
//! ```

use crate::flasher::FlashConfig;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steno_proto::{FlashRegion, PROGRAM_AREA};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The region must be page-aligned, non-empty and big enough for a
    /// trailer.
    #[error(
        "unusable image region {base:#010x}..{end:#010x} with {page_size:#x} byte pages"
    )]
    BadRegion { base: u32, end: u32, page_size: u32 },
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub region: Option<RegionConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegionConfig {
    #[serde(deserialize_with = "address")]
    pub base: u32,
    #[serde(deserialize_with = "address")]
    pub end: u32,
    #[serde(deserialize_with = "address")]
    pub page_size: u32,
}

/// Retry and timeout values given on the command line; each one that is
/// set wins over the file.
#[derive(Copy, Clone, Debug, Default)]
pub struct FlashOverrides {
    pub attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

fn address<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => parse_int::parse::<u32>(&s).map_err(serde::de::Error::custom),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Config::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let cfg: Config = toml::from_str(text)?;
        cfg.region()?;
        Ok(cfg)
    }

    /// The configured image region, or the Stenosaurus layout.
    pub fn region(&self) -> Result<FlashRegion, ConfigError> {
        let r = match self.region {
            Some(r) => r,
            None => return Ok(PROGRAM_AREA),
        };

        let region = FlashRegion::new(r.base, r.end, r.page_size);
        if !region.is_usable() {
            return Err(ConfigError::BadRegion {
                base: r.base,
                end: r.end,
                page_size: r.page_size,
            });
        }
        Ok(region)
    }

    pub fn flash_config(&self) -> FlashConfig {
        self.flash_config_with(FlashOverrides::default())
    }

    /// Built-in defaults, overridden by the file, overridden by `cli`.
    pub fn flash_config_with(&self, cli: FlashOverrides) -> FlashConfig {
        let defaults = FlashConfig::default();
        let attempts = cli.attempts.or(self.retry.attempts);
        let backoff_ms = cli.backoff_ms.or(self.retry.backoff_ms);
        let timeout_ms = cli.timeout_ms.or(self.serial.timeout_ms);
        FlashConfig {
            attempts: attempts.unwrap_or(defaults.attempts),
            backoff: backoff_ms.map_or(defaults.backoff, Duration::from_millis),
            timeout: timeout_ms.map_or(defaults.timeout, Duration::from_millis),
        }
    }
}
