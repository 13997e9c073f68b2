// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Pipeline configuration and the host-side exchange loader.
//!
//! An operator describes a pipeline in TOML:
//!
//! ```toml
//! [pipeline]
//! num_rules = 8
//! stall_timeout = 1000
//!
//! [[exchange]]
//! name = "XNAS-ITCH"
//! addr = "233.54.12.1"
//! port = 26400
//! priority = 12
//! ```
//!
//! Every key is optional. Exchanges are loaded into consecutive slots
//! starting at slot 0, in the order they appear.

use crate::api::ExchangeDef;
use crate::api::Ipv4Addr;
use crate::api::Priority;
use crate::engine::cfg_port::CfgPort;
use crate::engine::classify::DEF_NUM_RULES;
use crate::engine::classify::MAX_NUM_RULES;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use slog::info;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CfgError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("num_rules must be between 1 and 256, got {0}")]
    NumRules(usize),

    #[error("stall_timeout must be at least one cycle")]
    StallTimeout,

    #[error("{count} exchanges defined but only {slots} rule slots")]
    TooManyExchanges { count: usize, slots: usize },

    #[error("exchange {name}: priority {priority} out of range (max {})",
        Priority::MAX)]
    BadPriority { name: String, priority: u8 },

    #[error("exchange {0} defined more than once")]
    DuplicateName(String),
}

/// Construction-time parameters of one pipeline.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineCfg {
    /// The number of classification rule slots.
    pub num_rules: usize,

    /// Flag a stall after this many consecutive cycles spent holding
    /// an output beat with no handshake. `None` disables the watchdog.
    pub stall_timeout: Option<u64>,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self { num_rules: DEF_NUM_RULES, stall_timeout: None }
    }
}

impl PipelineCfg {
    pub fn validate(&self) -> Result<(), CfgError> {
        if self.num_rules == 0 || self.num_rules > MAX_NUM_RULES {
            return Err(CfgError::NumRules(self.num_rules));
        }

        if self.stall_timeout == Some(0) {
            return Err(CfgError::StallTimeout);
        }

        Ok(())
    }
}

// The on-disk form of an exchange. The priority is kept raw so that an
// out-of-range value can be reported against the exchange's name.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExchangeEntry {
    name: String,
    addr: Ipv4Addr,
    port: u16,
    priority: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CfgFile {
    pipeline: PipelineCfg,
    exchange: Vec<ExchangeEntry>,
}

/// A validated configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    pub pipeline: PipelineCfg,
    pub exchanges: Vec<ExchangeDef>,
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, CfgError> {
        let file: CfgFile = toml::from_str(text)?;
        file.pipeline.validate()?;

        let mut names = BTreeSet::new();
        let mut exchanges = Vec::with_capacity(file.exchange.len());
        for ent in file.exchange {
            let Some(priority) = Priority::new(ent.priority) else {
                return Err(CfgError::BadPriority {
                    name: ent.name,
                    priority: ent.priority,
                });
            };

            if !names.insert(ent.name.clone()) {
                return Err(CfgError::DuplicateName(ent.name));
            }

            exchanges.push(ExchangeDef {
                name: ent.name,
                addr: ent.addr,
                port: ent.port,
                priority,
            });
        }

        if exchanges.len() > file.pipeline.num_rules {
            return Err(CfgError::TooManyExchanges {
                count: exchanges.len(),
                slots: file.pipeline.num_rules,
            });
        }

        Ok(Self { pipeline: file.pipeline, exchanges })
    }
}

/// Read and validate the configuration at `path`.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Config, CfgError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|source| CfgError::Io { path: path.to_path_buf(), source })?;
    Config::parse(&text)
}

/// Program `defs` into consecutive slots, starting at slot 0, through
/// `port`.
pub fn load_exchanges(
    port: &CfgPort,
    defs: &[ExchangeDef],
    log: &Logger,
) -> Result<(), CfgError> {
    let slots = port.num_rules();
    if defs.len() > slots {
        return Err(CfgError::TooManyExchanges { count: defs.len(), slots });
    }

    // The slot count never exceeds 256, so every index fits in a u8.
    for (slot, def) in (0..=u8::MAX).zip(defs) {
        port.program_rule(slot, &def.rule());
        info!(log, "exchange loaded";
            "slot" => slot,
            "name" => &def.name,
            "addr" => %def.addr,
            "port" => def.port,
            "priority" => %def.priority);
    }

    Ok(())
}
