// Copyright 2024-, Semiotic AI, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

const DEFAULT_SPAWN_PERIOD: Duration = Duration::from_millis(100);

/// Tuning knobs of an extraction. Every field has a default, so a configuration file only
/// needs to name the settings it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    /// Target number of blocks per range.
    pub workload: u64,
    /// Number of workers the period is sized for.
    pub initial_tasks: usize,
    /// Initial spawner period, in seconds.
    pub spawn_frequency: f64,
    /// Derive the spawner period from observed task runtimes.
    pub auto_adjust_frequency: bool,
    pub include_filter: String,
    pub exclude_filter: String,
    pub final_blocks_only: bool,
    /// Failed attempts tolerated per range lineage. Unlimited when unset.
    pub max_failed_block_retries: Option<u32>,
    /// Connections opened at most as ceilings are discovered.
    pub max_connections: usize,
    /// Number of task runtimes averaged for the adaptive period.
    pub runtime_history_len: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            workload: 100,
            initial_tasks: 25,
            spawn_frequency: 0.1,
            auto_adjust_frequency: false,
            include_filter: String::new(),
            exclude_filter: String::new(),
            final_blocks_only: true,
            max_failed_block_retries: None,
            max_connections: 1,
            runtime_history_len: 32,
        }
    }
}

impl ExtractorConfig {
    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.workload == 0 {
            return Err(invalid("workload must be at least 1"));
        }
        if self.initial_tasks == 0 {
            return Err(invalid("initial_tasks must be at least 1"));
        }
        let period = Duration::try_from_secs_f64(self.spawn_frequency);
        if self.spawn_frequency <= 0.0 || period.is_err() {
            return Err(invalid(format!(
                "spawn_frequency must be a positive number of seconds, got {}",
                self.spawn_frequency
            )));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections must be at least 1"));
        }
        if self.runtime_history_len == 0 {
            return Err(invalid("runtime_history_len must be at least 1"));
        }
        for (name, expr) in [
            ("include_filter", &self.include_filter),
            ("exclude_filter", &self.exclude_filter),
        ] {
            if !is_header_safe(expr) {
                return Err(invalid(format!(
                    "{name} may only contain visible ASCII characters"
                )));
            }
        }
        Ok(())
    }

    /// The initial spawner period. Settings rejected by [`ExtractorConfig::validate`] fall
    /// back to the default period.
    pub fn spawn_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.spawn_frequency)
            .ok()
            .filter(|period| !period.is_zero())
            .unwrap_or(DEFAULT_SPAWN_PERIOD)
    }
}

fn invalid(reason: impl Into<String>) -> ExtractError {
    ExtractError::InvalidConfig(reason.into())
}

/// Filter expressions travel as request metadata.
fn is_header_safe(expr: &str) -> bool {
    expr.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}
