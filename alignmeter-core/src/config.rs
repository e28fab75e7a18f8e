// Copyright 2025 Alignmeter (https://github.com/alignmeter)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration
//!
//! Tunables for selection, retry policy, and the coordinator's failure gate.
//! Defaults match production behavior; tests and deployments can override via
//! a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Alignment engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Cap on issue-linked spans fetched as the positive set.
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,

    /// Page size used when walking span queries.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Fraction of unreliable children (failed + ignored + unprocessed) the
    /// coordinator tolerates before forcing a parent retry.
    #[serde(default = "default_failure_tolerance")]
    pub failure_tolerance: f64,

    /// Parent job attempts. Sized to outlast child settling after a failure.
    #[serde(default = "default_parent_attempts")]
    pub parent_attempts: u32,

    /// Initial exponential backoff for parent retries, in milliseconds.
    #[serde(default = "default_parent_backoff_ms")]
    pub parent_backoff_ms: u64,

    /// Child job attempts.
    #[serde(default = "default_child_attempts")]
    pub child_attempts: u32,

    /// Fixed backoff between child retries, in milliseconds.
    #[serde(default = "default_child_backoff_ms")]
    pub child_backoff_ms: u64,
}

fn default_max_examples() -> usize {
    100
}

fn default_page_size() -> usize {
    50
}

fn default_failure_tolerance() -> f64 {
    0.2
}

fn default_parent_attempts() -> u32 {
    3
}

fn default_parent_backoff_ms() -> u64 {
    2000
}

fn default_child_attempts() -> u32 {
    2
}

fn default_child_backoff_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_examples: default_max_examples(),
            page_size: default_page_size(),
            failure_tolerance: default_failure_tolerance(),
            parent_attempts: default_parent_attempts(),
            parent_backoff_ms: default_parent_backoff_ms(),
            child_attempts: default_child_attempts(),
            child_backoff_ms: default_child_backoff_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
