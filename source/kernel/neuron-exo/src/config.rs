// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Model kernel configuration
//! OWNERS: @kernel-team
//! PUBLIC API: KernelConfig (from_toml_str/load/validate), ConfigError
//! DEPENDS_ON: serde, toml
//! INVARIANTS: Every accepted configuration has 1..=MAX_FRAMES frames, at least one env
//!             slot, a non-zero time slice and a non-zero step budget; env slots never
//!             exceed NENV

use std::fs;
use std::path::{Path, PathBuf};

use nexus_abi::{env::NENV, MAX_FRAMES};
use serde::Deserialize;
use static_assertions::const_assert;
use thiserror::Error;

const DEFAULT_PHYS_PAGES: usize = 1024;
const DEFAULT_MAX_ENVS: usize = 64;
const DEFAULT_TIME_SLICE: usize = 8;
const DEFAULT_MAX_STEPS: usize = 100_000;

const_assert!(DEFAULT_MAX_ENVS <= NENV);
const_assert!(DEFAULT_PHYS_PAGES <= MAX_FRAMES);

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid TOML or has unknown keys.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of its accepted range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Sizing and scheduling parameters of the model kernel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct KernelConfig {
    /// Physical frames available to the page pool, page tables included.
    pub phys_pages: usize,
    /// Size of the environment table.
    pub max_envs: usize,
    /// Operations an environment may execute before it is preempted.
    pub time_slice: usize,
    /// Upper bound on operations executed by a single `Kernel::run`.
    pub max_steps: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            phys_pages: DEFAULT_PHYS_PAGES,
            max_envs: DEFAULT_MAX_ENVS,
            time_slice: DEFAULT_TIME_SLICE,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let doc = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&doc)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phys_pages == 0 || self.phys_pages > MAX_FRAMES {
            return Err(ConfigError::Invalid("phys_pages must be in 1..=1048576"));
        }
        if self.max_envs == 0 || self.max_envs > NENV {
            return Err(ConfigError::Invalid("max_envs must be in 1..=1024"));
        }
        if self.time_slice == 0 {
            return Err(ConfigError::Invalid("time_slice must be positive"));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(KernelConfig::from_toml_str("").unwrap(), KernelConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = KernelConfig::from_toml_str("phys_pages = 32\n").unwrap();
        assert_eq!(config.phys_pages, 32);
        assert_eq!(config.max_envs, DEFAULT_MAX_ENVS);
    }

    #[test]
    fn accepts_every_encodable_frame_count() {
        let config = KernelConfig::from_toml_str("phys_pages = 1048576\n").unwrap();
        assert_eq!(config.phys_pages, MAX_FRAMES);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            KernelConfig::from_toml_str("pages = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for doc in [
            "phys_pages = 0",
            "phys_pages = 1048577",
            "phys_pages = 2000000",
            "max_envs = 0",
            "max_envs = 1025",
            "time_slice = 0",
            "max_steps = 0",
        ] {
            assert!(
                matches!(KernelConfig::from_toml_str(doc), Err(ConfigError::Invalid(_))),
                "{doc}"
            );
        }
    }
}
