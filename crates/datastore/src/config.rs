//! Engine configuration (ambient stack, SPEC_FULL §1).
//!
//! Holds exactly the options spec §6 names as "recognized options". The
//! engine never reads environment variables or config files itself — the
//! host application builds an `EngineConfig` however it likes and passes
//! it to [`crate::Engine::open`].

use crate::error::{EngineError, Result};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Filesystem path for an optional persistence sink. `None` means the
    /// engine runs purely in memory.
    pub data_directory: Option<PathBuf>,
    /// Verbosity the host application should configure its `log`
    /// subscriber at; the engine itself never calls `log::set_max_level`.
    pub log_level: LevelFilter,
    /// Capacity of the object arena.
    pub max_objects: u64,
    /// Capacity of the locator map.
    pub max_locators: u32,
    /// Per-transaction log capacity.
    pub max_log_records: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_directory: None,
            log_level: LevelFilter::Info,
            max_objects: 1 << 24,
            max_locators: 1 << 22,
            max_log_records: 1 << 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_objects == 0 {
            return Err(EngineError::Configuration("max_objects must be greater than zero".into()));
        }
        if self.max_locators == 0 {
            return Err(EngineError::Configuration("max_locators must be greater than zero".into()));
        }
        if self.max_log_records == 0 {
            return Err(EngineError::Configuration("max_log_records must be greater than zero".into()));
        }
        if let Some(dir) = &self.data_directory {
            if dir.as_os_str().is_empty() {
                return Err(EngineError::Configuration("data_directory must not be empty when set".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.max_locators = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::Configuration(_))));
    }
}
