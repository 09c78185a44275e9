//! # Engine Configuration
//!
//! Loaded once at startup, usually from a TOML file:
//!
//! ```toml
//! min_threads = 2
//! job_channels = 8
//! list_extension = 5
//! max_queued_jobs = 4096
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Channels 0 and 1 are reserved, so a pool needs at least this many.
pub const MIN_JOB_CHANNELS: usize = 2;

/// Default growth increment for component, entity and job arrays.
pub const DEFAULT_LIST_EXTENSION: usize = 5;

/// Configuration for the ECS and its job pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested minimum number of worker threads.
    pub min_threads: usize,
    /// Number of job channels, including the two reserved ones.
    pub job_channels: usize,
    /// Fixed increment by which full arrays grow.
    pub list_extension: usize,
    /// Entity slots reserved up front.
    pub initial_entity_capacity: usize,
    /// Queue limit. `None` lets the queue grow without bound.
    pub max_queued_jobs: Option<usize>,
    /// How long an idle worker parks before re-checking for shutdown.
    pub idle_park_micros: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_threads: 1,
            job_channels: 8,
            list_extension: DEFAULT_LIST_EXTENSION,
            initial_entity_capacity: DEFAULT_LIST_EXTENSION,
            max_queued_jobs: None,
            idle_park_micros: 200,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EcsError::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Config`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Config`] describing the first bad field.
    pub fn validate(&self) -> EcsResult<()> {
        if self.job_channels < MIN_JOB_CHANNELS {
            return Err(EcsError::Config(format!(
                "job_channels must be at least {MIN_JOB_CHANNELS}, got {}",
                self.job_channels
            )));
        }
        if self.list_extension == 0 {
            return Err(EcsError::Config("list_extension must be non-zero".to_string()));
        }
        if self.max_queued_jobs == Some(0) {
            return Err(EcsError::Config("max_queued_jobs must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Number of worker threads this config produces on the current machine.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        worker_count_for(self.min_threads, cores)
    }
}

/// `max(requested, cores - 1)`, never below one.
#[must_use]
pub fn worker_count_for(requested_minimum: usize, available_cores: usize) -> usize {
    requested_minimum
        .max(available_cores.saturating_sub(1))
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.list_extension, 5);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("min_threads = 3\nmax_queued_jobs = 64\n").unwrap();
        assert_eq!(config.min_threads, 3);
        assert_eq!(config.max_queued_jobs, Some(64));
        assert_eq!(config.job_channels, 8);
    }

    #[test]
    fn test_rejects_too_few_channels() {
        let err = EngineConfig::from_toml_str("job_channels = 1").unwrap_err();
        assert!(matches!(err, EcsError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_extension() {
        assert!(EngineConfig::from_toml_str("list_extension = 0").is_err());
    }

    #[test]
    fn test_worker_count_policy() {
        assert_eq!(worker_count_for(0, 1), 1);
        assert_eq!(worker_count_for(0, 8), 7);
        assert_eq!(worker_count_for(4, 2), 4);
        assert_eq!(worker_count_for(2, 16), 15);
    }

    #[test]
    fn test_load_from_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("ember_config_{id}.toml"));
        std::fs::write(&path, "list_extension = 16\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.list_extension, 16);

        std::fs::remove_file(&path).ok();
    }
}
