//! Configuration module for kvreplay
//!
//! - `defaults` - Default constants and values
//! - `file` - TOML configuration file loading

mod defaults;
pub mod file;

pub use defaults::*;
pub use file::ConfigFile;

use crate::error::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling a bulk replay.
///
/// | Option | Meaning |
/// |--------|---------|
/// | `fast_forward_ratio` | Divides every inter-record delay. 1.0 keeps the captured pacing, 2.0 replays twice as fast. Must be finite and > 0. |
/// | `num_threads` | 0 replays serially on the calling thread; N > 0 executes records on N workers. |
/// | `queue_depth` | Pooled mode only: how many decoded records may wait for a worker before the dispatcher blocks. |
/// | `strict_timestamps` | Fail the replay with a corruption error when a record's timestamp is older than its predecessor's. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOptions {
    pub fast_forward_ratio: f64,
    pub num_threads: usize,
    pub queue_depth: usize,
    pub strict_timestamps: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            fast_forward_ratio: DEFAULT_FAST_FORWARD_RATIO,
            num_threads: DEFAULT_NUM_THREADS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            strict_timestamps: DEFAULT_STRICT_TIMESTAMPS,
        }
    }
}

impl ReplayOptions {
    /// Serial replay at the given speed
    pub fn new(fast_forward_ratio: f64) -> Self {
        Self {
            fast_forward_ratio,
            ..Default::default()
        }
    }

    /// Set the number of worker threads (0 = serial)
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the fast-forward ratio
    pub fn with_fast_forward(mut self, ratio: f64) -> Self {
        self.fast_forward_ratio = ratio;
        self
    }

    /// Set the pooled task queue capacity
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Reject timestamps that go backwards
    pub fn with_strict_timestamps(mut self) -> Self {
        self.strict_timestamps = true;
        self
    }

    /// Whether records execute on a worker pool
    pub fn is_pooled(&self) -> bool {
        self.num_threads > 0
    }

    /// Load the `[replay]` table of a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ConfigFile::load(path)?.replay)
    }

    /// Parse the `[replay]` table from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(ConfigFile::parse(contents)?.replay)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fast_forward_ratio.is_finite() || self.fast_forward_ratio <= 0.0 {
            return Err(ReplayError::InvalidArgument(format!(
                "fast_forward_ratio must be a finite value > 0, got {}",
                self.fast_forward_ratio
            )));
        }
        if self.num_threads > MAX_NUM_THREADS {
            return Err(ReplayError::InvalidArgument(format!(
                "num_threads {} exceeds maximum of {}",
                self.num_threads, MAX_NUM_THREADS
            )));
        }
        if self.queue_depth == 0 {
            return Err(ReplayError::InvalidArgument(
                "queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_serial_realtime() {
        let options = ReplayOptions::default();
        assert_eq!(options.fast_forward_ratio, 1.0);
        assert_eq!(options.num_threads, 0);
        assert!(!options.is_pooled());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = ReplayOptions::new(2.0)
            .with_threads(4)
            .with_queue_depth(16)
            .with_strict_timestamps();
        assert_eq!(options.fast_forward_ratio, 2.0);
        assert_eq!(options.num_threads, 4);
        assert_eq!(options.queue_depth, 16);
        assert!(options.strict_timestamps);
        assert!(options.is_pooled());
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        for ratio in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = ReplayOptions::new(ratio).validate().unwrap_err();
            assert!(err.is_invalid_argument(), "ratio {ratio} accepted");
        }
    }

    #[test]
    fn test_validate_rejects_zero_queue_depth() {
        let err = ReplayOptions::default()
            .with_queue_depth(0)
            .validate()
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_validate_rejects_too_many_threads() {
        let err = ReplayOptions::default()
            .with_threads(MAX_NUM_THREADS + 1)
            .validate()
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_from_toml_str() {
        let options = ReplayOptions::from_toml_str("[replay]\nnum_threads = 3\n").unwrap();
        assert_eq!(options.num_threads, 3);
        assert_eq!(options.fast_forward_ratio, 1.0);
    }
}
