//! Default constants for kvreplay configuration
//!
//! These constants define the default values used when a replay option is not
//! set explicitly, either in code or in a TOML configuration file.

/// Default fast-forward ratio (1.0 = original pacing)
pub const DEFAULT_FAST_FORWARD_RATIO: f64 = 1.0;

/// Default number of replay worker threads (0 = serial replay)
pub const DEFAULT_NUM_THREADS: usize = 0;

/// Maximum number of replay worker threads allowed
pub const MAX_NUM_THREADS: usize = 512;

/// Default capacity of the pooled-replay task queue
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Default timestamp policy (non-decreasing timestamps are not enforced)
pub const DEFAULT_STRICT_TIMESTAMPS: bool = false;

/// Longest single sleep taken while pacing, so cancellation is observed promptly
pub const PACING_SLICE_MS: u64 = 10;

/// Default log level for the command-line tool
pub const DEFAULT_LOG_LEVEL: &str = "info";
