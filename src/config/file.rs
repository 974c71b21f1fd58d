//! TOML configuration file support
//!
//! A replay configuration file carries a single `[replay]` table whose keys
//! mirror [`ReplayOptions`]. Missing keys fall back to their defaults.
//!
//! ```toml
//! [replay]
//! fast_forward_ratio = 2.0
//! num_threads = 8
//! queue_depth = 256
//! strict_timestamps = false
//! ```

use super::ReplayOptions;
use crate::error::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Replay options
    pub replay: ReplayOptions,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents).map_err(|e| match e {
            ReplayError::Config(msg) => {
                ReplayError::Config(format!("Failed to parse config file {:?}: {}", path, msg))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| ReplayError::Config(e.to_string()))?;
        file.replay.validate()?;
        Ok(file)
    }

    /// Render an annotated example configuration
    pub fn example() -> String {
        r#"# kvreplay configuration

[replay]
# Divides original inter-record delays (1.0 = original pacing, >1 = faster)
fast_forward_ratio = 1.0

# 0 = serial replay, N > 0 = pooled replay with N workers
num_threads = 0

# Pooled replay: records decoded ahead of the workers before dispatch blocks
queue_depth = 1024

# Treat a timestamp that goes backwards as trace corruption
strict_timestamps = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = ConfigFile::parse("").unwrap();
        assert_eq!(config.replay.fast_forward_ratio, 1.0);
        assert_eq!(config.replay.num_threads, 0);
    }

    #[test]
    fn test_parse_replay_section() {
        let toml = r#"
            [replay]
            fast_forward_ratio = 4.0
            num_threads = 8
        "#;
        let config = ConfigFile::parse(toml).unwrap();
        assert_eq!(config.replay.fast_forward_ratio, 4.0);
        assert_eq!(config.replay.num_threads, 8);
        assert_eq!(config.replay.queue_depth, 1024);
    }

    #[test]
    fn test_parse_rejects_invalid_ratio() {
        let toml = r#"
            [replay]
            fast_forward_ratio = 0.0
        "#;
        let err = ConfigFile::parse(toml).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_parse_rejects_malformed_toml() {
        let err = ConfigFile::parse("[replay\nnum_threads = ").unwrap_err();
        assert!(matches!(err, ReplayError::Config(_)));
    }

    #[test]
    fn test_example_config_parses() {
        let config = ConfigFile::parse(&ConfigFile::example()).unwrap();
        assert_eq!(config.replay.queue_depth, 1024);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.toml");
        std::fs::write(&path, "[replay]\nnum_threads = 2\n").unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.replay.num_threads, 2);

        let missing = ConfigFile::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ReplayError::Config(_)));
    }
}
