//! Engine configuration
//!
//! A single TOML-backed configuration struct for the engine's tunables,
//! plus the ambient logging configuration read by the CLI driver.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the engine's segment files. Required.
    pub dir: PathBuf,

    /// Segment filename prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Roll over to a new active segment once the current one strictly
    /// exceeds this many bytes.
    #[serde(default = "default_segment_size_threshold")]
    pub segment_size_threshold: u64,

    /// Call `sync_all` after every successful write. Durability is
    /// best-effort by default; this trades throughput for safety.
    #[serde(default)]
    pub fsync: bool,

    /// Compact once the number of frozen segments reaches this count.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,

    /// Logging configuration, read only by the CLI driver.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_prefix() -> String {
    "segment-".to_string()
}

fn default_segment_size_threshold() -> u64 {
    10_000_000
}

fn default_compaction_threshold() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl EngineConfig {
    /// Construct a config for `dir` with every other field at its default.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: default_prefix(),
            segment_size_threshold: default_segment_size_threshold(),
            fsync: false,
            compaction_threshold: default_compaction_threshold(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("dir cannot be empty".into()));
        }

        if self.prefix.is_empty() {
            return Err(crate::Error::Config("prefix cannot be empty".into()));
        }

        if self.segment_size_threshold == 0 {
            return Err(crate::Error::Config("segment_size_threshold must be greater than zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let toml = r#"dir = "/tmp/kv""#;
        let config = EngineConfig::from_str(toml).unwrap();
        assert_eq!(config.prefix, "segment-");
        assert_eq!(config.segment_size_threshold, 10_000_000);
        assert_eq!(config.compaction_threshold, 2);
        assert!(!config.fsync);
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let toml = r#"
dir = "/tmp/kv"
prefix = ""
"#;
        let err = EngineConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let toml = r#"
dir = "/tmp/kv"
segment_size_threshold = 0
"#;
        let err = EngineConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
