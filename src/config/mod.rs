pub mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Warmup gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupConfig {
    /// Timeout used by `await_warm_default`
    #[serde(default = "default_warmup_timeout")]
    pub default_timeout_ms: u64,
    /// Longest single wait of the ingestion driver between reentrant pumps
    #[serde(default = "default_driver_poll")]
    pub driver_poll_ms: u64,
}

fn default_warmup_timeout() -> u64 {
    5000
}

fn default_driver_poll() -> u64 {
    50
}

impl WarmupConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn driver_poll(&self) -> Duration {
        Duration::from_millis(self.driver_poll_ms.max(1))
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_warmup_timeout(),
            driver_poll_ms: default_driver_poll(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Deltas held per gapped class before the oldest is discarded
    #[serde(default = "default_max_buffered_deltas")]
    pub max_buffered_deltas: usize,
    /// Pending producer updates accepted before `submit` is refused
    #[serde(default = "default_ingress_capacity")]
    pub ingress_capacity: usize,
    /// Capacity of the change and resync broadcast channels
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_max_buffered_deltas() -> usize {
    1024
}

fn default_ingress_capacity() -> usize {
    65536
}

fn default_broadcast_capacity() -> usize {
    1000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_buffered_deltas: default_max_buffered_deltas(),
            ingress_capacity: default_ingress_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Sliding window used for the ingest rate (seconds)
    #[serde(default = "default_rate_window")]
    pub rate_window_seconds: u64,
}

fn default_rate_window() -> u64 {
    5
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            rate_window_seconds: default_rate_window(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<CacheConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: CacheConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.warmup.default_timeout_ms, 5000);
        assert_eq!(config.warmup.driver_poll_ms, 50);
        assert_eq!(config.ingest.max_buffered_deltas, 1024);
        assert_eq!(config.ingest.broadcast_capacity, 1000);
        assert_eq!(config.metrics.rate_window_seconds, 5);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [warmup]
            default_timeout_ms = 2000
            driver_poll_ms = 10

            [ingest]
            max_buffered_deltas = 16
            ingress_capacity = 128
            broadcast_capacity = 64

            [metrics]
            rate_window_seconds = 10
        "#;

        let config: CacheConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.warmup.default_timeout(), Duration::from_secs(2));
        assert_eq!(config.warmup.driver_poll(), Duration::from_millis(10));
        assert_eq!(config.ingest.max_buffered_deltas, 16);
        assert_eq!(config.ingest.ingress_capacity, 128);
        assert_eq!(config.metrics.rate_window_seconds, 10);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [ingest]
            max_buffered_deltas = 8
        "#;

        let config: CacheConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ingest.max_buffered_deltas, 8);
        assert_eq!(config.ingest.ingress_capacity, 65536);
        assert_eq!(config.warmup.default_timeout_ms, 5000);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[warmup]\ndefault_timeout_ms = 750").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.warmup.default_timeout_ms, 750);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/statesync.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_zero_driver_poll_is_clamped() {
        let config = WarmupConfig {
            default_timeout_ms: 1,
            driver_poll_ms: 0,
        };
        assert_eq!(config.driver_poll(), Duration::from_millis(1));
    }
}
