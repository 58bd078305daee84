use super::CacheConfig;
use std::str::FromStr;

pub const ENV_WARMUP_TIMEOUT_MS: &str = "STATESYNC_WARMUP_TIMEOUT_MS";
pub const ENV_DRIVER_POLL_MS: &str = "STATESYNC_DRIVER_POLL_MS";
pub const ENV_MAX_BUFFERED_DELTAS: &str = "STATESYNC_MAX_BUFFERED_DELTAS";
pub const ENV_INGRESS_CAPACITY: &str = "STATESYNC_INGRESS_CAPACITY";

impl CacheConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_overrides(|name| std::env::var(name).ok());
        cfg
    }

    /// Overlay values from `lookup` onto this config. Unparseable values are
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = parsed(&lookup, ENV_WARMUP_TIMEOUT_MS) {
            self.warmup.default_timeout_ms = n;
        }
        if let Some(n) = parsed(&lookup, ENV_DRIVER_POLL_MS) {
            self.warmup.driver_poll_ms = n;
        }
        if let Some(n) = parsed(&lookup, ENV_MAX_BUFFERED_DELTAS) {
            self.ingest.max_buffered_deltas = n;
        }
        if let Some(n) = parsed(&lookup, ENV_INGRESS_CAPACITY) {
            self.ingest.ingress_capacity = n;
        }
    }
}

fn parsed<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse::<T>().ok())
}
