//! Cache configuration.
//!
//! Controls the context cache via the `[cache]` section of `catalog-index.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_ENTRY_LIMIT: usize = 10_000;
const DEFAULT_TTL_SECONDS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every `get` misses and `set` is a no-op. Bumps still run.
    pub enabled: bool,
    /// Maximum entries held by the in-process backend.
    pub entry_limit: usize,
    /// Expiry applied when a caller passes no ttl.
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_limit: DEFAULT_ENTRY_LIMIT,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            entry_limit: settings.entry_limit.get(),
            default_ttl_seconds: settings.default_ttl.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.entry_limit, 10_000);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn zero_limit_clamps_to_one() {
        let config = CacheConfig {
            entry_limit: 0,
            ..CacheConfig::default()
        };
        assert_eq!(config.entry_limit_non_zero().get(), 1);
    }
}
