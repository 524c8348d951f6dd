//! Gateway and sync cycle configuration.

use std::time::Duration;

use crate::remote::{GatewayError, GatewayResult};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Configuration for the remote item service gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the item service (e.g., `https://api.example.com/v1`).
    pub base_url: String,
    /// Per-request timeout; expiry surfaces as `Unavailable`.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a gateway configuration from a base URL.
    ///
    /// The URL must include an `http://` or `https://` scheme; a trailing
    /// slash is stripped so paths can be appended verbatim.
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
        })
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Tunables for the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Fetch only records changed since the last successful cycle.
    ///
    /// Delta fetches cannot observe remote deletions, so the purge step of
    /// reconciliation is skipped while this is enabled.
    pub use_delta: bool,
    /// Outbox entries that fail this many times are dropped instead of
    /// retried forever.
    pub max_attempts: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            use_delta: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl SyncOptions {
    /// Enable delta fetching for the Fetch phase.
    #[must_use]
    pub const fn with_delta_fetch(mut self) -> Self {
        self.use_delta = true;
        self
    }

    /// Set the retry ceiling for outbox entries.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

fn normalize_base_url(raw: String) -> GatewayResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        GatewayError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(GatewayError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_config_rejects_invalid_urls() {
        assert!(GatewayConfig::new("").is_err());
        assert!(GatewayConfig::new("   ").is_err());
        assert!(GatewayConfig::new("api.example.com").is_err());
    }

    #[test]
    fn gateway_config_trims_trailing_slash() {
        let config = GatewayConfig::new("https://api.example.com/v1/").unwrap();
        assert_eq!(config.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn sync_options_defaults() {
        let options = SyncOptions::default();
        assert!(!options.use_delta);
        assert_eq!(options.max_attempts, 5);
    }

    #[test]
    fn sync_options_builders() {
        let options = SyncOptions::default().with_delta_fetch().with_max_attempts(2);
        assert!(options.use_delta);
        assert_eq!(options.max_attempts, 2);
    }
}
