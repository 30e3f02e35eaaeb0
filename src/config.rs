//! Service configuration
//!
//! Environment-driven settings shared by the ingest and retrieval paths.

use std::time::Duration;

use crate::error::{Result, VaultError};

/// Default bound on any single custodian or store call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime configuration loaded at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// PostgreSQL connection string; absent means in-memory backends
    pub database_url: Option<String>,
    /// Bound on any single custodian or store call. No operation in the
    /// core may block indefinitely: a timeout surfaces as
    /// `KeyServiceUnavailable` or `PersistenceFailure` instead of hanging.
    pub call_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment.
    ///
    /// `DATABASE_URL` selects the PostgreSQL backends;
    /// `CAPVAULT_CALL_TIMEOUT_MS` overrides the per-call timeout.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let call_timeout = match std::env::var("CAPVAULT_CALL_TIMEOUT_MS") {
            Ok(raw) => {
                let ms: u64 = raw.parse().map_err(|_| {
                    VaultError::Config(format!(
                        "CAPVAULT_CALL_TIMEOUT_MS must be an integer, got {:?}",
                        raw
                    ))
                })?;
                if ms == 0 {
                    return Err(VaultError::Config(
                        "CAPVAULT_CALL_TIMEOUT_MS must be positive".into(),
                    ));
                }
                Duration::from_millis(ms)
            }
            Err(_) => DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            database_url,
            call_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let config = ServiceConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());
    }
}
