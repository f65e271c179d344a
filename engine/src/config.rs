//! Engine configuration.

use crate::join::JoinOptions;
use std::env;
use std::time::Duration;

/// Default lifetime of a pooled connection.
pub const DEFAULT_LEASE_LIFETIME: Duration = Duration::from_secs(3600);

/// Default number of entries per sync page.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Maximum number of entries per sync page.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Engine configuration, optionally loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a pooled connection lives before eviction
    pub lease_lifetime: Duration,
    /// Verify join input order while streaming
    pub verify_join_order: bool,
    /// Page size when the client asks for none
    pub default_page_limit: usize,
    /// Upper bound on a client's requested page size
    pub max_page_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_lifetime: DEFAULT_LEASE_LIFETIME,
            verify_join_order: true,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let lease_lifetime = match env::var("ROWSYNC_LEASE_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidLeaseLifetime(raw))?,
            ),
            Err(_) => defaults.lease_lifetime,
        };

        let verify_join_order = match env::var("ROWSYNC_VERIFY_JOIN_ORDER") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidVerifyFlag(raw))?,
            Err(_) => defaults.verify_join_order,
        };

        let max_page_limit = match env::var("ROWSYNC_MAX_PAGE_LIMIT") {
            Ok(raw) => parse_limit(&raw).ok_or(ConfigError::InvalidPageLimit(raw))?,
            Err(_) => defaults.max_page_limit,
        };

        let default_page_limit = match env::var("ROWSYNC_PAGE_LIMIT") {
            Ok(raw) => parse_limit(&raw).ok_or(ConfigError::InvalidPageLimit(raw))?,
            Err(_) => defaults.default_page_limit.min(max_page_limit),
        };

        let config = Self {
            lease_lifetime,
            verify_join_order,
            default_page_limit,
            max_page_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the page limits are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(ConfigError::PageLimitsOutOfRange {
                default: self.default_page_limit,
                max: self.max_page_limit,
            });
        }
        Ok(())
    }

    /// Join options derived from this configuration.
    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            verify_order: self.verify_join_order,
        }
    }

    /// Resolve a client's requested page size.
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .map(|l| l.clamp(1, self.max_page_limit.max(1)))
            .unwrap_or(self.default_page_limit)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_limit(raw: &str) -> Option<usize> {
    raw.trim().parse().ok().filter(|&l: &usize| l > 0)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid ROWSYNC_LEASE_SECS value: {0}")]
    InvalidLeaseLifetime(String),

    #[error("Invalid ROWSYNC_VERIFY_JOIN_ORDER value: {0}")]
    InvalidVerifyFlag(String),

    #[error("Invalid page limit value: {0}")]
    InvalidPageLimit(String),

    #[error("Default page limit {default} must be between 1 and the maximum {max}")]
    PageLimitsOutOfRange { default: usize, max: usize },
}
