//! Hierarchy configuration.
//!
//! Provides the settings shared by every hierarchy component: which
//! organization is the deployment's primary organization, how deep a walk may
//! go, how the read-through caches are sized and how store reads are retried.
//! Configuration is loaded from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::retry::RetryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Settings for the hierarchy components.
///
/// # Examples
///
/// ```
/// use org_core::HierarchyConfig;
///
/// let config = HierarchyConfig::default();
/// assert_eq!(config.max_depth, 64);
/// assert!(config.cache.enabled);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// The deployment's primary (root) organization, if one is designated
    #[serde(default)]
    pub primary_organization_id: Option<Uuid>,

    /// Upper bound on the length of any ancestor walk
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Read-through cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Attempts made for a store read before its error is propagated
    #[serde(default = "default_retry_attempts")]
    pub store_retry_attempts: u32,

    /// Initial delay between store read attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub store_retry_delay_ms: u64,
}

fn default_max_depth() -> usize {
    64
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            primary_organization_id: None,
            max_depth: default_max_depth(),
            cache: CacheConfig::default(),
            store_retry_attempts: default_retry_attempts(),
            store_retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl HierarchyConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ORG_PRIMARY_ORGANIZATION_ID`: UUID of the primary organization
    /// - `ORG_HIERARCHY_MAX_DEPTH`: Maximum ancestor walk length (default: 64)
    /// - `ORG_CACHE_ENABLED`: Whether read-through caches are used (default: true)
    /// - `ORG_CACHE_CAPACITY`: Entries per cache (default: 10000)
    /// - `ORG_STORE_RETRY_ATTEMPTS`: Store read attempts (default: 3)
    /// - `ORG_STORE_RETRY_DELAY_MS`: Initial retry delay (default: 50)
    ///
    /// Unparseable values fall back to the defaults; use [`validate`](Self::validate)
    /// to reject nonsensical combinations.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            primary_organization_id: std::env::var("ORG_PRIMARY_ORGANIZATION_ID")
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok()),
            max_depth: std::env::var("ORG_HIERARCHY_MAX_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_depth),
            cache: CacheConfig {
                enabled: std::env::var("ORG_CACHE_ENABLED")
                    .map(|s| s != "false" && s != "0")
                    .unwrap_or(default.cache.enabled),
                capacity: std::env::var("ORG_CACHE_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.cache.capacity),
            },
            store_retry_attempts: std::env::var("ORG_STORE_RETRY_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.store_retry_attempts),
            store_retry_delay_ms: std::env::var("ORG_STORE_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.store_retry_delay_ms),
        }
    }

    /// Designate the primary organization.
    pub fn with_primary_organization(mut self, organization_id: Uuid) -> Self {
        self.primary_organization_id = Some(organization_id);
        self
    }

    /// Retry policy for store reads.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.store_retry_attempts,
            initial_delay: Duration::from_millis(self.store_retry_delay_ms),
            ..RetryConfig::default()
        }
    }

    /// Check the configuration for values the components cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_depth".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cache.capacity".to_string(),
                message: "must be positive when the cache is enabled".to_string(),
            });
        }
        if self.store_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "store_retry_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Read-through cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Serve reads from the cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries per cache
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_capacity(),
        }
    }
}
