//! # Ledger Configuration
//!
//! Configuration for the database, the auditors and the concurrency limits.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VESSEL_DB_PATH=/srv/vessel/ledger.db                               │
//! │     VESSEL_AUDIT_TOLERANCE=0.5                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger/ledger.toml (Linux)                               │
//! │     ~/Library/Application Support/com.vessel.ledger/ledger.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "vessel.db"
//! max_connections = 5
//!
//! [audit]
//! tolerance = 0.01
//! rapid_window_secs = 60
//! sample_size = 100
//!
//! [concurrency]
//! max_retries = 3
//! operation_timeout_ms = 5000
//! retry_backoff_ms = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use vessel_core::{
    DEFAULT_RECONCILIATION_SAMPLE, DEFAULT_RECONCILIATION_TOLERANCE, RAPID_DUPLICATE_WINDOW_SECS,
};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "vessel", "ledger")
        .map(|dirs| dirs.data_dir().join("vessel.db"))
        .unwrap_or_else(|| PathBuf::from("vessel.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Audit Settings
// =============================================================================

/// Settings shared by the Reconciliation Auditor and the Duplicate Detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Absolute discrepancy at or below which an item is considered in sync.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Maximum gap between two sales flagged as a rapid duplicate.
    #[serde(default = "default_rapid_window")]
    pub rapid_window_secs: i64,

    /// Items checked by a sampled reconciliation.
    #[serde(default = "default_sample_size")]
    pub sample_size: u32,
}

fn default_tolerance() -> f64 {
    DEFAULT_RECONCILIATION_TOLERANCE
}

fn default_rapid_window() -> i64 {
    RAPID_DUPLICATE_WINDOW_SECS
}

fn default_sample_size() -> u32 {
    DEFAULT_RECONCILIATION_SAMPLE
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            tolerance: default_tolerance(),
            rapid_window_secs: default_rapid_window(),
            sample_size: default_sample_size(),
        }
    }
}

// =============================================================================
// Concurrency Settings
// =============================================================================

/// Limits applied to every mutating stock operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    /// Attempts after the first one when the version check loses a race.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for one operation, lock wait included.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Pause before the first retry; doubles on each further retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_operation_timeout() -> u64 {
    5000
}

fn default_retry_backoff() -> u64 {
    10
}

const MAX_RETRY_BACKOFF_MS: u64 = 1000;

impl Default for ConcurrencySettings {
    fn default() -> Self {
        ConcurrencySettings {
            max_retries: default_max_retries(),
            operation_timeout_ms: default_operation_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl ConcurrencySettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Pause before retry number `retry` (1-based), capped at one second.
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(
            self.retry_backoff_ms
                .saturating_mul(factor)
                .min(MAX_RETRY_BACKOFF_MS),
        )
    }
}

// =============================================================================
// Ledger Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub concurrency: ConcurrencySettings,
}

impl LedgerConfig {
    /// Loads configuration: defaults, then the TOML file (explicit path or
    /// the platform config dir), then environment overrides, then validates.
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| DbError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on any failure.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_toml(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::InvalidConfig(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !self.audit.tolerance.is_finite() || self.audit.tolerance < 0.0 {
            return Err(DbError::InvalidConfig(
                "tolerance must be a non-negative number".into(),
            ));
        }

        if self.audit.rapid_window_secs <= 0 {
            return Err(DbError::InvalidConfig(
                "rapid_window_secs must be greater than 0".into(),
            ));
        }

        if self.concurrency.operation_timeout_ms == 0 {
            return Err(DbError::InvalidConfig(
                "operation_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Database pool configuration derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VESSEL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("VESSEL_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_MAX_CONNECTIONS"),
            }
        }

        if let Ok(value) = std::env::var("VESSEL_AUDIT_TOLERANCE") {
            match value.parse::<f64>() {
                Ok(t) => self.audit.tolerance = t,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_AUDIT_TOLERANCE"),
            }
        }

        if let Ok(value) = std::env::var("VESSEL_RAPID_WINDOW_SECS") {
            match value.parse::<i64>() {
                Ok(secs) => self.audit.rapid_window_secs = secs,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_RAPID_WINDOW_SECS"),
            }
        }

        if let Ok(value) = std::env::var("VESSEL_MAX_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => self.concurrency.max_retries = n,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_MAX_RETRIES"),
            }
        }

        if let Ok(value) = std::env::var("VESSEL_OPERATION_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.concurrency.operation_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_OPERATION_TIMEOUT_MS"),
            }
        }

        if let Ok(value) = std::env::var("VESSEL_RETRY_BACKOFF_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.concurrency.retry_backoff_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid VESSEL_RETRY_BACKOFF_MS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vessel", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert!((config.audit.tolerance - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.audit.rapid_window_secs, 60);
        assert_eq!(config.concurrency.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LedgerConfig::from_toml(
            r#"
            [audit]
            tolerance = 0.5

            [concurrency]
            operation_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert!((config.audit.tolerance - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.audit.rapid_window_secs, 60);
        assert_eq!(config.concurrency.operation_timeout(), Duration::from_millis(250));
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.audit.tolerance = -1.0;
        assert!(config.validate().is_err());
        config.audit.tolerance = 0.0;
        assert!(config.validate().is_ok());

        config.audit.rapid_window_secs = 0;
        assert!(config.validate().is_err());
        config.audit.rapid_window_secs = 60;

        config.concurrency.operation_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.concurrency.operation_timeout_ms = 10;

        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let settings = ConcurrencySettings::default();
        assert_eq!(settings.retry_backoff(1), Duration::from_millis(10));
        assert_eq!(settings.retry_backoff(2), Duration::from_millis(20));
        assert_eq!(settings.retry_backoff(4), Duration::from_millis(80));
        assert_eq!(settings.retry_backoff(40), Duration::from_secs(1));

        let none = ConcurrencySettings {
            retry_backoff_ms: 0,
            ..Default::default()
        };
        assert_eq!(none.retry_backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = LedgerConfig::from_toml("[audit]\ntolerance = \"lots\"").unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)));
    }

    #[test]
    fn test_toml_serialization() {
        let config = LedgerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[audit]"));
        assert!(toml_str.contains("[concurrency]"));
    }
}
