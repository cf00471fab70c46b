//! Configuration for the authz engine.

use std::time::Duration;

use authz_engine_sdk::CombineMode;
use serde::Deserialize;

use crate::domain::DomainError;

/// Upper bound for `cache.default_ttl_secs`: one year.
pub const MAX_DEFAULT_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `write_behind.flush_interval_ms`: one day.
pub const MAX_FLUSH_INTERVAL_MS: u64 = 24 * 60 * 60 * 1_000;

/// Module configuration. Deserialized by the host; this crate never reads
/// files or the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthzEngineConfig {
    pub cache: PermissionCacheConfig,
    pub write_behind: WriteBehindConfig,
    pub refresh_ahead: RefreshAheadConfig,
    pub scopes: ScopeConfig,
}

/// Permission cache sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionCacheConfig {
    /// Maximum number of cached subjects.
    pub capacity: usize,
    /// TTL applied when a caller does not pass one.
    pub default_ttl_secs: u64,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl_secs: 300,
        }
    }
}

impl PermissionCacheConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteBehindConfig {
    /// Queue length that triggers an immediate flush.
    pub max_batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval_ms: 1_000,
        }
    }
}

impl WriteBehindConfig {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshAheadConfig {
    /// Fraction of the total TTL; a hit with less remaining triggers a
    /// background reload.
    pub refresh_threshold: f64,
}

impl Default for RefreshAheadConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    /// Used by `resolve_scopes` when the caller passes no mode.
    pub default_combine_mode: CombineMode,
}

impl AuthzEngineConfig {
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending setting.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.cache.capacity == 0 {
            return Err(DomainError::InvalidConfig(
                "cache.capacity must be greater than 0".to_owned(),
            ));
        }
        if self.cache.default_ttl_secs == 0 {
            return Err(DomainError::InvalidConfig(
                "cache.default_ttl_secs must be greater than 0".to_owned(),
            ));
        }
        if self.cache.default_ttl_secs > MAX_DEFAULT_TTL_SECS {
            return Err(DomainError::InvalidConfig(format!(
                "cache.default_ttl_secs must be at most {MAX_DEFAULT_TTL_SECS}, got {}",
                self.cache.default_ttl_secs
            )));
        }
        if self.write_behind.max_batch_size == 0 {
            return Err(DomainError::InvalidConfig(
                "write_behind.max_batch_size must be greater than 0".to_owned(),
            ));
        }
        if self.write_behind.flush_interval_ms == 0 {
            return Err(DomainError::InvalidConfig(
                "write_behind.flush_interval_ms must be greater than 0".to_owned(),
            ));
        }
        if self.write_behind.flush_interval_ms > MAX_FLUSH_INTERVAL_MS {
            return Err(DomainError::InvalidConfig(format!(
                "write_behind.flush_interval_ms must be at most {MAX_FLUSH_INTERVAL_MS}, got {}",
                self.write_behind.flush_interval_ms
            )));
        }
        let threshold = self.refresh_ahead.refresh_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(DomainError::InvalidConfig(format!(
                "refresh_ahead.refresh_threshold must be in (0, 1), got {threshold}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = AuthzEngineConfig::default();
        assert_eq!(cfg.cache.capacity, 10_000);
        assert_eq!(cfg.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.write_behind.max_batch_size, 100);
        assert_eq!(cfg.write_behind.flush_interval(), Duration::from_secs(1));
        assert!((cfg.refresh_ahead.refresh_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.scopes.default_combine_mode, CombineMode::And);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: AuthzEngineConfig = serde_json::from_value(json!({
            "cache": { "capacity": 50 },
            "scopes": { "default_combine_mode": "priority" }
        }))
        .unwrap();
        assert_eq!(cfg.cache.capacity, 50);
        assert_eq!(cfg.cache.default_ttl_secs, 300);
        assert_eq!(cfg.scopes.default_combine_mode, CombineMode::Priority);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<AuthzEngineConfig>(json!({
            "cache": { "capacity": 50, "ttl": 10 }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = AuthzEngineConfig::default();
        cfg.cache.capacity = 0;
        assert!(matches!(cfg.validate(), Err(DomainError::InvalidConfig(_))));

        let mut cfg = AuthzEngineConfig::default();
        cfg.refresh_ahead.refresh_threshold = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AuthzEngineConfig::default();
        cfg.write_behind.flush_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AuthzEngineConfig::default();
        cfg.cache.default_ttl_secs = u64::MAX;
        assert!(cfg.validate().is_err());
        cfg.cache.default_ttl_secs = MAX_DEFAULT_TTL_SECS;
        assert!(cfg.validate().is_ok());

        let mut cfg = AuthzEngineConfig::default();
        cfg.write_behind.flush_interval_ms = u64::MAX;
        assert!(cfg.validate().is_err());
    }
}
