//! `shutdown.toml` configuration.
//!
//! ```toml
//! shutdown_ttl = "1h"
//! protection_ttl = "10m"
//!
//! [store]
//! backend = "redis"
//! address = "127.0.0.1:6379"
//!
//! [[instances]]
//! instance_id = "i-1"
//! group = "workers"
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use warpgrid_kv::RedisOptions;

use crate::error::{ConfigError, ConfigResult};
use crate::types::InstanceDetails;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// TTL for shutdown-status and shutdown-confirmation records.
    pub shutdown_ttl: String,
    /// Default TTL for scale-down protection when none is given per call.
    pub protection_ttl: String,
    pub store: StoreConfig,
    /// Static instance directory.
    pub instances: Vec<InstanceDetails>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            shutdown_ttl: "1h".to_string(),
            protection_ttl: "10m".to_string(),
            store: StoreConfig::default(),
            instances: Vec::new(),
        }
    }
}

/// Which key-value backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Redis,
    Redb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis `host:port`.
    pub address: String,
    pub password: Option<String>,
    pub database: Option<u32>,
    pub connect_timeout: String,
    /// Per round trip.
    pub timeout: String,
    /// Database file for the redb backend.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            address: "127.0.0.1:6379".to_string(),
            password: None,
            database: None,
            connect_timeout: "5s".to_string(),
            timeout: "2s".to_string(),
            path: PathBuf::from("/var/lib/warpgrid/shutdown.redb"),
        }
    }
}

impl ShutdownConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: ShutdownConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration parses and the TTLs are whole seconds.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, ttl) in [
            ("shutdown_ttl", self.shutdown_ttl()?),
            ("protection_ttl", self.protection_ttl()?),
        ] {
            if ttl.as_secs() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at least one second"
                )));
            }
        }
        self.redis_options()?;
        Ok(())
    }

    pub fn shutdown_ttl(&self) -> ConfigResult<Duration> {
        parse_duration(&self.shutdown_ttl)
    }

    pub fn protection_ttl(&self) -> ConfigResult<Duration> {
        parse_duration(&self.protection_ttl)
    }

    pub fn redis_options(&self) -> ConfigResult<RedisOptions> {
        Ok(RedisOptions {
            address: self.store.address.clone(),
            password: self.store.password.clone(),
            database: self.store.database,
            connect_timeout: parse_duration(&self.store.connect_timeout)?,
            timeout: parse_duration(&self.store.timeout)?,
        })
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h", "2d". A bare
/// number is seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else if let Some(days) = s.strip_suffix('d') {
        (days, 86_400_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ShutdownConfig::from_toml("").unwrap();
        assert_eq!(config, ShutdownConfig::default());
        assert_eq!(config.shutdown_ttl().unwrap(), Duration::from_secs(3600));
        assert_eq!(config.protection_ttl().unwrap(), Duration::from_secs(600));
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
shutdown_ttl = "30m"
protection_ttl = "90s"

[store]
backend = "redb"
path = "/tmp/shutdown.redb"

[[instances]]
instance_id = "i-1"
group = "workers"

[[instances]]
instance_id = "i-2"
"#;
        let config = ShutdownConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.shutdown_ttl().unwrap(), Duration::from_secs(1800));
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(config.store.path, PathBuf::from("/tmp/shutdown.redb"));
        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.instances[0].group.as_deref(), Some("workers"));
        assert_eq!(config.instances[1], InstanceDetails::new("i-2"));
    }

    #[test]
    fn redis_options_from_config() {
        let toml_str = r#"
[store]
address = "redis.internal:6380"
password = "s3cret"
database = 2
timeout = "250ms"
"#;
        let options = ShutdownConfig::from_toml(toml_str)
            .unwrap()
            .redis_options()
            .unwrap();
        assert_eq!(options.address, "redis.internal:6380");
        assert_eq!(options.password.as_deref(), Some("s3cret"));
        assert_eq!(options.database, Some(2));
        assert_eq!(options.timeout, Duration::from_millis(250));
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn sub_second_ttl_rejected() {
        let err = ShutdownConfig::from_toml(r#"shutdown_ttl = "500ms""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = ShutdownConfig::from_toml("[store]\nbackend = \"etcd\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShutdownConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("").is_err());
    }
}
