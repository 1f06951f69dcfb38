//! Opening the configured key-value backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use warpgrid_kv::{KvStore, MemoryKv, RedbKv, RedisKv};
use warpgrid_shutdown::{ShutdownConfig, StoreBackend};

/// The opened backend, plus the concrete Redis handle when there is one.
pub struct OpenedStore {
    kv: Arc<dyn KvStore>,
    redis: Option<Arc<RedisKv>>,
    description: String,
}

impl OpenedStore {
    pub fn kv(&self) -> Arc<dyn KvStore> {
        self.kv.clone()
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Round-trip to the backend. Local backends are always reachable.
    pub async fn ping(&self) -> Result<()> {
        if let Some(redis) = &self.redis {
            redis.ping().await.context("redis PING failed")?;
        }
        Ok(())
    }
}

pub async fn open(config: &ShutdownConfig) -> Result<OpenedStore> {
    match config.store.backend {
        StoreBackend::Redis => {
            let options = config.redis_options()?;
            let address = options.address.clone();
            let redis = Arc::new(
                RedisKv::connect(options)
                    .await
                    .with_context(|| format!("failed to connect to redis at {address}"))?,
            );
            info!(%address, "connected to redis");
            Ok(OpenedStore {
                kv: redis.clone(),
                redis: Some(redis),
                description: format!("redis {address}"),
            })
        }
        StoreBackend::Redb => {
            let path = &config.store.path;
            let kv = RedbKv::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            info!(path = %path.display(), "opened redb store");
            Ok(OpenedStore {
                kv: Arc::new(kv),
                redis: None,
                description: format!("redb {}", path.display()),
            })
        }
        StoreBackend::Memory => {
            warn!("memory backend selected; records are lost when this process exits");
            Ok(OpenedStore {
                kv: Arc::new(MemoryKv::new()),
                redis: None,
                description: "memory".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_pings() {
        let config = ShutdownConfig::from_toml("[store]\nbackend = \"memory\"").unwrap();
        let store = open(&config).await.unwrap();
        store.ping().await.unwrap();
        assert_eq!(store.describe(), "memory");
    }

    #[tokio::test]
    async fn redb_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shutdown.redb");
        let mut config = ShutdownConfig::default();
        config.store.backend = StoreBackend::Redb;
        config.store.path = path.clone();

        let store = open(&config).await.unwrap();
        store.ping().await.unwrap();
        assert!(path.exists());
        assert!(store.describe().starts_with("redb "));
    }
}
