//! In-memory TTL store for tests and local development.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests can run with a
//! paused clock and `tokio::time::advance` past a TTL instead of sleeping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::store::{validate_ttl, Batch, BatchReplies, Command, KvFuture, KvStore, Reply};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Keys whose commands fail individually (single-key and in batches).
    failing_keys: HashSet<String>,
}

impl Inner {
    fn read(&mut self, key: &str, now: Instant) -> KvResult<Option<String>> {
        if self.failing_keys.contains(key) {
            return Err(KvError::Server(format!("injected failure for {key}")));
        }
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn write(&mut self, key: &str, value: &str, ttl: Duration, now: Instant) -> KvResult<()> {
        validate_ttl(ttl)?;
        if self.failing_keys.contains(key) {
            return Err(KvError::Server(format!("injected failure for {key}")));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

/// Shared in-memory key-value store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<Inner>>,
    /// Number of upcoming batches to fail.
    pending_failures: Arc<AtomicUsize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next batch fail as a whole.
    pub fn fail_next_batch(&self) {
        self.pending_failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Make every command on `key` fail individually.
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.inner.lock().await.failing_keys.insert(key.into());
    }

    /// Number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner.entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live for `key`, if it is present.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    fn take_batch_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl KvStore for MemoryKv {
    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = Instant::now();
            self.inner.lock().await.read(key, now)
        })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let now = Instant::now();
            self.inner.lock().await.write(key, value, ttl, now)
        })
    }

    fn exec(&self, batch: Batch) -> KvFuture<'_, BatchReplies> {
        Box::pin(async move {
            if self.take_batch_failure() {
                debug!(commands = batch.len(), "injected batch failure");
                return Err(KvError::BatchFailed("injected failure".to_string()));
            }

            let now = Instant::now();
            let mut inner = self.inner.lock().await;
            let replies = batch
                .into_commands()
                .into_iter()
                .map(|command| match command {
                    Command::Get { key } => inner.read(&key, now).map(Reply::Value),
                    Command::SetEx { key, value, ttl } => {
                        inner.write(&key, &value, ttl, now).map(|()| Reply::Ok)
                    }
                })
                .collect();
            Ok(replies)
        })
    }
}
