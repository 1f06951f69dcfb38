//! RedbKv — redb-backed TTL store for standalone deployments.
//!
//! Each value is stored with an absolute expiry in epoch milliseconds.
//! Expired rows read as absent; they are physically removed when they are
//! overwritten or when the database is opened. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::store::{validate_ttl, Batch, BatchReplies, Command, KvFuture, KvStore, Reply};
use crate::tables::RECORDS;

/// Convert any `Display` error into a `KvError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| KvError::$variant(e.to_string())
    };
}

/// On-disk representation of a single key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRecord {
    pub value: String,
    /// Epoch milliseconds after which the record reads as absent.
    pub expires_at_ms: u64,
}

impl StoredRecord {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms > now_ms
    }
}

/// Thread-safe TTL store backed by redb.
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> KvResult<Self> {
        let db = Database::create(path).map_err(map_err!(Storage))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        let purged = store.purge_expired()?;
        debug!(?path, purged, "redb kv store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> KvResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Storage))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory redb kv store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> KvResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Storage))?;
        txn.open_table(RECORDS).map_err(map_err!(Storage))?;
        txn.commit().map_err(map_err!(Storage))?;
        Ok(())
    }

    /// Remove every expired row. Returns the number of rows removed.
    pub fn purge_expired(&self) -> KvResult<usize> {
        self.purge_expired_at(now_ms())
    }

    fn purge_expired_at(&self, now_ms: u64) -> KvResult<usize> {
        // Collect keys in a read transaction first.
        let expired: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Storage))?;
            let table = txn.open_table(RECORDS).map_err(map_err!(Storage))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Storage))? {
                let (key, value) = entry.map_err(map_err!(Storage))?;
                let record = decode(value.value())?;
                if !record.is_live(now_ms) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        if expired.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Storage))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Storage))?;
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Storage))?;
            }
        }
        txn.commit().map_err(map_err!(Storage))?;
        Ok(expired.len())
    }

    fn get_at(&self, key: &str, now_ms: u64) -> KvResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Storage))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Storage))?;
        read_live(&table, key, now_ms)
    }

    fn set_at(&self, key: &str, value: &str, ttl: Duration, now_ms: u64) -> KvResult<()> {
        let record = record_for(value, ttl, now_ms)?;
        let txn = self.db.begin_write().map_err(map_err!(Storage))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Storage))?;
            write_record(&mut table, key, &record)?;
        }
        txn.commit().map_err(map_err!(Storage))?;
        debug!(%key, expires_at_ms = record.expires_at_ms, "record stored");
        Ok(())
    }

    fn exec_at(&self, batch: Batch, now_ms: u64) -> KvResult<BatchReplies> {
        if !batch.has_writes() {
            let txn = self.db.begin_read().map_err(map_err!(BatchFailed))?;
            let table = txn.open_table(RECORDS).map_err(map_err!(BatchFailed))?;
            let replies = batch
                .commands()
                .iter()
                .map(|command| read_live(&table, command.key(), now_ms).map(Reply::Value))
                .collect();
            return Ok(replies);
        }

        let txn = self.db.begin_write().map_err(map_err!(BatchFailed))?;
        let replies = {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(BatchFailed))?;
            let mut replies = Vec::with_capacity(batch.len());
            for command in batch.into_commands() {
                let reply = match command {
                    Command::Get { key } => read_live(&table, &key, now_ms).map(Reply::Value),
                    Command::SetEx { key, value, ttl } => record_for(&value, ttl, now_ms)
                        .and_then(|record| write_record(&mut table, &key, &record))
                        .map(|()| Reply::Ok),
                };
                replies.push(reply);
            }
            replies
        };
        txn.commit().map_err(map_err!(BatchFailed))?;
        Ok(replies)
    }
}

impl KvStore for RedbKv {
    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>> {
        Box::pin(async move { self.get_at(key, now_ms()) })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> KvFuture<'a, ()> {
        Box::pin(async move { self.set_at(key, value, ttl, now_ms()) })
    }

    fn exec(&self, batch: Batch) -> KvFuture<'_, BatchReplies> {
        Box::pin(async move { self.exec_at(batch, now_ms()) })
    }
}

fn record_for(value: &str, ttl: Duration, now_ms: u64) -> KvResult<StoredRecord> {
    let secs = validate_ttl(ttl)?;
    Ok(StoredRecord {
        value: value.to_string(),
        expires_at_ms: now_ms.saturating_add(secs.saturating_mul(1000)),
    })
}

fn read_live<T>(table: &T, key: &str, now_ms: u64) -> KvResult<Option<String>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Storage))? {
        Some(guard) => {
            let record = decode(guard.value())?;
            Ok(record.is_live(now_ms).then_some(record.value))
        }
        None => Ok(None),
    }
}

fn write_record(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    record: &StoredRecord,
) -> KvResult<()> {
    let bytes = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
    table
        .insert(key, bytes.as_slice())
        .map_err(map_err!(Storage))?;
    Ok(())
}

fn decode(bytes: &[u8]) -> KvResult<StoredRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
