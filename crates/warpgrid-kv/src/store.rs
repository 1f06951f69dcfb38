//! The [`KvStore`] contract and the [`Batch`] pipeline builder.
//!
//! Methods return boxed futures so the trait stays object-safe; callers hold
//! backends as `Arc<dyn KvStore>` and tests substitute [`crate::MemoryKv`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{KvError, KvResult};

/// Boxed future returned by every [`KvStore`] method.
pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = KvResult<T>> + Send + 'a>>;

/// Per-command outcomes of a batch, in submission order.
pub type BatchReplies = Vec<KvResult<Reply>>;

/// A single command inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the value stored at `key`.
    Get { key: String },
    /// Upsert `key` with `value`, expiring after `ttl`.
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
}

impl Command {
    /// The key this command touches.
    pub fn key(&self) -> &str {
        match self {
            Command::Get { key } | Command::SetEx { key, .. } => key,
        }
    }

    /// Whether this command mutates the store.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::SetEx { .. })
    }
}

/// Result of a single successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A write was acknowledged.
    Ok,
    /// A read completed; `None` means the key is absent or expired.
    Value(Option<String>),
}

impl Reply {
    /// Extract the read value. Write acknowledgements carry no value.
    pub fn into_value(self) -> Option<String> {
        match self {
            Reply::Value(value) => value,
            Reply::Ok => None,
        }
    }
}

/// An ordered list of commands sent to the store in one round trip.
///
/// Not a transaction: backends may apply a prefix of the batch and then fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a read of `key`.
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    /// Queue an upsert of `key` with an expiry.
    pub fn set_ex(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> &mut Self {
        self.commands.push(Command::SetEx {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// True if any queued command writes.
    pub fn has_writes(&self) -> bool {
        self.commands.iter().any(Command::is_write)
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// A TTL-bounded string key-value store.
pub trait KvStore: Send + Sync {
    /// Read a single key. Absent and expired keys both yield `None`.
    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<String>>;

    /// Upsert a single key, replacing any previous value and expiry.
    fn set_ex<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration) -> KvFuture<'a, ()>;

    /// Execute a batch in one round trip.
    ///
    /// The outer `Err` means the batch as a whole failed (connection lost,
    /// protocol violation); nothing can be said about which commands ran.
    /// Otherwise the returned vector holds exactly one result per command.
    fn exec(&self, batch: Batch) -> KvFuture<'_, BatchReplies>;
}

/// Check that a TTL is expressible in whole seconds, as the shared store
/// requires. Returns the TTL in seconds.
pub fn validate_ttl(ttl: Duration) -> KvResult<u64> {
    match ttl.as_secs() {
        0 => Err(KvError::InvalidTtl(ttl)),
        secs => Ok(secs),
    }
}
