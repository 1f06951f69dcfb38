//! warpgrid-kv — TTL-bounded key-value storage for WarpGrid coordination state.
//!
//! Every backend implements [`KvStore`]: single-key `get`, single-key
//! `set_ex` (set with expiry), and pipelined [`Batch`] execution.
//!
//! # Backends
//!
//! - [`MemoryKv`] — in-process map, expiry driven by `tokio::time`. Used in
//!   tests and local development; supports injected failures.
//! - [`RedbKv`] — single-node persistent store on redb (standalone mode).
//! - [`RedisKv`] — shared network store speaking RESP2 over TCP.
//!
//! # Semantics
//!
//! A key is either present with a string value or absent. Expiry is the only
//! way a key disappears. Batches are executed in one round trip but are not
//! transactions: each command reports its own outcome, and a failure of the
//! batch as a whole says nothing about which commands were applied.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod redis;
pub mod resp;
pub mod store;
pub mod tables;

pub use error::{KvError, KvResult};
pub use memory::MemoryKv;
pub use redb_store::RedbKv;
pub use redis::{RedisKv, RedisOptions};
pub use store::{validate_ttl, Batch, BatchReplies, Command, KvFuture, KvStore, Reply};
