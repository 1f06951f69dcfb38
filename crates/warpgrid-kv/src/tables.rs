//! redb table definitions for the standalone key-value backend.
//!
//! Keys are stored verbatim (`instance:shutdown:<id>` and friends); values
//! are JSON-serialized [`StoredRecord`](crate::redb_store::StoredRecord)s
//! carrying the payload and its absolute expiry.

use redb::TableDefinition;

/// TTL-bounded records keyed by their full store key.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
