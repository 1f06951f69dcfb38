//! warpgrid-shutdown — shutdown handshake between the autoscaler and the
//! instances it terminates.
//!
//! Three independent, TTL-bounded records per instance live in a shared
//! key-value store:
//!
//! ```text
//! instance:shutdown:<id>            "shutdown"               orchestrator → instance
//! instance:shutdownConfirmed:<id>   <ISO-8601 timestamp>     instance → orchestrator
//! instance:scaleDownProtected:<id>  "isScaleDownProtected"   temporary scale-down exemption
//! ```
//!
//! Presence is the only "true" signal; expiry is the only deletion path.
//! [`ShutdownManager`] reads and writes these records in pipelined batches.
//! Batches are not atomic, and a failed batch read returns an empty vector,
//! which callers must treat as "indeterminate" rather than "all false".
//!
//! Successful batch writes are forwarded to a [`ShutdownAudit`]; the set of
//! instances to act on comes from an [`InstanceDirectory`].

pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod keys;
pub mod manager;
pub mod types;

pub use audit::{AuditFuture, ShutdownAudit, TracingAudit};
pub use config::{parse_duration, ShutdownConfig, StoreBackend, StoreConfig};
pub use directory::{DirectoryFuture, InstanceDirectory, StaticDirectory};
pub use error::{ConfigError, ConfigResult};
pub use keys::{scale_down_protected_key, shutdown_confirmed_key, shutdown_key, RecordKind};
pub use manager::{
    confirmation_timestamp, ShutdownManager, ShutdownManagerOptions, SCALE_DOWN_PROTECTED,
    SHUTDOWN_STATUS,
};
pub use types::{InstanceDetails, InstanceId};
