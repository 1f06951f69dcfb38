//! ShutdownManager — batched reads and writes of per-instance shutdown state.
//!
//! Batch writes collapse to one boolean for the whole set and only reach
//! the audit collaborator when every command succeeded. Batch reads return
//! one entry per requested instance in input order, or an empty vector when
//! the batch itself failed. Single-key operations hand store errors back
//! to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, warn};

use warpgrid_kv::{Batch, KvResult, KvStore};

use crate::audit::ShutdownAudit;
use crate::keys::{scale_down_protected_key, shutdown_confirmed_key, shutdown_key, RecordKind};
use crate::types::InstanceDetails;

/// Stored value meaning "this instance has been told to shut down".
pub const SHUTDOWN_STATUS: &str = "shutdown";

/// Stored value meaning "this instance is exempt from scale-down".
pub const SCALE_DOWN_PROTECTED: &str = "isScaleDownProtected";

/// Construction parameters for [`ShutdownManager`].
pub struct ShutdownManagerOptions {
    pub store: Arc<dyn KvStore>,
    /// TTL applied to shutdown-status and shutdown-confirmation records.
    pub shutdown_ttl: Duration,
    pub audit: Arc<dyn ShutdownAudit>,
}

/// Coordinates shutdown, confirmation, and scale-down protection records.
#[derive(Clone)]
pub struct ShutdownManager {
    store: Arc<dyn KvStore>,
    shutdown_ttl: Duration,
    audit: Arc<dyn ShutdownAudit>,
}

impl ShutdownManager {
    pub fn new(options: ShutdownManagerOptions) -> Self {
        Self {
            store: options.store,
            shutdown_ttl: options.shutdown_ttl,
            audit: options.audit,
        }
    }

    // ── Shutdown status ────────────────────────────────────────────

    /// Mark every instance as shut down with the default status.
    pub async fn set_shutdown_status(&self, instances: &[InstanceDetails]) -> bool {
        self.set_shutdown_status_with(instances, SHUTDOWN_STATUS).await
    }

    /// Upsert the shutdown-status record of every instance in one batch.
    /// An empty set writes nothing but is still audited once.
    pub async fn set_shutdown_status_with(
        &self,
        instances: &[InstanceDetails],
        status: &str,
    ) -> bool {
        let mut batch = Batch::new();
        for instance in instances {
            let key = shutdown_key(&instance.instance_id);
            debug!(%key, %status, "writing shutdown status");
            batch.set_ex(key, status, self.shutdown_ttl);
        }

        if !self.write_batch(batch, RecordKind::ShutdownStatus).await {
            return false;
        }

        if let Err(e) = self.audit.save_shutdown_events(instances).await {
            warn!(instances = instances.len(), error = %e, "failed to audit shutdown events");
        }
        true
    }

    /// Whether each instance has been told to shut down, in input order.
    ///
    /// An empty result means the batch read failed, not "all false".
    pub async fn get_shutdown_statuses<S: AsRef<str>>(&self, instance_ids: &[S]) -> Vec<bool> {
        let keys = instance_ids.iter().map(|id| shutdown_key(id.as_ref()));
        match self.read_batch(keys, RecordKind::ShutdownStatus).await {
            Some(values) => values
                .into_iter()
                .map(|value| value.as_deref() == Some(SHUTDOWN_STATUS))
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn get_shutdown_status(&self, instance_id: &str) -> KvResult<bool> {
        let key = shutdown_key(instance_id);
        let value = self.store.get(&key).await?;
        debug!(%key, ?value, "read shutdown status");
        Ok(value.as_deref() == Some(SHUTDOWN_STATUS))
    }

    // ── Shutdown confirmation ──────────────────────────────────────

    /// Confirm shutdown for every instance, stamped with the current time.
    pub async fn set_shutdown_confirmation(&self, instances: &[InstanceDetails]) -> bool {
        self.set_shutdown_confirmation_with(instances, &confirmation_timestamp())
            .await
    }

    /// Upsert the confirmation record of every instance in one batch.
    pub async fn set_shutdown_confirmation_with(
        &self,
        instances: &[InstanceDetails],
        status: &str,
    ) -> bool {
        let mut batch = Batch::new();
        for instance in instances {
            let key = shutdown_confirmed_key(&instance.instance_id);
            debug!(%key, %status, "writing shutdown confirmation");
            batch.set_ex(key, status, self.shutdown_ttl);
        }

        if !self
            .write_batch(batch, RecordKind::ShutdownConfirmation)
            .await
        {
            return false;
        }

        if let Err(e) = self.audit.save_shutdown_confirmation_events(instances).await {
            warn!(instances = instances.len(), error = %e, "failed to audit shutdown confirmation events");
        }
        true
    }

    /// The raw confirmation value of each instance, `None` if unconfirmed.
    ///
    /// An empty result means the batch read failed.
    pub async fn get_shutdown_confirmations<S: AsRef<str>>(
        &self,
        instance_ids: &[S],
    ) -> Vec<Option<String>> {
        let keys = instance_ids
            .iter()
            .map(|id| shutdown_confirmed_key(id.as_ref()));
        self.read_batch(keys, RecordKind::ShutdownConfirmation)
            .await
            .unwrap_or_default()
    }

    pub async fn get_shutdown_confirmation(&self, instance_id: &str) -> KvResult<Option<String>> {
        let key = shutdown_confirmed_key(instance_id);
        let value = self.store.get(&key).await?;
        debug!(%key, ?value, "read shutdown confirmation");
        Ok(value)
    }

    // ── Scale-down protection ──────────────────────────────────────

    /// Protect an instance from scale-down for `ttl`.
    pub async fn set_scale_down_protected(&self, instance_id: &str, ttl: Duration) -> KvResult<()> {
        self.set_scale_down_protected_with(instance_id, ttl, SCALE_DOWN_PROTECTED)
            .await
    }

    /// Write a protection record with an arbitrary mode string. Only
    /// [`SCALE_DOWN_PROTECTED`] reads back as protected.
    pub async fn set_scale_down_protected_with(
        &self,
        instance_id: &str,
        ttl: Duration,
        mode: &str,
    ) -> KvResult<()> {
        let key = scale_down_protected_key(instance_id);
        debug!(%key, %mode, ttl_secs = ttl.as_secs(), "writing scale-down protection");
        self.store.set_ex(&key, mode, ttl).await
    }

    /// Whether each instance is protected from scale-down, in input order.
    ///
    /// An empty result means the batch read failed.
    pub async fn are_scale_down_protected<S: AsRef<str>>(&self, instance_ids: &[S]) -> Vec<bool> {
        let keys = instance_ids
            .iter()
            .map(|id| scale_down_protected_key(id.as_ref()));
        match self.read_batch(keys, RecordKind::ScaleDownProtection).await {
            Some(values) => values
                .into_iter()
                .map(|value| value.as_deref() == Some(SCALE_DOWN_PROTECTED))
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn is_scale_down_protected(&self, instance_id: &str) -> KvResult<bool> {
        let key = scale_down_protected_key(instance_id);
        let value = self.store.get(&key).await?;
        debug!(%key, ?value, "read scale-down protection");
        Ok(value.as_deref() == Some(SCALE_DOWN_PROTECTED))
    }

    // ── Batch plumbing ─────────────────────────────────────────────

    /// Execute a write-only batch. True only if the batch and every
    /// command in it succeeded.
    async fn write_batch(&self, batch: Batch, kind: RecordKind) -> bool {
        let commands = batch.len();
        match self.store.exec(batch).await {
            Ok(replies) => {
                let failed: Vec<_> = replies.iter().filter_map(|r| r.as_ref().err()).collect();
                match failed.first() {
                    None => true,
                    Some(first) => {
                        error!(
                            record = ?kind,
                            commands,
                            failed = failed.len(),
                            error = %first,
                            "batch write partially failed"
                        );
                        false
                    }
                }
            }
            Err(e) => {
                error!(record = ?kind, commands, error = %e, "batch write failed");
                false
            }
        }
    }

    /// Execute a read-only batch over `keys`. `None` if the batch failed.
    ///
    /// A single failed read inside an otherwise successful batch is logged
    /// and reported as absent.
    async fn read_batch<I>(&self, keys: I, kind: RecordKind) -> Option<Vec<Option<String>>>
    where
        I: IntoIterator<Item = String>,
    {
        let keys: Vec<String> = keys.into_iter().collect();
        let mut batch = Batch::new();
        for key in &keys {
            batch.get(key.as_str());
        }

        match self.store.exec(batch).await {
            Ok(replies) => Some(
                replies
                    .into_iter()
                    .zip(&keys)
                    .map(|(reply, key)| match reply {
                        Ok(reply) => reply.into_value(),
                        Err(e) => {
                            warn!(%key, error = %e, "read failed inside batch, treating as absent");
                            None
                        }
                    })
                    .collect(),
            ),
            Err(e) => {
                error!(record = ?kind, keys = keys.len(), error = %e, "batch read failed");
                None
            }
        }
    }
}

/// Current UTC time as ISO-8601 with millisecond precision, e.g.
/// `2026-10-19T08:15:30.123Z`.
pub fn confirmation_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
