//! Audit collaborator interface.
//!
//! The audit subsystem durably records shutdown and confirmation events.
//! [`ShutdownManager`](crate::ShutdownManager) awaits it after a successful
//! batch write; its outcome is logged but never changes the write result.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::types::InstanceDetails;

/// Boxed future returned by [`ShutdownAudit`] methods.
pub type AuditFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Receives the instance sets of successful shutdown-state writes.
pub trait ShutdownAudit: Send + Sync {
    /// Called once per successful shutdown-status batch.
    fn save_shutdown_events<'a>(&'a self, instances: &'a [InstanceDetails]) -> AuditFuture<'a>;

    /// Called once per successful shutdown-confirmation batch.
    fn save_shutdown_confirmation_events<'a>(
        &'a self,
        instances: &'a [InstanceDetails],
    ) -> AuditFuture<'a>;
}

/// Records audit events as structured log lines under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl TracingAudit {
    fn record(event: &'static str, instances: &[InstanceDetails]) {
        for instance in instances {
            info!(
                target: "audit",
                event,
                instance_id = %instance.instance_id,
                group = instance.group.as_deref().unwrap_or(""),
                region = instance.region.as_deref().unwrap_or(""),
                cloud = instance.cloud.as_deref().unwrap_or(""),
                "shutdown audit event"
            );
        }
    }
}

impl ShutdownAudit for TracingAudit {
    fn save_shutdown_events<'a>(&'a self, instances: &'a [InstanceDetails]) -> AuditFuture<'a> {
        Box::pin(async move {
            Self::record("shutdown", instances);
            Ok(())
        })
    }

    fn save_shutdown_confirmation_events<'a>(
        &'a self,
        instances: &'a [InstanceDetails],
    ) -> AuditFuture<'a> {
        Box::pin(async move {
            Self::record("shutdown_confirmation", instances);
            Ok(())
        })
    }
}
