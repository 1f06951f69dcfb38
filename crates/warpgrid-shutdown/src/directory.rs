//! Instance directory collaborator.
//!
//! Discovery of instance identities and metadata lives outside this crate;
//! [`StaticDirectory`] serves a fixed list, typically loaded from config.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::types::InstanceDetails;

/// Boxed future returned by [`InstanceDirectory::list_instances`].
pub type DirectoryFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<Vec<InstanceDetails>>> + Send + 'a>>;

/// Supplies the instances the coordinator acts on.
pub trait InstanceDirectory: Send + Sync {
    fn list_instances(&self) -> DirectoryFuture<'_>;
}

/// A fixed set of instances.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    instances: Vec<InstanceDetails>,
}

impl StaticDirectory {
    pub fn new(instances: Vec<InstanceDetails>) -> Self {
        Self { instances }
    }

    /// Resolve ids to known details, in the order given. Unknown ids come
    /// back as bare [`InstanceDetails::new`].
    pub fn lookup<S: AsRef<str>>(&self, instance_ids: &[S]) -> Vec<InstanceDetails> {
        let known: HashMap<&str, &InstanceDetails> = self
            .instances
            .iter()
            .map(|i| (i.instance_id.as_str(), i))
            .collect();
        instance_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                known
                    .get(id)
                    .map(|details| (*details).clone())
                    .unwrap_or_else(|| InstanceDetails::new(id))
            })
            .collect()
    }
}

impl InstanceDirectory for StaticDirectory {
    fn list_instances(&self) -> DirectoryFuture<'_> {
        Box::pin(async move { Ok(self.instances.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        StaticDirectory::new(vec![
            InstanceDetails::new("i-1").with_group("workers"),
            InstanceDetails::new("i-2").with_group("workers"),
        ])
    }

    #[tokio::test]
    async fn lists_configured_instances() {
        let all = directory().list_instances().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].instance_id, "i-1");
    }

    #[test]
    fn lookup_keeps_order_and_fills_unknown_ids() {
        let found = directory().lookup(&["i-2", "i-9", "i-1"]);
        assert_eq!(found[0].group.as_deref(), Some("workers"));
        assert_eq!(found[1], InstanceDetails::new("i-9"));
        assert_eq!(found[2].instance_id, "i-1");
    }
}
