//! Instance identity as handed over by the instance directory.

use serde::{Deserialize, Serialize};

/// Stable identifier of a compute instance.
pub type InstanceId = String;

/// An instance participating in the shutdown handshake.
///
/// Only `instance_id` drives key naming; the remaining fields are carried
/// through to the audit collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InstanceDetails {
    pub instance_id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl InstanceDetails {
    /// Details with nothing but the identifier.
    pub fn new(instance_id: impl Into<InstanceId>) -> Self {
        Self {
            instance_id: instance_id.into(),
            group: None,
            region: None,
            cloud: None,
            private_ip: None,
            public_ip: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}
