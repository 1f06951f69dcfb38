//! Store key naming. These strings are shared with every other reader of
//! the store and must not change.

/// The three per-instance record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ShutdownStatus,
    ShutdownConfirmation,
    ScaleDownProtection,
}

impl RecordKind {
    /// Key prefix, including the trailing separator.
    pub const fn prefix(self) -> &'static str {
        match self {
            RecordKind::ShutdownStatus => "instance:shutdown:",
            RecordKind::ShutdownConfirmation => "instance:shutdownConfirmed:",
            RecordKind::ScaleDownProtection => "instance:scaleDownProtected:",
        }
    }

    pub fn key(self, instance_id: &str) -> String {
        format!("{}{instance_id}", self.prefix())
    }
}

pub fn shutdown_key(instance_id: &str) -> String {
    RecordKind::ShutdownStatus.key(instance_id)
}

pub fn shutdown_confirmed_key(instance_id: &str) -> String {
    RecordKind::ShutdownConfirmation.key(instance_id)
}

pub fn scale_down_protected_key(instance_id: &str) -> String {
    RecordKind::ScaleDownProtection.key(instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_wire_format() {
        assert_eq!(shutdown_key("i-1"), "instance:shutdown:i-1");
        assert_eq!(shutdown_confirmed_key("i-1"), "instance:shutdownConfirmed:i-1");
        assert_eq!(scale_down_protected_key("i-1"), "instance:scaleDownProtected:i-1");
    }

    #[test]
    fn namespaces_do_not_overlap() {
        let kinds = [
            RecordKind::ShutdownStatus,
            RecordKind::ShutdownConfirmation,
            RecordKind::ScaleDownProtection,
        ];
        for a in kinds {
            for b in kinds {
                if a != b {
                    assert!(!b.key("x").starts_with(a.prefix()), "{a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn ids_are_embedded_verbatim() {
        assert_eq!(
            shutdown_key("projects/p/zones/z/instances/vm:1"),
            "instance:shutdown:projects/p/zones/z/instances/vm:1"
        );
    }
}
