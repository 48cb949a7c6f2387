//! Workload owner identity attached to reservations

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of workload owning an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Pod,
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    /// Any controller kind the allocator has no special knowledge of
    Other,
}

/// Workload that holds a reservation
///
/// The allocator never branches on `kind`; it only compares [`OwnerKey`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: OwnerKind,
    pub namespace: String,
    pub name: String,
    pub uid: Uuid,
}

impl OwnerReference {
    pub fn new(
        kind: OwnerKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: Uuid,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            uid,
        }
    }

    /// Shorthand for a bare pod owner
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>, uid: Uuid) -> Self {
        Self::new(OwnerKind::Pod, namespace, name, uid)
    }

    /// Opaque identity used to match reservations
    pub fn key(&self) -> OwnerKey {
        OwnerKey(self.uid)
    }

    /// `namespace/name`
    pub fn namespaced_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for OwnerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} ({})", self.kind, self.namespaced_name(), self.uid)
    }
}

/// Identity of one generation of a workload
///
/// A recreated workload keeps its name but gets a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(Uuid);

impl OwnerKey {
    pub fn new(uid: Uuid) -> Self {
        Self(uid)
    }
}

impl From<Uuid> for OwnerKey {
    fn from(uid: Uuid) -> Self {
        Self(uid)
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_follows_uid_not_name() {
        let first =
            OwnerReference::new(OwnerKind::StatefulSet, "default", "db-0", Uuid::new_v4());
        let recreated =
            OwnerReference::new(OwnerKind::StatefulSet, "default", "db-0", Uuid::new_v4());

        assert_eq!(first.namespaced_name(), recreated.namespaced_name());
        assert_ne!(first.key(), recreated.key());
        assert_eq!(first.key(), OwnerKey::from(first.uid));
    }
}
