//! Store-backed façades
//!
//! A feature never edits a shared object directly: a manager reads the
//! object from the store (or a fresh empty one), merges a keyed fragment in
//! with a [`MergeFunction`](tether_core::MergeFunction) and writes it back.
//! Independently written features can then contribute to the same role,
//! service or policy within one pass.

mod cilium;
mod data;
mod network_policy;
mod rbac;
mod service;

pub use cilium::{CiliumPolicyManager, CiliumPolicySpec};
pub use data::DataManager;
pub use network_policy::NetworkPolicyManager;
pub use rbac::RbacManager;
pub use service::ServiceManager;

use tether_core::ResourceKind;

use crate::error::{KubeError, Result};
use crate::object::ManagedObject;
use crate::store::Store;

/// Typed object of the store, or a fresh one with its identity set
fn load<T>(store: &Store, kind: ResourceKind, namespace: &str, name: &str) -> Result<T>
where
    T: TryFrom<ManagedObject, Error = KubeError>,
{
    let (object, _found) = store.get_or_create(kind, namespace, name);
    T::try_from(object)
}

#[cfg(test)]
pub(crate) fn test_store() -> Store {
    use crate::owner::Owner;
    use crate::registry::KindRegistry;
    use crate::store::StoreOptions;
    use std::sync::Arc;

    Store::new(
        Some(Owner::new("example.com/v1", "Agent", "ns", "agent").with_uid("uid-owner")),
        Arc::new(KindRegistry::with_defaults()),
        StoreOptions::default(),
    )
}
