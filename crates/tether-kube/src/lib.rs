//! Tether Kube - Kubernetes integration for Tether
//!
//! This crate provides:
//! - **Store**: Per-pass desired state with ownership and marker metadata injection
//! - **Apply Engine**: Create-or-update with per-kind preprocessing and semantic equality
//! - **Garbage Collection**: Label-scoped deletion of objects the owner no longer wants
//! - **Façades**: Merge-aware builders for RBAC, services, network policies and data
//! - **Live Clients**: A kube-backed client and an in-memory mock for tests
//! - **Manifests**: Multi-document YAML input and line diffs of planned updates

pub mod client;
pub mod diff;
pub mod error;
pub mod facades;
pub mod manifest;
pub mod mock;
pub mod object;
pub mod owner;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use client::{KubeLiveClient, LiveClient, discover_platform};
pub use diff::render_diff;
pub use error::{Action, KubeError, ReconcileError, Result};
pub use facades::{
    CiliumPolicyManager, CiliumPolicySpec, DataManager, NetworkPolicyManager, RbacManager,
    ServiceManager,
};
pub use manifest::parse_manifest;
pub use mock::{MockLiveClient, MockOperation, OperationCounts};
pub use object::{DeleteTarget, Identity, ManagedList, ManagedObject};
pub use owner::Owner;
pub use registry::{EqualityFn, KindRegistry, KindStrategy, PreprocessFn};
pub use store::{PlannedChange, ReconcilePlan, Store, StoreOptions};
