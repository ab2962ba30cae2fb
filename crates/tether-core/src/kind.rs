//! The closed set of resource kinds managed by the store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A resource kind the operator creates, updates and garbage-collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    Service,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    NetworkPolicy,
    /// Policy-engine network policy, carried as a generic document
    CiliumNetworkPolicy,
    PodDisruptionBudget,
    ValidatingWebhookConfiguration,
    MutatingWebhookConfiguration,
    ApiService,
}

impl ResourceKind {
    /// Every managed kind, in a stable order
    pub const fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::ConfigMap,
            ResourceKind::Secret,
            ResourceKind::Service,
            ResourceKind::ServiceAccount,
            ResourceKind::Role,
            ResourceKind::ClusterRole,
            ResourceKind::RoleBinding,
            ResourceKind::ClusterRoleBinding,
            ResourceKind::NetworkPolicy,
            ResourceKind::CiliumNetworkPolicy,
            ResourceKind::PodDisruptionBudget,
            ResourceKind::ValidatingWebhookConfiguration,
            ResourceKind::MutatingWebhookConfiguration,
            ResourceKind::ApiService,
        ]
    }

    /// Whether objects of this kind live outside any namespace
    pub fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            ResourceKind::ClusterRole
                | ResourceKind::ClusterRoleBinding
                | ResourceKind::ValidatingWebhookConfiguration
                | ResourceKind::MutatingWebhookConfiguration
                | ResourceKind::ApiService
        )
    }

    /// The `kind` field as served by the API server
    pub fn kind_name(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Service => "Service",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::Role => "Role",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::NetworkPolicy => "NetworkPolicy",
            ResourceKind::CiliumNetworkPolicy => "CiliumNetworkPolicy",
            ResourceKind::PodDisruptionBudget => "PodDisruptionBudget",
            ResourceKind::ValidatingWebhookConfiguration => "ValidatingWebhookConfiguration",
            ResourceKind::MutatingWebhookConfiguration => "MutatingWebhookConfiguration",
            ResourceKind::ApiService => "APIService",
        }
    }

    /// Resolve an API `kind` string
    pub fn from_kind_name(kind: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.kind_name().eq_ignore_ascii_case(kind))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_kind_name(s.trim()).ok_or_else(|| CoreError::UnknownKind {
            kind: s.to_string(),
        })
    }
}
