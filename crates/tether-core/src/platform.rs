//! API capabilities of the live cluster

use std::collections::BTreeMap;

use crate::kind::ResourceKind;

const PDB_V1BETA1: &str = "policy/v1beta1";

/// What the connected API server serves, keyed by API `kind`
///
/// Values are `group/version` strings as returned by discovery
/// (`v1` for the core group).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    preferred: BTreeMap<String, String>,
    other: BTreeMap<String, Vec<String>>,
    server_version: Option<String>,
}

impl PlatformInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from discovery results
    pub fn from_version_maps(
        preferred: BTreeMap<String, String>,
        other: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            preferred,
            other,
            server_version: None,
        }
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = Some(version.into());
        self
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Preferred `group/version` for a kind, if the server advertises it
    pub fn preferred_version(&self, kind: ResourceKind) -> Option<&str> {
        self.preferred.get(kind.kind_name()).map(String::as_str)
    }

    /// Non-preferred versions also served for a kind
    pub fn other_versions(&self, kind: ResourceKind) -> &[String] {
        self.other
            .get(kind.kind_name())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether disruption budgets must be written as `policy/v1beta1`
    ///
    /// Only an explicit v1beta1 preference selects the old version; an
    /// unknown or absent preference means `policy/v1`.
    pub fn use_v1beta1_pdb(&self) -> bool {
        self.preferred_version(ResourceKind::PodDisruptionBudget) == Some(PDB_V1BETA1)
    }

    /// Kinds the garbage collector iterates
    pub fn managed_kinds(&self, support_extra_kind: bool) -> Vec<ResourceKind> {
        ResourceKind::all()
            .iter()
            .copied()
            .filter(|kind| support_extra_kind || *kind != ResourceKind::CiliumNetworkPolicy)
            .collect()
    }
}
