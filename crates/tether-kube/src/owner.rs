//! The custom resource instance a reconcile pass works for

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use kube::api::DynamicObject;

use tether_core::{PartOfLabelValue, ResourceKind};

use crate::error::{KubeError, Result};
use crate::object::Identity;

/// Identity of the owner object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Required to build owner references
    pub uid: Option<String>,
}

impl Owner {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Owner from any statically typed resource
    pub fn from_resource<K>(object: &K) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = object.meta();
        Self {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
            uid: meta.uid.clone(),
        }
    }

    /// Owner from a generic document; fails without type information
    pub fn from_dynamic(object: &DynamicObject) -> Result<Self> {
        let types = object.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest("owner object has no apiVersion or kind".to_string())
        })?;
        Ok(Self {
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
            namespace: object.metadata.namespace.clone().unwrap_or_default(),
            name: object.metadata.name.clone().unwrap_or_default(),
            uid: object.metadata.uid.clone(),
        })
    }

    /// Value of the part-of label for objects written for this owner
    pub fn part_of(&self) -> PartOfLabelValue {
        PartOfLabelValue::new(&self.namespace, &self.name)
    }

    /// Controller reference pointing at this owner
    pub fn owner_reference(&self, identity: &Identity) -> Result<OwnerReference> {
        let uid = self.uid.clone().ok_or_else(|| KubeError::OwnerReference {
            identity: identity.clone(),
            reason: format!("owner {}/{} has no uid", self.namespace, self.name),
        })?;
        Ok(OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    /// Whether an object of `kind` in `namespace` may point back at this owner
    ///
    /// Cluster-scoped objects and objects in another namespace cannot carry
    /// a reference to a namespaced owner.
    pub fn should_set_owner_reference(&self, kind: ResourceKind, namespace: &str) -> bool {
        if kind.is_cluster_scoped() {
            return false;
        }
        namespace.is_empty() || self.namespace.is_empty() || namespace == self.namespace
    }

    /// Insert or replace this owner's reference in `meta`
    pub fn set_owner_reference(&self, meta: &mut ObjectMeta, identity: &Identity) -> Result<()> {
        let reference = self.owner_reference(identity)?;
        let references = meta.owner_references.get_or_insert_with(Vec::new);
        match references.iter_mut().find(|r| r.uid == reference.uid) {
            Some(existing) => *existing = reference,
            None => references.push(reference),
        }
        Ok(())
    }
}
