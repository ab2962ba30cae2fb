//! Managed objects and their identities
//!
//! [`ManagedObject`] is a sum type: a typed variant for every kind with a
//! compiled k8s-openapi binding, and a [`ManagedObject::Document`] variant
//! carrying a generic document for kinds without one (API service
//! registrations, policy-engine network policies, and disruption budgets on
//! clusters that only serve `policy/v1beta1`).

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::Serialize;
use std::fmt;

use tether_core::ResourceKind;

use crate::error::{KubeError, Result};

/// A fully-built object pending reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManagedObject {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Service(Service),
    ServiceAccount(ServiceAccount),
    Role(Role),
    ClusterRole(ClusterRole),
    RoleBinding(RoleBinding),
    ClusterRoleBinding(ClusterRoleBinding),
    NetworkPolicy(NetworkPolicy),
    PodDisruptionBudget(PodDisruptionBudget),
    ValidatingWebhookConfiguration(ValidatingWebhookConfiguration),
    MutatingWebhookConfiguration(MutatingWebhookConfiguration),
    /// Generic document for kinds without a typed binding
    Document(DynamicObject),
}

macro_rules! typed_variants {
    ($($variant:ident),* $(,)?) => {
        impl ManagedObject {
            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $(ManagedObject::$variant(o) => &o.metadata,)*
                    ManagedObject::Document(d) => &d.metadata,
                }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(ManagedObject::$variant(o) => &mut o.metadata,)*
                    ManagedObject::Document(d) => &mut d.metadata,
                }
            }

            /// Name of the variant, for type-mismatch reports
            pub fn variant_name(&self) -> &'static str {
                match self {
                    $(ManagedObject::$variant(_) => stringify!($variant),)*
                    ManagedObject::Document(_) => "Document",
                }
            }

            /// Convert into a generic document for the dynamic API
            pub fn to_dynamic(&self) -> Result<DynamicObject> {
                match self {
                    $(ManagedObject::$variant(o) => {
                        Ok(serde_json::from_value(serde_json::to_value(o)?)?)
                    })*
                    ManagedObject::Document(d) => Ok(d.clone()),
                }
            }
        }

        $(
            impl From<$variant> for ManagedObject {
                fn from(object: $variant) -> Self {
                    ManagedObject::$variant(object)
                }
            }

            impl TryFrom<ManagedObject> for $variant {
                type Error = KubeError;

                fn try_from(object: ManagedObject) -> Result<Self> {
                    match object {
                        ManagedObject::$variant(o) => Ok(o),
                        other => Err(KubeError::TypeMismatch {
                            kind: ResourceKind::$variant,
                            expected: stringify!($variant).to_string(),
                            found: other.variant_name().to_string(),
                        }),
                    }
                }
            }

            impl<'a> TryFrom<&'a ManagedObject> for &'a $variant {
                type Error = KubeError;

                fn try_from(object: &'a ManagedObject) -> Result<Self> {
                    match object {
                        ManagedObject::$variant(o) => Ok(o),
                        other => Err(KubeError::TypeMismatch {
                            kind: ResourceKind::$variant,
                            expected: stringify!($variant).to_string(),
                            found: other.variant_name().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

typed_variants!(
    ConfigMap,
    Secret,
    Service,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    NetworkPolicy,
    PodDisruptionBudget,
    ValidatingWebhookConfiguration,
    MutatingWebhookConfiguration,
);

impl From<DynamicObject> for ManagedObject {
    fn from(object: DynamicObject) -> Self {
        ManagedObject::Document(object)
    }
}

impl ManagedObject {
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    pub fn as_document(&self) -> Option<&DynamicObject> {
        match self {
            ManagedObject::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut DynamicObject> {
        match self {
            ManagedObject::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Generic document of `kind`, or a type mismatch
    pub fn into_document(self, kind: ResourceKind) -> Result<DynamicObject> {
        match self {
            ManagedObject::Document(d) => Ok(d),
            other => Err(KubeError::TypeMismatch {
                kind,
                expected: "Document".to_string(),
                found: other.variant_name().to_string(),
            }),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// (kind, namespace, name) key of a managed object
///
/// The namespace is empty for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl Identity {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = if kind.is_cluster_scoped() {
            String::new()
        } else {
            namespace.into()
        };
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }

    pub fn from_meta(kind: ResourceKind, meta: &ObjectMeta) -> Self {
        Self::new(
            kind,
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default(),
        )
    }

    /// Namespace argument for API calls
    pub fn namespace_opt(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Minimal delete request: identity plus the API coordinates of its kind
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTarget {
    pub identity: Identity,
    pub api_resource: ApiResource,
}

impl DeleteTarget {
    pub fn new(identity: Identity, api_resource: ApiResource) -> Self {
        Self {
            identity,
            api_resource,
        }
    }
}

/// Metadata of the live objects of one kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedList {
    pub kind: Option<ResourceKind>,
    pub items: Vec<ObjectMeta>,
}

impl ManagedList {
    pub fn empty(kind: ResourceKind) -> Self {
        Self {
            kind: Some(kind),
            items: Vec::new(),
        }
    }

    pub fn identities(&self) -> Vec<Identity> {
        match self.kind {
            Some(kind) => self
                .items
                .iter()
                .map(|meta| Identity::from_meta(kind, meta))
                .collect(),
            None => Vec::new(),
        }
    }
}
