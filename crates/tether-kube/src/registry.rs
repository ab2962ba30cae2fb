//! Per-kind strategy table
//!
//! The registry is an explicit value built once (usually with
//! [`KindRegistry::with_defaults`]) and shared with every [`Store`] through
//! an `Arc`. It answers, for each [`ResourceKind`]:
//! - which empty object and empty list represent it on this cluster
//! - which API coordinates address it
//! - how a live document decodes into a [`ManagedObject`]
//! - which preprocessor and equality function apply
//!
//! [`Store`]: crate::store::Store

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{DynamicObject, TypeMeta};
use kube::discovery::ApiResource;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;

use tether_core::{PlatformInfo, ResourceKind};

use crate::error::{KubeError, Result};
use crate::object::{ManagedList, ManagedObject};
use crate::pipeline;

/// Adjust a desired object given the live one (if any)
pub type PreprocessFn = fn(ManagedObject, Option<&ManagedObject>) -> Result<ManagedObject>;

/// Compare the operator-owned payload of a desired and a live object
pub type EqualityFn = fn(&ManagedObject, &ManagedObject) -> bool;

/// Hooks registered for one kind
#[derive(Debug, Clone, Copy)]
pub struct KindStrategy {
    pub kind: ResourceKind,
    pub preprocess: Option<PreprocessFn>,
    pub equals: Option<EqualityFn>,
}

impl KindStrategy {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            preprocess: None,
            equals: None,
        }
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessFn) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    pub fn with_equals(mut self, equals: EqualityFn) -> Self {
        self.equals = Some(equals);
        self
    }
}

/// Strategy table keyed by [`ResourceKind`]
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    strategies: HashMap<ResourceKind, KindStrategy>,
}

fn dynamic_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    let api_version = if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    };
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version,
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

fn empty_document(resource: &ApiResource) -> DynamicObject {
    DynamicObject::new("", resource).data(json!({}))
}

fn decode_typed<K: DeserializeOwned>(object: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

impl KindRegistry {
    /// Registry without any strategy: nothing is preprocessed, nothing is equal
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategy of every managed kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for strategy in pipeline::default_strategies() {
            registry.register(strategy);
        }
        registry
    }

    /// Register (or replace) the strategy of a kind
    pub fn register(&mut self, strategy: KindStrategy) {
        self.strategies.insert(strategy.kind, strategy);
    }

    pub fn strategy(&self, kind: ResourceKind) -> Option<&KindStrategy> {
        self.strategies.get(&kind)
    }

    /// API coordinates of a kind on this cluster
    pub fn api_resource(&self, kind: ResourceKind, platform: &PlatformInfo) -> ApiResource {
        match kind {
            ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::Service => ApiResource::erase::<Service>(&()),
            ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
            ResourceKind::Role => ApiResource::erase::<Role>(&()),
            ResourceKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
            ResourceKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
            ResourceKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
            ResourceKind::NetworkPolicy => ApiResource::erase::<NetworkPolicy>(&()),
            ResourceKind::PodDisruptionBudget if platform.use_v1beta1_pdb() => dynamic_resource(
                "policy",
                "v1beta1",
                "PodDisruptionBudget",
                "poddisruptionbudgets",
            ),
            ResourceKind::PodDisruptionBudget => ApiResource::erase::<PodDisruptionBudget>(&()),
            ResourceKind::ValidatingWebhookConfiguration => {
                ApiResource::erase::<ValidatingWebhookConfiguration>(&())
            }
            ResourceKind::MutatingWebhookConfiguration => {
                ApiResource::erase::<MutatingWebhookConfiguration>(&())
            }
            ResourceKind::CiliumNetworkPolicy => dynamic_resource(
                "cilium.io",
                "v2",
                "CiliumNetworkPolicy",
                "ciliumnetworkpolicies",
            ),
            ResourceKind::ApiService => {
                dynamic_resource("apiregistration.k8s.io", "v1", "APIService", "apiservices")
            }
        }
    }

    /// Whether a kind is carried as a generic document on this cluster
    pub fn is_document(&self, kind: ResourceKind, platform: &PlatformInfo) -> bool {
        match kind {
            ResourceKind::CiliumNetworkPolicy | ResourceKind::ApiService => true,
            ResourceKind::PodDisruptionBudget => platform.use_v1beta1_pdb(),
            _ => false,
        }
    }

    /// Fresh zero-value object of a kind
    pub fn empty_object(&self, kind: ResourceKind, platform: &PlatformInfo) -> ManagedObject {
        if self.is_document(kind, platform) {
            return empty_document(&self.api_resource(kind, platform)).into();
        }
        match kind {
            ResourceKind::ConfigMap => ConfigMap::default().into(),
            ResourceKind::Secret => Secret::default().into(),
            ResourceKind::Service => Service::default().into(),
            ResourceKind::ServiceAccount => ServiceAccount::default().into(),
            ResourceKind::Role => Role::default().into(),
            ResourceKind::ClusterRole => ClusterRole::default().into(),
            ResourceKind::RoleBinding => RoleBinding::default().into(),
            ResourceKind::ClusterRoleBinding => ClusterRoleBinding::default().into(),
            ResourceKind::NetworkPolicy => NetworkPolicy::default().into(),
            ResourceKind::PodDisruptionBudget => PodDisruptionBudget::default().into(),
            ResourceKind::ValidatingWebhookConfiguration => {
                ValidatingWebhookConfiguration::default().into()
            }
            ResourceKind::MutatingWebhookConfiguration => {
                MutatingWebhookConfiguration::default().into()
            }
            ResourceKind::CiliumNetworkPolicy | ResourceKind::ApiService => {
                empty_document(&self.api_resource(kind, platform)).into()
            }
        }
    }

    /// Fresh empty list of a kind
    pub fn empty_list(&self, kind: ResourceKind, _platform: &PlatformInfo) -> ManagedList {
        ManagedList::empty(kind)
    }

    /// Decode a live or parsed document into the representation of its kind
    pub fn decode(
        &self,
        kind: ResourceKind,
        mut object: DynamicObject,
        platform: &PlatformInfo,
    ) -> Result<ManagedObject> {
        let resource = self.api_resource(kind, platform);
        let declared = object.types.as_ref().map(|t| t.kind.clone());
        if let Some(found) = declared {
            if !found.eq_ignore_ascii_case(&resource.kind) {
                return Err(KubeError::TypeMismatch {
                    kind,
                    expected: resource.kind,
                    found,
                });
            }
        }
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        if object.data.is_null() {
            object.data = json!({});
        }

        if self.is_document(kind, platform) {
            return Ok(object.into());
        }
        let decoded = match kind {
            ResourceKind::ConfigMap => decode_typed::<ConfigMap>(object)?.into(),
            ResourceKind::Secret => decode_typed::<Secret>(object)?.into(),
            ResourceKind::Service => decode_typed::<Service>(object)?.into(),
            ResourceKind::ServiceAccount => decode_typed::<ServiceAccount>(object)?.into(),
            ResourceKind::Role => decode_typed::<Role>(object)?.into(),
            ResourceKind::ClusterRole => decode_typed::<ClusterRole>(object)?.into(),
            ResourceKind::RoleBinding => decode_typed::<RoleBinding>(object)?.into(),
            ResourceKind::ClusterRoleBinding => decode_typed::<ClusterRoleBinding>(object)?.into(),
            ResourceKind::NetworkPolicy => decode_typed::<NetworkPolicy>(object)?.into(),
            ResourceKind::PodDisruptionBudget => {
                decode_typed::<PodDisruptionBudget>(object)?.into()
            }
            ResourceKind::ValidatingWebhookConfiguration => {
                decode_typed::<ValidatingWebhookConfiguration>(object)?.into()
            }
            ResourceKind::MutatingWebhookConfiguration => {
                decode_typed::<MutatingWebhookConfiguration>(object)?.into()
            }
            ResourceKind::CiliumNetworkPolicy | ResourceKind::ApiService => object.into(),
        };
        Ok(decoded)
    }

    /// Run the registered preprocessor, passing through when none is registered
    pub fn preprocess(
        &self,
        kind: ResourceKind,
        desired: ManagedObject,
        live: Option<&ManagedObject>,
    ) -> Result<ManagedObject> {
        match self.strategy(kind).and_then(|s| s.preprocess) {
            Some(preprocess) => preprocess(desired, live),
            None => Ok(desired),
        }
    }

    /// Semantic equality restricted to operator-owned fields
    ///
    /// Kinds without a registered equality are never equal, so they are
    /// always updated.
    pub fn equals(&self, kind: ResourceKind, desired: &ManagedObject, live: &ManagedObject) -> bool {
        match self.strategy(kind).and_then(|s| s.equals) {
            Some(equals) => {
                pipeline::meta_equal(desired.meta(), live.meta()) && equals(desired, live)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn v1beta1_platform() -> PlatformInfo {
        let mut preferred = BTreeMap::new();
        preferred.insert(
            "PodDisruptionBudget".to_string(),
            "policy/v1beta1".to_string(),
        );
        PlatformInfo::from_version_maps(preferred, BTreeMap::new())
    }

    #[test]
    fn test_empty_object_variants() {
        let registry = KindRegistry::with_defaults();
        let platform = PlatformInfo::default();

        assert!(matches!(
            registry.empty_object(ResourceKind::ConfigMap, &platform),
            ManagedObject::ConfigMap(_)
        ));
        assert!(matches!(
            registry.empty_object(ResourceKind::PodDisruptionBudget, &platform),
            ManagedObject::PodDisruptionBudget(_)
        ));

        let api_service = registry.empty_object(ResourceKind::ApiService, &platform);
        let doc = api_service.as_document().unwrap();
        assert_eq!(doc.types.as_ref().unwrap().kind, "APIService");
        assert!(doc.data.is_object());
    }

    #[test]
    fn test_pdb_follows_platform() {
        let registry = KindRegistry::with_defaults();
        let platform = v1beta1_platform();

        let pdb = registry.empty_object(ResourceKind::PodDisruptionBudget, &platform);
        let doc = pdb.as_document().unwrap();
        assert_eq!(doc.types.as_ref().unwrap().api_version, "policy/v1beta1");

        let resource = registry.api_resource(ResourceKind::PodDisruptionBudget, &platform);
        assert_eq!(resource.version, "v1beta1");
        assert_eq!(resource.plural, "poddisruptionbudgets");
    }

    #[test]
    fn test_empty_list() {
        let registry = KindRegistry::new();
        let list = registry.empty_list(ResourceKind::Role, &PlatformInfo::default());
        assert_eq!(list.kind, Some(ResourceKind::Role));
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_decode_typed_and_mismatch() {
        let registry = KindRegistry::with_defaults();
        let platform = PlatformInfo::default();
        let resource = registry.api_resource(ResourceKind::ConfigMap, &platform);
        let object = DynamicObject::new("cm", &resource)
            .within("ns")
            .data(json!({"data": {"k": "v"}}));

        let decoded = registry
            .decode(ResourceKind::ConfigMap, object.clone(), &platform)
            .unwrap();
        let cm: ConfigMap = decoded.try_into().unwrap();
        assert_eq!(cm.data.unwrap()["k"], "v");

        let err = registry
            .decode(ResourceKind::Secret, object, &platform)
            .unwrap_err();
        assert!(matches!(err, KubeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unregistered_kind_passes_through_and_never_equal() {
        let registry = KindRegistry::new();
        let object: ManagedObject = ConfigMap::default().into();

        let processed = registry
            .preprocess(ResourceKind::ConfigMap, object.clone(), Some(&object))
            .unwrap();
        assert_eq!(processed, object);
        assert!(!registry.equals(ResourceKind::ConfigMap, &object, &object));
    }

    #[test]
    fn test_register_replaces_strategy() {
        fn always(_: &ManagedObject, _: &ManagedObject) -> bool {
            true
        }

        let mut registry = KindRegistry::new();
        registry.register(KindStrategy::new(ResourceKind::ServiceAccount).with_equals(always));
        let object: ManagedObject = ServiceAccount::default().into();
        assert!(registry.equals(ResourceKind::ServiceAccount, &object, &object));
    }
}
