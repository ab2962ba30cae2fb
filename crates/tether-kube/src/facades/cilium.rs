//! Policy-engine network policies
//!
//! There is no typed binding for this kind: the policy is a generic
//! document whose `specs` field holds a list of [`CiliumPolicySpec`].
//! Ingress and egress rules are kept as raw JSON.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tether_core::ResourceKind;
use tether_core::merge::{MergeFunction, merge_keyed, override_current};

use crate::error::{KubeError, Result};
use crate::store::Store;

const SPECS_FIELD: &str = "specs";

/// One policy of a policy-engine network policy, keyed by description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumPolicySpec {
    pub description: String,
    pub endpoint_selector: LabelSelector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<Value>,
}

impl CiliumPolicySpec {
    pub fn new(description: impl Into<String>, endpoint_selector: LabelSelector) -> Self {
        Self {
            description: description.into(),
            endpoint_selector,
            ..Default::default()
        }
    }

    pub fn with_ingress(mut self, rule: Value) -> Self {
        self.ingress.push(rule);
        self
    }

    pub fn with_egress(mut self, rule: Value) -> Self {
        self.egress.push(rule);
        self
    }
}

fn specs_of(document: &DynamicObject) -> Result<Vec<CiliumPolicySpec>> {
    match document.data.get(SPECS_FIELD) {
        Some(specs) => Ok(serde_json::from_value(specs.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Policy-engine network policies, stored as generic documents
pub struct CiliumPolicyManager<'a> {
    store: &'a Store,
}

impl<'a> CiliumPolicyManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Add policy specs, replacing those with the same description
    pub fn add_policy_specs(
        &self,
        namespace: &str,
        name: &str,
        specs: &[CiliumPolicySpec],
    ) -> Result<()> {
        self.add_policy_specs_with_merge(namespace, name, specs, override_current)
    }

    pub fn add_policy_specs_with_merge(
        &self,
        namespace: &str,
        name: &str,
        specs: &[CiliumPolicySpec],
        merge: MergeFunction<CiliumPolicySpec>,
    ) -> Result<()> {
        let kind = ResourceKind::CiliumNetworkPolicy;
        let (object, _found) = self.store.get_or_create(kind, namespace, name);
        let mut document = object.into_document(kind)?;

        let mut current = specs_of(&document)?;
        for spec in specs {
            merge_keyed(&mut current, spec.clone(), |s| s.description.clone(), merge)?;
        }

        if !document.data.is_object() {
            document.data = json!({});
        }
        let data = document.data.as_object_mut().ok_or_else(|| {
            KubeError::Serialization("policy document is not an object".to_string())
        })?;
        data.insert(SPECS_FIELD.to_string(), serde_json::to_value(current)?);

        self.store.add_or_update(kind, document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facades::test_store;
    use std::collections::BTreeMap;
    use tether_core::merge::ignore_new;

    fn selector() -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "agent".to_string())])),
            ..Default::default()
        }
    }

    fn stored_specs(store: &Store) -> Vec<CiliumPolicySpec> {
        let object = store
            .get(ResourceKind::CiliumNetworkPolicy, "ns", "agent")
            .unwrap();
        specs_of(object.as_document().unwrap()).unwrap()
    }

    #[test]
    fn test_specs_keyed_by_description() {
        let store = test_store();
        let policies = CiliumPolicyManager::new(&store);
        let dns = CiliumPolicySpec::new("Egress to DNS", selector())
            .with_egress(json!({"toPorts": [{"ports": [{"port": "53", "protocol": "ANY"}]}]}));
        let intake = CiliumPolicySpec::new("Egress to intake", selector())
            .with_egress(json!({"toFQDNs": [{"matchPattern": "*.example.com"}]}));

        policies
            .add_policy_specs("ns", "agent", &[dns.clone(), intake])
            .unwrap();
        let replacement = CiliumPolicySpec::new("Egress to DNS", selector());
        policies
            .add_policy_specs_with_merge("ns", "agent", &[replacement.clone()], ignore_new)
            .unwrap();
        assert_eq!(stored_specs(&store)[0], dns);

        policies
            .add_policy_specs("ns", "agent", &[replacement.clone()])
            .unwrap();
        let specs = stored_specs(&store);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], replacement);
    }

    #[test]
    fn test_document_carries_type_and_marker() {
        let store = test_store();
        CiliumPolicyManager::new(&store)
            .add_policy_specs("ns", "agent", &[CiliumPolicySpec::new("ingress", selector())])
            .unwrap();

        let object = store
            .get(ResourceKind::CiliumNetworkPolicy, "ns", "agent")
            .unwrap();
        let document = object.as_document().unwrap();
        assert_eq!(document.types.as_ref().unwrap().kind, "CiliumNetworkPolicy");
        assert!(document.data["specs"][0].get("ingress").is_none());
        assert_eq!(object.meta().owner_references.as_ref().unwrap().len(), 1);
    }
}
