use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use tether_core::ResourceKind;

use super::load;
use crate::error::Result;
use crate::store::Store;

fn append_missing<T: Clone + PartialEq>(items: &mut Option<Vec<T>>, new: &[T]) {
    let items = items.get_or_insert_with(Vec::new);
    for item in new {
        if !items.contains(item) {
            items.push(item.clone());
        }
    }
}

/// Native network policies
pub struct NetworkPolicyManager<'a> {
    store: &'a Store,
}

impl<'a> NetworkPolicyManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Set the pod selector and add policy types and rules not already present
    pub fn add_network_policy(
        &self,
        namespace: &str,
        name: &str,
        pod_selector: LabelSelector,
        policy_types: &[String],
        ingress: &[NetworkPolicyIngressRule],
        egress: &[NetworkPolicyEgressRule],
    ) -> Result<()> {
        let mut policy: NetworkPolicy =
            load(self.store, ResourceKind::NetworkPolicy, namespace, name)?;
        let spec = policy.spec.get_or_insert_with(Default::default);

        spec.pod_selector = pod_selector;
        append_missing(&mut spec.policy_types, policy_types);
        append_missing(&mut spec.ingress, ingress);
        append_missing(&mut spec.egress, egress);

        self.store.add_or_update(ResourceKind::NetworkPolicy, policy)
    }
}
