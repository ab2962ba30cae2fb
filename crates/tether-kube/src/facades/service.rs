use k8s_openapi::api::core::v1::{Service, ServicePort};
use std::collections::BTreeMap;

use tether_core::merge::{MergeFunction, merge_keyed_opt, merge_map_entry, override_current};
use tether_core::ResourceKind;

use super::load;
use crate::error::Result;
use crate::store::Store;

/// Ports are keyed by name; unnamed ports by number and protocol
fn port_key(port: &ServicePort) -> (String, i32, String) {
    match port.name.as_deref() {
        Some(name) if !name.is_empty() => (name.to_string(), 0, String::new()),
        _ => (
            String::new(),
            port.port,
            port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
        ),
    }
}

/// Selectors and ports of services
pub struct ServiceManager<'a> {
    store: &'a Store,
}

impl<'a> ServiceManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Add selector entries and ports, new fragments winning
    pub fn add_service(
        &self,
        namespace: &str,
        name: &str,
        selector: &BTreeMap<String, String>,
        ports: &[ServicePort],
        internal_traffic_policy: Option<&str>,
    ) -> Result<()> {
        self.add_service_with_merge(
            namespace,
            name,
            selector,
            ports,
            internal_traffic_policy,
            override_current,
        )
    }

    /// Same as [`add_service`](Self::add_service) with an explicit port merge policy
    ///
    /// Nothing is written when a port merge fails.
    pub fn add_service_with_merge(
        &self,
        namespace: &str,
        name: &str,
        selector: &BTreeMap<String, String>,
        ports: &[ServicePort],
        internal_traffic_policy: Option<&str>,
        merge: MergeFunction<ServicePort>,
    ) -> Result<()> {
        let mut service: Service = load(self.store, ResourceKind::Service, namespace, name)?;
        let spec = service.spec.get_or_insert_with(Default::default);

        let entries = spec.selector.get_or_insert_with(BTreeMap::new);
        for (key, value) in selector {
            merge_map_entry(entries, key.as_str(), value.clone(), override_current)?;
        }
        for port in ports {
            merge_keyed_opt(&mut spec.ports, port.clone(), port_key, merge)?;
        }
        if let Some(policy) = internal_traffic_policy {
            spec.internal_traffic_policy = Some(policy.to_string());
        }

        self.store.add_or_update(ResourceKind::Service, service)
    }
}
