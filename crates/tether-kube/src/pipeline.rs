//! Built-in preprocessors and equality functions
//!
//! Equality only looks at what the operator writes: the payload listed per
//! kind below, plus the metadata the store injects (owner references and
//! the desired labels and annotations). Fields added by the API server or
//! by other controllers never cause an update, while a label or annotation
//! the store wrote in an earlier pass and no longer wants does.
//!
//! | Kind | Compared payload |
//! |---|---|
//! | ConfigMap | `data`, `binaryData` |
//! | Secret | `data` |
//! | Service, NetworkPolicy, PodDisruptionBudget | `spec` |
//! | Role, ClusterRole | normalized `rules` (and `aggregationRule`) |
//! | RoleBinding, ClusterRoleBinding | `roleRef`, `subjects` |
//! | Webhook configurations | `webhooks` |
//! | ServiceAccount | metadata only |
//! | APIService | `spec` document |
//! | CiliumNetworkPolicy | `spec` and `specs` documents |

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceSpec};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use tether_core::{MANAGED_KEYS_ANNOTATION, ManagedKeys, ResourceKind};
use tether_core::merge::rbac::normalize_policy_rules;

use crate::error::Result;
use crate::object::ManagedObject;
use crate::registry::KindStrategy;

/// Strategies registered by `KindRegistry::with_defaults`
pub fn default_strategies() -> Vec<KindStrategy> {
    vec![
        KindStrategy::new(ResourceKind::ConfigMap).with_equals(config_map_equal),
        KindStrategy::new(ResourceKind::Secret)
            .with_preprocess(preprocess_secret)
            .with_equals(secret_equal),
        KindStrategy::new(ResourceKind::Service)
            .with_preprocess(preprocess_service)
            .with_equals(service_equal),
        KindStrategy::new(ResourceKind::ServiceAccount).with_equals(|_, _| true),
        KindStrategy::new(ResourceKind::Role)
            .with_preprocess(preprocess_role)
            .with_equals(role_equal),
        KindStrategy::new(ResourceKind::ClusterRole)
            .with_preprocess(preprocess_cluster_role)
            .with_equals(cluster_role_equal),
        KindStrategy::new(ResourceKind::RoleBinding).with_equals(role_binding_equal),
        KindStrategy::new(ResourceKind::ClusterRoleBinding)
            .with_equals(cluster_role_binding_equal),
        KindStrategy::new(ResourceKind::NetworkPolicy).with_equals(network_policy_equal),
        KindStrategy::new(ResourceKind::CiliumNetworkPolicy).with_equals(cilium_policy_equal),
        KindStrategy::new(ResourceKind::PodDisruptionBudget).with_equals(pdb_equal),
        KindStrategy::new(ResourceKind::ValidatingWebhookConfiguration)
            .with_equals(validating_webhook_equal),
        KindStrategy::new(ResourceKind::MutatingWebhookConfiguration)
            .with_equals(mutating_webhook_equal),
        KindStrategy::new(ResourceKind::ApiService).with_equals(api_service_equal),
    ]
}

/// Shared metadata equality
///
/// Desired labels and annotations must be present with the same value on
/// the live object. Extra live entries are ignored unless the live object
/// records them in [`MANAGED_KEYS_ANNOTATION`] as written by the store.
pub fn meta_equal(desired: &ObjectMeta, live: &ObjectMeta) -> bool {
    desired.name == live.name
        && desired.namespace.as_deref().unwrap_or_default()
            == live.namespace.as_deref().unwrap_or_default()
        && desired.owner_references.as_deref().unwrap_or_default()
            == live.owner_references.as_deref().unwrap_or_default()
        && is_subset(desired.labels.as_ref(), live.labels.as_ref())
        && is_subset(desired.annotations.as_ref(), live.annotations.as_ref())
        && owned_keys_retained(desired, live)
}

fn owned_keys_retained(desired: &ObjectMeta, live: &ObjectMeta) -> bool {
    live.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(MANAGED_KEYS_ANNOTATION))
        .is_none_or(|recorded| {
            ManagedKeys::parse(recorded)
                .retained_by(desired.labels.as_ref(), desired.annotations.as_ref())
        })
}

fn is_subset(
    desired: Option<&BTreeMap<String, String>>,
    live: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    desired
        .iter()
        .all(|(key, value)| live.and_then(|l| l.get(key)) == Some(value))
}

/// `None` and an empty value compare equal
fn opt_eq<T: PartialEq + Default>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (Some(x), None) | (None, Some(x)) => *x == T::default(),
        (None, None) => true,
    }
}

fn typed_pair<'a, T>(desired: &'a ManagedObject, live: &'a ManagedObject) -> Option<(&'a T, &'a T)>
where
    &'a T: TryFrom<&'a ManagedObject>,
{
    Some((
        <&T>::try_from(desired).ok()?,
        <&T>::try_from(live).ok()?,
    ))
}

fn document_field_equal(desired: &ManagedObject, live: &ManagedObject, field: &str) -> bool {
    match (desired.as_document(), live.as_document()) {
        (Some(d), Some(l)) => d.data.get(field) == l.data.get(field),
        _ => false,
    }
}

// Preprocessors

fn carry_if_unset<T: Clone>(desired: &mut Option<T>, live: &Option<T>) {
    if desired.is_none() {
        desired.clone_from(live);
    }
}

fn preprocess_secret(desired: ManagedObject, _live: Option<&ManagedObject>) -> Result<ManagedObject> {
    let mut secret = Secret::try_from(desired)?;
    if let Some(string_data) = secret.string_data.take() {
        let data = secret.data.get_or_insert_with(BTreeMap::new);
        for (key, value) in string_data {
            data.insert(key, ByteString(value.into_bytes()));
        }
    }
    Ok(secret.into())
}

/// Carry server-assigned fields from the live service
///
/// The cluster IPs are immutable and the resource version is required by
/// the update call. Defaulted fields the desired spec leaves unset take the
/// live value so they never read as a change.
fn preprocess_service(desired: ManagedObject, live: Option<&ManagedObject>) -> Result<ManagedObject> {
    let mut service = Service::try_from(desired)?;
    let spec = service.spec.get_or_insert_with(ServiceSpec::default);

    for port in spec.ports.iter_mut().flatten() {
        if port.protocol.is_none() {
            port.protocol = Some("TCP".to_string());
        }
        if port.target_port.is_none() {
            port.target_port = Some(IntOrString::Int(port.port));
        }
    }

    let Some(live) = live else {
        return Ok(service.into());
    };
    let live: &Service = live.try_into()?;

    service.metadata.resource_version = live.metadata.resource_version.clone();

    if let Some(live_spec) = &live.spec {
        let spec = service.spec.get_or_insert_with(ServiceSpec::default);
        spec.cluster_ip = live_spec.cluster_ip.clone();
        spec.cluster_ips = live_spec.cluster_ips.clone();

        carry_if_unset(&mut spec.type_, &live_spec.type_);
        carry_if_unset(&mut spec.ip_families, &live_spec.ip_families);
        carry_if_unset(&mut spec.ip_family_policy, &live_spec.ip_family_policy);
        carry_if_unset(&mut spec.session_affinity, &live_spec.session_affinity);
        carry_if_unset(
            &mut spec.internal_traffic_policy,
            &live_spec.internal_traffic_policy,
        );
    }

    Ok(service.into())
}

fn preprocess_role(desired: ManagedObject, _live: Option<&ManagedObject>) -> Result<ManagedObject> {
    let mut role = Role::try_from(desired)?;
    if let Some(rules) = &role.rules {
        role.rules = Some(normalize_policy_rules(rules));
    }
    Ok(role.into())
}

fn preprocess_cluster_role(
    desired: ManagedObject,
    _live: Option<&ManagedObject>,
) -> Result<ManagedObject> {
    let mut role = ClusterRole::try_from(desired)?;
    if let Some(rules) = &role.rules {
        role.rules = Some(normalize_policy_rules(rules));
    }
    Ok(role.into())
}

// Equality

fn config_map_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<ConfigMap>(desired, live).is_some_and(|(d, l)| {
        opt_eq(&d.data, &l.data) && opt_eq(&d.binary_data, &l.binary_data)
    })
}

fn secret_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<Secret>(desired, live).is_some_and(|(d, l)| opt_eq(&d.data, &l.data))
}

fn service_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<Service>(desired, live).is_some_and(|(d, l)| opt_eq(&d.spec, &l.spec))
}

fn rules_equal(
    desired: &Option<Vec<k8s_openapi::api::rbac::v1::PolicyRule>>,
    live: &Option<Vec<k8s_openapi::api::rbac::v1::PolicyRule>>,
) -> bool {
    normalize_policy_rules(desired.as_deref().unwrap_or_default())
        == normalize_policy_rules(live.as_deref().unwrap_or_default())
}

fn role_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<Role>(desired, live).is_some_and(|(d, l)| rules_equal(&d.rules, &l.rules))
}

fn cluster_role_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<ClusterRole>(desired, live).is_some_and(|(d, l)| {
        rules_equal(&d.rules, &l.rules) && d.aggregation_rule == l.aggregation_rule
    })
}

fn role_binding_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<RoleBinding>(desired, live)
        .is_some_and(|(d, l)| d.role_ref == l.role_ref && opt_eq(&d.subjects, &l.subjects))
}

fn cluster_role_binding_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<ClusterRoleBinding>(desired, live)
        .is_some_and(|(d, l)| d.role_ref == l.role_ref && opt_eq(&d.subjects, &l.subjects))
}

fn network_policy_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<NetworkPolicy>(desired, live).is_some_and(|(d, l)| opt_eq(&d.spec, &l.spec))
}

fn pdb_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    if desired.as_document().is_some() {
        return document_field_equal(desired, live, "spec");
    }
    typed_pair::<PodDisruptionBudget>(desired, live).is_some_and(|(d, l)| opt_eq(&d.spec, &l.spec))
}

fn validating_webhook_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<ValidatingWebhookConfiguration>(desired, live)
        .is_some_and(|(d, l)| opt_eq(&d.webhooks, &l.webhooks))
}

fn mutating_webhook_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    typed_pair::<MutatingWebhookConfiguration>(desired, live)
        .is_some_and(|(d, l)| opt_eq(&d.webhooks, &l.webhooks))
}

fn api_service_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    document_field_equal(desired, live, "spec")
}

fn cilium_policy_equal(desired: &ManagedObject, live: &ManagedObject) -> bool {
    document_field_equal(desired, live, "spec") && document_field_equal(desired, live, "specs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KindRegistry;
    use k8s_openapi::api::core::v1::ServicePort;
    use k8s_openapi::api::rbac::v1::PolicyRule;
    use kube::api::DynamicObject;
    use serde_json::json;
    use tether_core::PlatformInfo;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        }
    }

    fn rule(resource: &str, verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec![resource.to_string()]),
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_meta_equal_label_subset() {
        let mut desired = meta("a");
        desired.labels = Some(BTreeMap::from([("x".to_string(), "1".to_string())]));

        let mut live = desired.clone();
        live.labels
            .as_mut()
            .unwrap()
            .insert("added-by-someone".to_string(), "y".to_string());
        live.resource_version = Some("42".to_string());
        assert!(meta_equal(&desired, &live));

        live.labels
            .as_mut()
            .unwrap()
            .insert("x".to_string(), "2".to_string());
        assert!(!meta_equal(&desired, &live));
    }

    #[test]
    fn test_meta_equal_detects_dropped_owned_keys() {
        let mut live = meta("a");
        live.labels = Some(BTreeMap::from([
            ("tier".to_string(), "node".to_string()),
            ("added-by-someone".to_string(), "y".to_string()),
        ]));
        live.annotations = Some(BTreeMap::from([
            ("feature/x".to_string(), "on".to_string()),
            (
                MANAGED_KEYS_ANNOTATION.to_string(),
                "labels=tier;annotations=feature/x".to_string(),
            ),
        ]));

        let mut desired = meta("a");
        desired.labels = Some(BTreeMap::from([("tier".to_string(), "node".to_string())]));
        desired.annotations = Some(BTreeMap::from([("feature/x".to_string(), "on".to_string())]));
        assert!(meta_equal(&desired, &live));

        desired.annotations = None;
        assert!(!meta_equal(&desired, &live));

        desired.annotations = Some(BTreeMap::from([("feature/x".to_string(), "on".to_string())]));
        desired.labels = None;
        assert!(!meta_equal(&desired, &live));
    }

    #[test]
    fn test_meta_equal_owner_references() {
        let desired = meta("a");
        let mut live = meta("a");
        live.owner_references = Some(vec![]);
        assert!(meta_equal(&desired, &live));

        live.owner_references = Some(vec![Default::default()]);
        assert!(!meta_equal(&desired, &live));
    }

    #[test]
    fn test_role_preprocess_dedupes_rules() {
        let r1 = rule("pods", &["get"]);
        let r2 = rule("nodes", &["list"]);
        let role = Role {
            metadata: meta("r"),
            rules: Some(vec![r1.clone(), r2.clone(), r1.clone()]),
        };

        let processed = preprocess_role(role.into(), None).unwrap();
        let role: Role = processed.try_into().unwrap();
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.contains(&r1));
        assert!(rules.contains(&r2));
    }

    #[test]
    fn test_role_equality_ignores_order() {
        let registry = KindRegistry::with_defaults();
        let a: ManagedObject = Role {
            metadata: meta("r"),
            rules: Some(vec![rule("pods", &["get"]), rule("nodes", &["list"])]),
        }
        .into();
        let b: ManagedObject = Role {
            metadata: meta("r"),
            rules: Some(vec![rule("nodes", &["list"]), rule("pods", &["get"])]),
        }
        .into();
        assert!(registry.equals(ResourceKind::Role, &a, &b));
    }

    #[test]
    fn test_secret_string_data_folded() {
        let secret = Secret {
            metadata: meta("s"),
            string_data: Some(BTreeMap::from([("token".to_string(), "abc".to_string())])),
            ..Default::default()
        };
        let processed: Secret = preprocess_secret(secret.into(), None)
            .unwrap()
            .try_into()
            .unwrap();
        assert!(processed.string_data.is_none());
        assert_eq!(processed.data.unwrap()["token"], ByteString(b"abc".to_vec()));
    }

    #[test]
    fn test_service_carries_live_fields() {
        let desired = Service {
            metadata: meta("svc"),
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), "agent".to_string())])),
                ports: Some(vec![ServicePort {
                    port: 8125,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut live = desired.clone();
        live.metadata.resource_version = Some("7".to_string());
        let live_spec = live.spec.as_mut().unwrap();
        live_spec.cluster_ip = Some("10.0.0.12".to_string());
        live_spec.cluster_ips = Some(vec!["10.0.0.12".to_string()]);
        live_spec.type_ = Some("ClusterIP".to_string());
        live_spec.session_affinity = Some("None".to_string());
        live_spec.ports = Some(vec![ServicePort {
            port: 8125,
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::Int(8125)),
            ..Default::default()
        }]);
        let live: ManagedObject = live.into();

        let processed = preprocess_service(desired.into(), Some(&live)).unwrap();
        let service: &Service = (&processed).try_into().unwrap();
        assert_eq!(service.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(
            service.spec.as_ref().unwrap().cluster_ip.as_deref(),
            Some("10.0.0.12")
        );
        assert!(service_equal(&processed, &live));
    }

    #[test]
    fn test_config_map_none_equals_empty() {
        let a: ManagedObject = ConfigMap {
            metadata: meta("cm"),
            data: None,
            ..Default::default()
        }
        .into();
        let b: ManagedObject = ConfigMap {
            metadata: meta("cm"),
            data: Some(BTreeMap::new()),
            ..Default::default()
        }
        .into();
        assert!(config_map_equal(&a, &b));
    }

    #[test]
    fn test_document_equality_restricted_to_specs() {
        let resource = KindRegistry::new()
            .api_resource(ResourceKind::CiliumNetworkPolicy, &PlatformInfo::default());
        let doc = |specs: serde_json::Value, extra: serde_json::Value| -> ManagedObject {
            DynamicObject::new("p", &resource)
                .within("ns")
                .data(json!({"specs": specs, "status": extra}))
                .into()
        };

        let a = doc(json!([{"description": "egress"}]), json!({"ok": true}));
        let b = doc(json!([{"description": "egress"}]), json!({"ok": false}));
        let c = doc(json!([{"description": "other"}]), json!({"ok": true}));
        assert!(cilium_policy_equal(&a, &b));
        assert!(!cilium_policy_equal(&a, &c));
    }

    #[test]
    fn test_type_mismatch_is_not_equal() {
        let cm: ManagedObject = ConfigMap::default().into();
        let secret: ManagedObject = Secret::default().into();
        assert!(!config_map_equal(&cm, &secret));
        assert!(preprocess_role(cm, None).is_err());
    }
}
