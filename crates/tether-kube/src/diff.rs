//! Line diff between a desired and a live object

use serde_json::Value;
use similar::TextDiff;

use crate::error::Result;
use crate::object::ManagedObject;

/// Metadata fields written by the API server
const SERVER_METADATA: &[&str] = &[
    "managedFields",
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
];

/// Unified diff from `live` to `desired`
///
/// Server-populated metadata and status are stripped from both sides so the
/// diff shows what an update would change.
pub fn render_diff(desired: &ManagedObject, live: &ManagedObject) -> Result<String> {
    let desired = comparable_yaml(desired)?;
    let live = comparable_yaml(live)?;

    let diff = TextDiff::from_lines(&live, &desired);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header("live", "desired")
        .to_string())
}

fn comparable_yaml(object: &ManagedObject) -> Result<String> {
    let mut value = serde_json::to_value(object)?;
    if let Value::Object(map) = &mut value {
        map.remove("status");
        if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
            for field in SERVER_METADATA {
                metadata.remove(*field);
            }
        }
    }
    Ok(serde_yaml::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(value: &str, resource_version: Option<&str>) -> ManagedObject {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                namespace: Some("ns".to_string()),
                resource_version: resource_version.map(String::from),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("mode".to_string(), value.to_string())])),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_identical_objects_have_empty_diff() {
        let diff = render_diff(&config_map("fast", None), &config_map("fast", Some("7"))).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_changed_field_is_shown() {
        let diff = render_diff(&config_map("safe", None), &config_map("fast", Some("7"))).unwrap();
        assert!(diff.contains("--- live"));
        assert!(diff.contains("+++ desired"));
        assert!(diff.contains("-  mode: fast"));
        assert!(diff.contains("+  mode: safe"));
        assert!(!diff.contains("resourceVersion"));
    }
}
