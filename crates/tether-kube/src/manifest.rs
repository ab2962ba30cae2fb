//! Multi-document YAML manifests of desired objects
//!
//! Used to feed a store from files: each document must be one of the
//! managed kinds. Namespaced objects without a namespace get the default
//! one.

use kube::api::DynamicObject;

use tether_core::{PlatformInfo, ResourceKind};

use crate::error::{KubeError, Result};
use crate::object::ManagedObject;
use crate::registry::KindRegistry;

/// Split on `---` separator lines, dropping empty and comment-only documents
fn split_documents(manifest: &str) -> Vec<(usize, String)> {
    let mut documents = Vec::new();
    let mut current = String::new();
    let mut index = 0;

    let mut flush = |current: &mut String, index: &mut usize| {
        let is_blank = current
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'));
        if !is_blank {
            documents.push((*index, std::mem::take(current)));
        }
        current.clear();
        *index += 1;
    };

    for line in manifest.lines() {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            flush(&mut current, &mut index);
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    flush(&mut current, &mut index);

    documents
}

fn parse_document(
    doc: &str,
    default_namespace: &str,
    registry: &KindRegistry,
    platform: &PlatformInfo,
) -> Result<(ResourceKind, ManagedObject)> {
    let mut object: DynamicObject = serde_yaml::from_str(doc)
        .map_err(|e| KubeError::Serialization(format!("YAML parse error: {e}")))?;

    let type_meta = object.types.as_ref().ok_or_else(|| {
        KubeError::InvalidManifest("resource missing apiVersion or kind".to_string())
    })?;
    let kind: ResourceKind = type_meta.kind.parse()?;

    if object.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(KubeError::InvalidManifest(format!("{kind} has no name")));
    }
    if kind.is_cluster_scoped() {
        object.metadata.namespace = None;
    } else if object.metadata.namespace.is_none() && !default_namespace.is_empty() {
        object.metadata.namespace = Some(default_namespace.to_string());
    }

    Ok((kind, registry.decode(kind, object, platform)?))
}

/// Parse every document of a manifest into its kind and typed object
///
/// Errors carry the index of the failing document.
pub fn parse_manifest(
    manifest: &str,
    default_namespace: &str,
    registry: &KindRegistry,
    platform: &PlatformInfo,
) -> Result<Vec<(ResourceKind, ManagedObject)>> {
    split_documents(manifest)
        .into_iter()
        .map(|(index, doc)| {
            parse_document(&doc, default_namespace, registry, platform).map_err(|e| {
                KubeError::InvalidManifest(format!("failed to parse document {index}: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
# settings for the agent
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: fast
---
# only a comment
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
  namespace: ignored
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get"]
---
apiVersion: cilium.io/v2
kind: CiliumNetworkPolicy
metadata:
  name: allow-dns
  namespace: net
spec:
  endpointSelector: {}
"#;

    #[test]
    fn test_parse_manifest() {
        let registry = KindRegistry::with_defaults();
        let objects =
            parse_manifest(MANIFEST, "agents", &registry, &PlatformInfo::default()).unwrap();
        assert_eq!(objects.len(), 3);

        let (kind, cm) = &objects[0];
        assert_eq!(*kind, ResourceKind::ConfigMap);
        assert!(matches!(cm, ManagedObject::ConfigMap(_)));
        assert_eq!(cm.namespace(), "agents");

        let (kind, role) = &objects[1];
        assert_eq!(*kind, ResourceKind::ClusterRole);
        assert!(role.meta().namespace.is_none());

        let (kind, policy) = &objects[2];
        assert_eq!(*kind, ResourceKind::CiliumNetworkPolicy);
        assert_eq!(policy.namespace(), "net");
        assert!(policy.as_document().is_some());
    }

    #[test]
    fn test_unknown_kind_reports_document_index() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n";
        let err = parse_manifest(
            manifest,
            "ns",
            &KindRegistry::with_defaults(),
            &PlatformInfo::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("document 1"));
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = parse_manifest(
            "apiVersion: v1\nkind: Secret\nmetadata: {}\n",
            "ns",
            &KindRegistry::with_defaults(),
            &PlatformInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }
}
