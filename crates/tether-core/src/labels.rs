//! Labels stamped on every managed object
//!
//! Two labels form the wire-level contract with the live cluster:
//! - the **marker** label, present on anything written through the store
//!   regardless of which owner wrote it
//! - the **part-of** label, naming the owner whose reconcile pass wrote it
//!
//! A store flagged as the primary controller also stamps
//! [`PRIMARY_CONTROLLER_LABEL`], which separates its objects from those of
//! a second controller sharing the marker label.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Marks an object as managed by the store (presence test only)
pub const MANAGED_BY_STORE_LABEL: &str = "tether.io/managed-by-store";
pub const MANAGED_BY_STORE_VALUE: &str = "true";

/// Standard label naming the owner instance an object belongs to
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// Standard label naming the tool managing the object
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Marks an object written by the primary controller's store
pub const PRIMARY_CONTROLLER_LABEL: &str = "tether.io/managed-by-primary-controller";

/// Records which labels and annotations the store wrote on an object
pub const MANAGED_KEYS_ANNOTATION: &str = "tether.io/managed-keys";

/// Label selector matching every marker-labeled object
pub fn marker_selector() -> &'static str {
    MANAGED_BY_STORE_LABEL
}

/// Label selector matching marker-labeled objects of the primary controller
pub fn primary_controller_selector() -> &'static str {
    "tether.io/managed-by-store,tether.io/managed-by-primary-controller"
}

/// Encoded owner identity used as the part-of label value
///
/// Dashes inside the namespace or name are doubled and the two halves are
/// joined with a single dash, so `ns-a/agent` encodes as `ns--a-agent` and
/// parses back unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartOfLabelValue {
    pub namespace: String,
    pub name: String,
}

impl PartOfLabelValue {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Decode a label value written by `to_string`
    pub fn parse(value: &str) -> Option<Self> {
        let mut namespace = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '-' {
                namespace.push(c);
                continue;
            }
            if chars.peek() == Some(&'-') {
                chars.next();
                namespace.push('-');
                continue;
            }
            let rest: String = chars.collect();
            let name = unescape(&rest)?;
            return Some(Self { namespace, name });
        }

        None
    }

    /// Check whether a raw label value designates this owner
    pub fn matches(&self, value: &str) -> bool {
        Self::parse(value).as_ref() == Some(self)
    }
}

fn unescape(part: &str) -> Option<String> {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' {
            // a lone dash would be a second separator
            if chars.next() != Some('-') {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

impl fmt::Display for PartOfLabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.namespace.replace('-', "--"),
            self.name.replace('-', "--")
        )
    }
}

/// Labels injected on objects written for an owner
///
/// Extra labels are applied first so the ownership labels always win.
pub fn default_labels(
    part_of: &PartOfLabelValue,
    operator_name: &str,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = extra.clone();
    labels.insert(PART_OF_LABEL.to_string(), part_of.to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), operator_name.to_string());
    labels
}

/// Label and annotation keys the store wrote on an object
///
/// Serialized as `labels=a,b;annotations=c`. Keys are valid label or
/// annotation keys, which never contain `=`, `,` or `;`. The
/// [`MANAGED_KEYS_ANNOTATION`] itself is never listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedKeys {
    pub labels: BTreeSet<String>,
    pub annotations: BTreeSet<String>,
}

impl ManagedKeys {
    pub fn new(
        labels: Option<&BTreeMap<String, String>>,
        annotations: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let keys = |map: Option<&BTreeMap<String, String>>| -> BTreeSet<String> {
            map.into_iter()
                .flat_map(BTreeMap::keys)
                .filter(|key| key.as_str() != MANAGED_KEYS_ANNOTATION)
                .cloned()
                .collect()
        };
        Self {
            labels: keys(labels),
            annotations: keys(annotations),
        }
    }

    /// Decode an annotation value; unknown sections are ignored
    pub fn parse(value: &str) -> Self {
        let mut keys = Self::default();
        for section in value.split(';') {
            let Some((name, list)) = section.split_once('=') else {
                continue;
            };
            let target = match name.trim() {
                "labels" => &mut keys.labels,
                "annotations" => &mut keys.annotations,
                _ => continue,
            };
            target.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string),
            );
        }
        keys
    }

    /// Whether every recorded key is present in the given maps
    pub fn retained_by(
        &self,
        labels: Option<&BTreeMap<String, String>>,
        annotations: Option<&BTreeMap<String, String>>,
    ) -> bool {
        let present = |keys: &BTreeSet<String>, map: Option<&BTreeMap<String, String>>| {
            keys.iter().all(|key| map.is_some_and(|m| m.contains_key(key)))
        };
        present(&self.labels, labels) && present(&self.annotations, annotations)
    }
}

impl fmt::Display for ManagedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |keys: &BTreeSet<String>| keys.iter().cloned().collect::<Vec<_>>().join(",");
        write!(
            f,
            "labels={};annotations={}",
            join(&self.labels),
            join(&self.annotations)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_controller_selector_extends_marker() {
        let terms: Vec<&str> = primary_controller_selector().split(',').collect();
        assert_eq!(terms, vec![MANAGED_BY_STORE_LABEL, PRIMARY_CONTROLLER_LABEL]);
    }

    #[test]
    fn test_managed_keys_round_trip() {
        let labels = BTreeMap::from([
            ("app.kubernetes.io/part-of".to_string(), "ns-agent".to_string()),
            ("team".to_string(), "infra".to_string()),
        ]);
        let annotations = BTreeMap::from([
            ("feature/x".to_string(), "on".to_string()),
            (MANAGED_KEYS_ANNOTATION.to_string(), "stale".to_string()),
        ]);

        let keys = ManagedKeys::new(Some(&labels), Some(&annotations));
        assert_eq!(
            keys.to_string(),
            "labels=app.kubernetes.io/part-of,team;annotations=feature/x"
        );
        assert_eq!(ManagedKeys::parse(&keys.to_string()), keys);
        assert_eq!(ManagedKeys::parse("labels=;annotations="), ManagedKeys::default());
    }

    #[test]
    fn test_managed_keys_retained_by() {
        let keys = ManagedKeys::parse("labels=team;annotations=feature/x");
        let labels = BTreeMap::from([("team".to_string(), "infra".to_string())]);
        let annotations = BTreeMap::from([("feature/x".to_string(), "off".to_string())]);

        assert!(keys.retained_by(Some(&labels), Some(&annotations)));
        assert!(!keys.retained_by(Some(&labels), None));
        assert!(ManagedKeys::default().retained_by(None, None));
    }

    #[test]
    fn test_part_of_encoding() {
        let value = PartOfLabelValue::new("ns-a", "my-agent");
        assert_eq!(value.to_string(), "ns--a-my--agent");

        let plain = PartOfLabelValue::new("default", "agent");
        assert_eq!(plain.to_string(), "default-agent");
    }

    #[test]
    fn test_part_of_parse_round_trip() {
        for (ns, name) in [
            ("default", "agent"),
            ("ns-a", "my-agent"),
            ("kube-system", "x"),
            ("a", "b--c"),
        ] {
            let value = PartOfLabelValue::new(ns, name);
            let parsed = PartOfLabelValue::parse(&value.to_string()).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn test_part_of_parse_rejects_garbage() {
        assert!(PartOfLabelValue::parse("noseparator").is_none());
        assert!(PartOfLabelValue::parse("a-b-c").is_none());
    }

    #[test]
    fn test_part_of_matches_distinguishes_owners() {
        let a = PartOfLabelValue::new("ns", "owner-a");
        let b = PartOfLabelValue::new("ns", "owner-b");
        assert!(a.matches(&a.to_string()));
        assert!(!a.matches(&b.to_string()));
        // "ns-a" / "x" and "ns" / "a-x" must not collide
        let c = PartOfLabelValue::new("ns-a", "x");
        let d = PartOfLabelValue::new("ns", "a-x");
        assert_ne!(c.to_string(), d.to_string());
    }

    #[test]
    fn test_default_labels_override_extras() {
        let mut extra = BTreeMap::new();
        extra.insert(PART_OF_LABEL.to_string(), "spoofed".to_string());
        extra.insert("team".to_string(), "infra".to_string());

        let labels = default_labels(&PartOfLabelValue::new("ns", "owner"), "tether", &extra);
        assert_eq!(labels[PART_OF_LABEL], "ns-owner");
        assert_eq!(labels[MANAGED_BY_LABEL], "tether");
        assert_eq!(labels["team"], "infra");
    }
}
