//! RBAC rule normalization and binding subjects

use k8s_openapi::api::rbac::v1::{PolicyRule, Subject};

fn sort_list(list: &mut Option<Vec<String>>) {
    if let Some(values) = list {
        values.sort();
        values.dedup();
    }
}

type RuleKey<'a> = (
    &'a Option<Vec<String>>,
    &'a Option<Vec<String>>,
    &'a Option<Vec<String>>,
    &'a Option<Vec<String>>,
    &'a Vec<String>,
);

/// Every field of a rule, in a fixed order
fn rule_key(rule: &PolicyRule) -> RuleKey<'_> {
    (
        &rule.api_groups,
        &rule.resources,
        &rule.resource_names,
        &rule.non_resource_urls,
        &rule.verbs,
    )
}

/// Canonical form of a rule set: sorted lists, sorted rules, no duplicates
///
/// Two rule sets granting the same permissions in a different order
/// normalize to the same value.
pub fn normalize_policy_rules(rules: &[PolicyRule]) -> Vec<PolicyRule> {
    let mut normalized: Vec<PolicyRule> = rules
        .iter()
        .cloned()
        .map(|mut rule| {
            sort_list(&mut rule.api_groups);
            sort_list(&mut rule.resources);
            sort_list(&mut rule.resource_names);
            sort_list(&mut rule.non_resource_urls);
            rule.verbs.sort();
            rule.verbs.dedup();
            rule
        })
        .collect();

    normalized.sort_by(|a, b| rule_key(a).cmp(&rule_key(b)));
    normalized.dedup_by(|a, b| rule_key(a) == rule_key(b));
    normalized
}

fn same_subject(a: &Subject, b: &Subject) -> bool {
    a.kind == b.kind
        && a.name == b.name
        && a.namespace.as_deref().unwrap_or_default() == b.namespace.as_deref().unwrap_or_default()
}

/// Append a subject unless one with the same kind, namespace and name exists
///
/// Returns whether the subject was added.
pub fn add_subject(subjects: &mut Option<Vec<Subject>>, subject: Subject) -> bool {
    let subjects = subjects.get_or_insert_with(Vec::new);
    if subjects.iter().any(|s| same_subject(s, &subject)) {
        return false;
    }
    subjects.push(subject);
    true
}

/// Service-account subject
pub fn service_account_subject(namespace: &str, name: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        PolicyRule {
            api_groups: Some(owned(groups)),
            resources: Some(owned(resources)),
            verbs: owned(verbs),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_dedupes() {
        let r1 = rule(&[""], &["pods"], &["get", "list"]);
        let r2 = rule(&["apps"], &["deployments"], &["watch"]);

        let normalized = normalize_policy_rules(&[r1.clone(), r2.clone(), r1.clone()]);
        assert_eq!(normalized.len(), 2);
        assert!(normalized.contains(&r1));
        assert!(normalized.contains(&r2));
    }

    #[test]
    fn test_normalize_is_order_independent() {
        let a = rule(&[""], &["pods", "nodes"], &["list", "get"]);
        let b = rule(&["apps"], &["deployments"], &["watch"]);
        let a_sorted = rule(&[""], &["nodes", "pods"], &["get", "list"]);

        assert_eq!(
            normalize_policy_rules(&[a, b.clone()]),
            normalize_policy_rules(&[b, a_sorted])
        );
    }

    #[test]
    fn test_normalize_keeps_rules_differing_in_one_field() {
        let all = rule(&[""], &["secrets"], &["get"]);
        let named = PolicyRule {
            resource_names: Some(vec!["agent-token".to_string()]),
            ..all.clone()
        };
        let urls = PolicyRule {
            non_resource_urls: Some(vec!["/metrics".to_string()]),
            ..all.clone()
        };

        let normalized = normalize_policy_rules(&[named.clone(), all.clone(), urls.clone(), all.clone()]);
        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0], all);
        assert!(normalized.contains(&named));
        assert!(normalized.contains(&urls));
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_policy_rules(&[]).is_empty());
    }

    #[test]
    fn test_add_subject_idempotent() {
        let mut subjects = None;
        assert!(add_subject(&mut subjects, service_account_subject("ns", "agent")));
        assert!(!add_subject(&mut subjects, service_account_subject("ns", "agent")));
        assert!(add_subject(&mut subjects, service_account_subject("other", "agent")));
        assert_eq!(subjects.unwrap().len(), 2);
    }
}
