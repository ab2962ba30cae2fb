use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef};
use std::collections::{BTreeMap, HashMap};

use tether_core::ResourceKind;
use tether_core::merge::rbac::{add_subject, service_account_subject};

use super::load;
use crate::error::{KubeError, Result};
use crate::object::Identity;
use crate::store::Store;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Service accounts, roles and their bindings
///
/// Policy rules accumulate: duplicates are left for the role preprocessor
/// to normalize. Binding subjects are only appended once.
///
/// Objects added through a `*_by_component` method are remembered so a
/// feature can withdraw everything it contributed for a component.
pub struct RbacManager<'a> {
    store: &'a Store,
    service_accounts_by_component: HashMap<String, Vec<String>>,
    roles_by_component: HashMap<String, Vec<String>>,
    cluster_roles_by_component: HashMap<String, Vec<String>>,
}

fn role_ref(kind: &str, name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Remove an entry from the store, failing when it was absent
fn remove(store: &Store, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
    if store.delete(kind, namespace, name) {
        Ok(())
    } else {
        Err(KubeError::NotFound {
            identity: Identity::new(kind, namespace, name),
        })
    }
}

/// Run every deletion, reporting the first failure
fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut first = None;
    for result in results {
        if let Err(e) = result {
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

impl<'a> RbacManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            service_accounts_by_component: HashMap::new(),
            roles_by_component: HashMap::new(),
            cluster_roles_by_component: HashMap::new(),
        }
    }

    pub fn add_service_account(&self, namespace: &str, name: &str) -> Result<()> {
        let account: ServiceAccount =
            load(self.store, ResourceKind::ServiceAccount, namespace, name)?;
        self.store.add_or_update(ResourceKind::ServiceAccount, account)
    }

    pub fn add_service_account_by_component(
        &mut self,
        namespace: &str,
        name: &str,
        component: &str,
    ) -> Result<()> {
        self.service_accounts_by_component
            .entry(component.to_string())
            .or_default()
            .push(name.to_string());
        self.add_service_account(namespace, name)
    }

    /// Merge annotations into a service account, new values winning
    pub fn add_service_account_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut account: ServiceAccount =
            load(self.store, ResourceKind::ServiceAccount, namespace, name)?;
        account
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
        self.store.add_or_update(ResourceKind::ServiceAccount, account)
    }

    /// Append rules to a role and bind it to a service account of the same namespace
    pub fn add_policy_rules(
        &self,
        namespace: &str,
        role_name: &str,
        sa_name: &str,
        rules: &[PolicyRule],
    ) -> Result<()> {
        self.add_policy_rules_for(namespace, role_name, namespace, sa_name, rules)
    }

    /// Append rules to a role and bind it to a service account of any namespace
    pub fn add_policy_rules_for(
        &self,
        namespace: &str,
        role_name: &str,
        sa_namespace: &str,
        sa_name: &str,
        rules: &[PolicyRule],
    ) -> Result<()> {
        let mut role: Role = load(self.store, ResourceKind::Role, namespace, role_name)?;
        role.rules
            .get_or_insert_with(Vec::new)
            .extend_from_slice(rules);
        self.store.add_or_update(ResourceKind::Role, role)?;

        self.add_role_binding(
            namespace,
            role_name,
            sa_namespace,
            sa_name,
            role_ref("Role", role_name),
        )
    }

    pub fn add_policy_rules_by_component(
        &mut self,
        namespace: &str,
        role_name: &str,
        sa_name: &str,
        rules: &[PolicyRule],
        component: &str,
    ) -> Result<()> {
        self.roles_by_component
            .entry(component.to_string())
            .or_default()
            .push(role_name.to_string());
        self.add_policy_rules(namespace, role_name, sa_name, rules)
    }

    /// Bind a role (or cluster role) in `role_namespace` to a service account
    ///
    /// The binding is named after the role.
    pub fn add_role_binding(
        &self,
        role_namespace: &str,
        role_name: &str,
        sa_namespace: &str,
        sa_name: &str,
        role_ref: RoleRef,
    ) -> Result<()> {
        let mut binding: RoleBinding =
            load(self.store, ResourceKind::RoleBinding, role_namespace, role_name)?;
        binding.role_ref = role_ref;
        add_subject(
            &mut binding.subjects,
            service_account_subject(sa_namespace, sa_name),
        );
        self.store.add_or_update(ResourceKind::RoleBinding, binding)
    }

    /// Append rules to a cluster role and bind it to a service account
    pub fn add_cluster_policy_rules(
        &self,
        namespace: &str,
        role_name: &str,
        sa_name: &str,
        rules: &[PolicyRule],
    ) -> Result<()> {
        let mut role: ClusterRole = load(self.store, ResourceKind::ClusterRole, "", role_name)?;
        role.rules
            .get_or_insert_with(Vec::new)
            .extend_from_slice(rules);
        self.store.add_or_update(ResourceKind::ClusterRole, role)?;

        self.add_cluster_role_binding(
            namespace,
            role_name,
            sa_name,
            role_ref("ClusterRole", role_name),
        )
    }

    pub fn add_cluster_policy_rules_by_component(
        &mut self,
        namespace: &str,
        role_name: &str,
        sa_name: &str,
        rules: &[PolicyRule],
        component: &str,
    ) -> Result<()> {
        self.cluster_roles_by_component
            .entry(component.to_string())
            .or_default()
            .push(role_name.to_string());
        self.add_cluster_policy_rules(namespace, role_name, sa_name, rules)
    }

    /// Cluster-wide binding `name` for the service account `namespace/sa_name`
    pub fn add_cluster_role_binding(
        &self,
        namespace: &str,
        name: &str,
        sa_name: &str,
        role_ref: RoleRef,
    ) -> Result<()> {
        let mut binding: ClusterRoleBinding =
            load(self.store, ResourceKind::ClusterRoleBinding, "", name)?;
        binding.role_ref = role_ref;
        add_subject(
            &mut binding.subjects,
            service_account_subject(namespace, sa_name),
        );
        self.store
            .add_or_update(ResourceKind::ClusterRoleBinding, binding)
    }

    pub fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()> {
        remove(self.store, ResourceKind::ServiceAccount, namespace, name)
    }

    /// Remove a role and its binding from the store
    pub fn delete_role(&self, namespace: &str, name: &str) -> Result<()> {
        remove(self.store, ResourceKind::Role, namespace, name)?;
        remove(self.store, ResourceKind::RoleBinding, namespace, name)
    }

    /// Remove a cluster role and its binding from the store
    pub fn delete_cluster_role(&self, name: &str) -> Result<()> {
        remove(self.store, ResourceKind::ClusterRole, "", name)?;
        remove(self.store, ResourceKind::ClusterRoleBinding, "", name)
    }

    pub fn delete_service_account_by_component(&self, component: &str, namespace: &str) -> Result<()> {
        let names = self.service_accounts_by_component.get(component);
        first_error(
            names
                .into_iter()
                .flatten()
                .map(|name| self.delete_service_account(namespace, name)),
        )
    }

    pub fn delete_role_by_component(&self, component: &str, namespace: &str) -> Result<()> {
        let names = self.roles_by_component.get(component);
        first_error(
            names
                .into_iter()
                .flatten()
                .map(|name| self.delete_role(namespace, name)),
        )
    }

    pub fn delete_cluster_role_by_component(&self, component: &str) -> Result<()> {
        let names = self.cluster_roles_by_component.get(component);
        first_error(
            names
                .into_iter()
                .flatten()
                .map(|name| self.delete_cluster_role(name)),
        )
    }
}
