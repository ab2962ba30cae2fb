//! Desired-state store, apply engine and garbage collector
//!
//! A [`Store`] is built for one reconcile pass of one owner and discarded
//! afterwards:
//! 1. features write desired objects with [`Store::add_or_update`] (usually
//!    through the façades), the store stamping marker, ownership and default
//!    metadata on every write
//! 2. [`Store::apply`] creates missing objects and updates the ones whose
//!    operator-owned fields drifted
//! 3. [`Store::cleanup`] deletes marker-labeled objects of this owner that
//!    the pass no longer wants
//!
//! Every object is reconciled independently. Failures are collected and
//! returned together; nothing is rolled back.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, error, warn};

use tether_core::labels::{
    MANAGED_BY_STORE_VALUE, default_labels, marker_selector, primary_controller_selector,
};
use tether_core::{
    MANAGED_BY_STORE_LABEL, MANAGED_KEYS_ANNOTATION, ManagedKeys, PART_OF_LABEL,
    PRIMARY_CONTROLLER_LABEL, PlatformInfo, ResourceKind, TetherConfig,
};

use crate::client::LiveClient;
use crate::diff::render_diff;
use crate::error::{Action, KubeError, ReconcileError, Result};
use crate::object::{DeleteTarget, Identity, ManagedObject};
use crate::owner::Owner;
use crate::registry::KindRegistry;

/// Library-side configuration of a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Capabilities of the live cluster
    pub platform: PlatformInfo,
    /// Value of the managed-by label
    pub operator_name: String,
    /// Extra labels stamped on objects written for an owner
    pub default_labels: BTreeMap<String, String>,
    /// Extra annotations stamped on objects written for an owner
    pub default_annotations: BTreeMap<String, String>,
    /// Also garbage-collect the policy-engine network policy kind
    pub support_extra_kinds: bool,
    /// Upper bound for each API call
    pub request_timeout: Option<Duration>,
    /// Stamp the primary-controller label; cleanup then only considers
    /// objects carrying it
    pub primary_controller: bool,
    /// Cleanup skips objects carrying the primary-controller label
    pub exclude_primary_controller_objects: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            platform: PlatformInfo::default(),
            operator_name: "tether".to_string(),
            default_labels: BTreeMap::new(),
            default_annotations: BTreeMap::new(),
            support_extra_kinds: false,
            request_timeout: None,
            primary_controller: false,
            exclude_primary_controller_objects: false,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &TetherConfig, platform: PlatformInfo) -> Self {
        Self {
            platform,
            operator_name: config.operator_name.clone(),
            default_labels: config.default_labels.clone(),
            default_annotations: config.default_annotations.clone(),
            support_extra_kinds: config.support_extra_kinds,
            request_timeout: config.request_timeout,
            primary_controller: config.primary_controller,
            exclude_primary_controller_objects: config.exclude_primary_controller_objects,
        }
    }

    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Store of the primary controller: stamps its label and only cleans
    /// up what it stamped
    pub fn as_primary_controller(mut self) -> Self {
        self.primary_controller = true;
        self
    }

    /// Store whose cleanup leaves the primary controller's objects alone
    pub fn excluding_primary_controller_objects(mut self) -> Self {
        self.exclude_primary_controller_objects = true;
        self
    }
}

/// A create or update queued by [`Store::plan`]
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub identity: Identity,
    /// Preprocessed object that will be sent
    pub object: ManagedObject,
    /// Line diff from the live object, for updates
    pub diff: Option<String>,
}

/// Read-only half of Apply
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub creates: Vec<PlannedChange>,
    pub updates: Vec<PlannedChange>,
    pub unchanged: Vec<Identity>,
    pub errors: Vec<ReconcileError>,
}

impl ReconcilePlan {
    /// Whether executing the plan would issue no write
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if !self.creates.is_empty() {
            parts.push(format!("{} to create", self.creates.len()));
        }
        if !self.updates.is_empty() {
            parts.push(format!("{} to update", self.updates.len()));
        }
        if !self.unchanged.is_empty() {
            parts.push(format!("{} unchanged", self.unchanged.len()));
        }
        if !self.errors.is_empty() {
            parts.push(format!("{} failed", self.errors.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

type Entries = HashMap<ResourceKind, BTreeMap<(String, String), ManagedObject>>;

/// In-memory desired state of one reconcile pass
pub struct Store {
    deps: RwLock<Entries>,
    owner: Option<Owner>,
    registry: Arc<KindRegistry>,
    options: StoreOptions,
}

impl Store {
    /// Without an owner the store is a bare cache: no metadata injection and
    /// no garbage collection.
    pub fn new(owner: Option<Owner>, registry: Arc<KindRegistry>, options: StoreOptions) -> Self {
        Self {
            deps: RwLock::new(HashMap::new()),
            owner,
            registry,
            options,
        }
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn platform_info(&self) -> &PlatformInfo {
        &self.options.platform
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.deps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.deps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the desired object of its identity
    ///
    /// The marker label is always set. With an owner, the part-of,
    /// managed-by and default labels and annotations overwrite any value a
    /// feature already set, and the owner reference is added unless the
    /// object is cluster-scoped or lives in another namespace.
    ///
    /// The keys of every label and annotation on the written object are
    /// recorded in [`MANAGED_KEYS_ANNOTATION`], so dropping one in a later
    /// pass is seen as drift.
    pub fn add_or_update(&self, kind: ResourceKind, object: impl Into<ManagedObject>) -> Result<()> {
        let mut object = object.into();
        let meta = object.meta_mut();
        if kind.is_cluster_scoped() {
            meta.namespace = None;
        }
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            return Err(KubeError::InvalidManifest(format!("{kind} object has no name")));
        }
        let identity = Identity::from_meta(kind, meta);

        let labels = meta.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(
            MANAGED_BY_STORE_LABEL.to_string(),
            MANAGED_BY_STORE_VALUE.to_string(),
        );
        if self.options.primary_controller {
            labels.insert(
                PRIMARY_CONTROLLER_LABEL.to_string(),
                MANAGED_BY_STORE_VALUE.to_string(),
            );
        }

        if let Some(owner) = &self.owner {
            labels.extend(default_labels(
                &owner.part_of(),
                &self.options.operator_name,
                &self.options.default_labels,
            ));
            if !self.options.default_annotations.is_empty() {
                meta.annotations
                    .get_or_insert_with(BTreeMap::new)
                    .extend(self.options.default_annotations.clone());
            }
            if owner.should_set_owner_reference(kind, &identity.namespace) {
                owner.set_owner_reference(meta, &identity)?;
            }
        }

        let managed_keys = ManagedKeys::new(meta.labels.as_ref(), meta.annotations.as_ref());
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(MANAGED_KEYS_ANNOTATION.to_string(), managed_keys.to_string());

        debug!(
            kind = %kind,
            namespace = %identity.namespace,
            name = %identity.name,
            "store write"
        );
        self.write()
            .entry(kind)
            .or_default()
            .insert((identity.namespace, identity.name), object);
        Ok(())
    }

    pub fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<ManagedObject> {
        let identity = Identity::new(kind, namespace, name);
        self.read()
            .get(&kind)
            .and_then(|objects| objects.get(&(identity.namespace, identity.name)))
            .cloned()
    }

    /// Stored object, or a fresh empty one with its identity set
    ///
    /// The flag tells whether the object was already in the store.
    pub fn get_or_create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> (ManagedObject, bool) {
        if let Some(object) = self.get(kind, namespace, name) {
            return (object, true);
        }

        let mut object = self.registry.empty_object(kind, &self.options.platform);
        let meta = object.meta_mut();
        meta.name = Some(name.to_string());
        meta.namespace = if kind.is_cluster_scoped() || namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        };
        (object, false)
    }

    /// Remove an object from this pass's desired set (not from the cluster)
    pub fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        let identity = Identity::new(kind, namespace, name);
        self.write()
            .get_mut(&kind)
            .and_then(|objects| objects.remove(&(identity.namespace, identity.name)))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities of every desired object, sorted
    pub fn identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self
            .read()
            .iter()
            .flat_map(|(kind, objects)| {
                objects
                    .keys()
                    .map(|(namespace, name)| Identity::new(*kind, namespace, name))
            })
            .collect();
        identities.sort();
        identities
    }

    /// Copy of the desired objects, sorted by identity
    ///
    /// Passes work on a snapshot so no lock is held across API calls.
    pub fn objects(&self) -> Vec<(Identity, ManagedObject)> {
        let mut objects: Vec<(Identity, ManagedObject)> = self
            .read()
            .iter()
            .flat_map(|(kind, objects)| {
                objects.iter().map(|((namespace, name), object)| {
                    (Identity::new(*kind, namespace, name), object.clone())
                })
            })
            .collect();
        objects.sort_by(|a, b| a.0.cmp(&b.0));
        objects
    }

    fn managed_kinds(&self) -> Vec<ResourceKind> {
        self.options
            .platform
            .managed_kinds(self.options.support_extra_kinds)
    }

    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match self.options.request_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| KubeError::Timeout(limit))?,
            None => request.await,
        }
    }

    /// Compare every desired object with the live cluster
    ///
    /// Missing objects are queued for create. Existing ones are
    /// preprocessed against the live object and queued for update unless
    /// the kind's equality says they match.
    pub async fn plan<C>(&self, client: &C) -> ReconcilePlan
    where
        C: LiveClient + ?Sized,
    {
        let platform = &self.options.platform;
        let mut plan = ReconcilePlan::default();

        for (identity, desired) in self.objects() {
            let kind = identity.kind;
            let resource = self.registry.api_resource(kind, platform);

            let live = match self.call(client.get(&resource, &identity)).await {
                Ok(live) => Some(live),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    error!(identity = %identity, error = %e, "failed to get live object");
                    plan.errors.push(ReconcileError::new(Action::Get, &identity, e));
                    continue;
                }
            };
            let live = match live.map(|l| self.registry.decode(kind, l, platform)).transpose() {
                Ok(live) => live,
                Err(e) => {
                    plan.errors.push(ReconcileError::new(Action::Get, &identity, e));
                    continue;
                }
            };

            let prepared = match self.registry.preprocess(kind, desired, live.as_ref()) {
                Ok(prepared) => prepared,
                Err(e) => {
                    plan.errors.push(ReconcileError::new(Action::Preprocess, &identity, e));
                    continue;
                }
            };

            match live {
                None => {
                    debug!(identity = %identity, "queued for create");
                    plan.creates.push(PlannedChange {
                        identity,
                        object: prepared,
                        diff: None,
                    });
                }
                Some(live) if self.registry.equals(kind, &prepared, &live) => {
                    debug!(identity = %identity, "up to date");
                    plan.unchanged.push(identity);
                }
                Some(live) => {
                    debug!(identity = %identity, "queued for update");
                    let diff = render_diff(&prepared, &live).ok();
                    plan.updates.push(PlannedChange {
                        identity,
                        object: prepared,
                        diff,
                    });
                }
            }
        }

        debug!(
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            unchanged = plan.unchanged.len(),
            errors = plan.errors.len(),
            "reconcile plan ready"
        );
        plan
    }

    async fn write_change<C>(&self, client: &C, action: Action, change: &PlannedChange) -> Result<()>
    where
        C: LiveClient + ?Sized,
    {
        let resource = self
            .registry
            .api_resource(change.identity.kind, &self.options.platform);
        let object = change.object.to_dynamic()?;
        match action {
            Action::Update => self.call(client.update(&resource, &object)).await?,
            _ => self.call(client.create(&resource, &object)).await?,
        };
        Ok(())
    }

    /// Issue the writes of a plan: every create, then every update
    pub async fn execute<C>(&self, plan: ReconcilePlan, client: &C) -> Vec<ReconcileError>
    where
        C: LiveClient + ?Sized,
    {
        let mut errors = plan.errors;
        let batches = [(Action::Create, plan.creates), (Action::Update, plan.updates)];

        for (action, changes) in batches {
            for change in changes {
                if let Err(e) = self.write_change(client, action, &change).await {
                    error!(identity = %change.identity, error = %e, "failed to {action}");
                    errors.push(ReconcileError::new(action, &change.identity, e));
                }
            }
        }
        errors
    }

    /// Reconcile every desired object against the live cluster
    pub async fn apply<C>(&self, client: &C) -> Vec<ReconcileError>
    where
        C: LiveClient + ?Sized,
    {
        let plan = self.plan(client).await;
        self.execute(plan, client).await
    }

    /// Delete this owner's marker-labeled objects the pass no longer wants
    ///
    /// Objects whose part-of label names another owner are never touched.
    /// A primary-controller store only considers objects carrying the
    /// primary-controller label; a store excluding them skips those objects.
    /// A store without an owner deletes nothing.
    pub async fn cleanup<C>(&self, client: &C) -> Vec<ReconcileError>
    where
        C: LiveClient + ?Sized,
    {
        let Some(owner) = &self.owner else {
            warn!("cleanup skipped: store has no owner");
            return Vec::new();
        };
        let part_of = owner.part_of();
        let selector = if self.options.primary_controller {
            primary_controller_selector()
        } else {
            marker_selector()
        };
        let exclude_primary = self.options.exclude_primary_controller_objects;

        self.collect(client, selector, |identity, meta_labels, desired| {
            if desired.contains(identity) {
                return false;
            }
            let Some(labels) = meta_labels else {
                return false;
            };
            if exclude_primary && labels.contains_key(PRIMARY_CONTROLLER_LABEL) {
                debug!(identity = %identity, "left to the primary controller");
                return false;
            }
            labels
                .get(PART_OF_LABEL)
                .is_some_and(|value| part_of.matches(value))
        })
        .await
    }

    /// Delete every marker-labeled object that is in the store
    ///
    /// Used for teardown. The store must first be repopulated with the
    /// owner's complete resource set; an empty store deletes nothing.
    pub async fn delete_all<C>(&self, client: &C) -> Vec<ReconcileError>
    where
        C: LiveClient + ?Sized,
    {
        if self.is_empty() {
            warn!("delete_all skipped: store is empty, repopulate it before teardown");
            return Vec::new();
        }

        self.collect(client, marker_selector(), |identity, _labels, desired| {
            desired.contains(identity)
        })
        .await
    }

    /// List marker-labeled objects per managed kind and delete the selected ones
    async fn collect<C, F>(&self, client: &C, selector: &str, select: F) -> Vec<ReconcileError>
    where
        C: LiveClient + ?Sized,
        F: Fn(&Identity, Option<&BTreeMap<String, String>>, &HashSet<Identity>) -> bool,
    {
        let desired: HashSet<Identity> = self.identities().into_iter().collect();
        let mut errors = Vec::new();

        for kind in self.managed_kinds() {
            let resource = self.registry.api_resource(kind, &self.options.platform);
            let listed = match self
                .call(client.list_managed(&resource, selector))
                .await
            {
                Ok(listed) => listed,
                Err(e) if e.is_not_found() => {
                    debug!(kind = %kind, "kind not served by the cluster");
                    continue;
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "failed to list managed objects");
                    errors.push(ReconcileError::for_kind(Action::List, kind, e));
                    continue;
                }
            };

            for meta in listed {
                let identity = Identity::from_meta(kind, &meta);
                if !select(&identity, meta.labels.as_ref(), &desired) {
                    continue;
                }
                let target = DeleteTarget::new(identity.clone(), resource.clone());
                match self.call(client.delete(&target)).await {
                    Ok(()) => debug!(identity = %identity, "deleted"),
                    Err(e) if e.is_not_found() || e.is_gone() => {
                        debug!(identity = %identity, "already deleted")
                    }
                    Err(e) => {
                        error!(identity = %identity, error = %e, "failed to delete");
                        errors.push(ReconcileError::new(Action::Delete, &identity, e));
                    }
                }
            }
        }
        errors
    }
}
