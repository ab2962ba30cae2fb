//! In-memory live cluster for testing
//!
//! Objects are stored as generic documents keyed by kind, namespace and
//! name. Every call is counted so tests can assert how many creates,
//! updates and deletes a reconcile pass issued.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::core::ErrorResponse;
use kube::discovery::ApiResource;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tether_core::ResourceKind;

use crate::client::LiveClient;
use crate::error::{KubeError, Result};
use crate::object::{DeleteTarget, Identity};

type ObjectKey = (String, String, String);

/// Call kinds of the live client, for counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    counts: OperationCounts,
    failures: HashSet<(MockOperation, String)>,
    terminating: HashSet<String>,
    next_version: u64,
}

/// In-memory [`LiveClient`]
#[derive(Clone, Default)]
pub struct MockLiveClient {
    state: Arc<RwLock<MockState>>,
}

fn key_of(kind: &str, meta: &ObjectMeta) -> ObjectKey {
    (
        kind.to_string(),
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

/// Evaluate a label selector of `key`, `key=value` and `!key` terms
fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some(key) = term.strip_prefix('!') {
                return labels.is_none_or(|l| !l.contains_key(key));
            }
            match term.split_once('=') {
                Some((key, value)) => {
                    labels.and_then(|l| l.get(key)).map(String::as_str)
                        == Some(value.trim_start_matches('='))
                }
                None => labels.is_some_and(|l| l.contains_key(term)),
            }
        })
}

impl MockLiveClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the cluster with an object, as if created out of band
    pub fn insert(&self, object: DynamicObject) {
        let kind = object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default();
        let mut state = self.write();
        let key = key_of(&kind, &object.metadata);
        state.objects.insert(key, object);
    }

    pub fn get_object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<DynamicObject> {
        let identity = Identity::new(kind, namespace, name);
        let key = (
            kind.kind_name().to_string(),
            identity.namespace,
            identity.name,
        );
        self.read().objects.get(&key).cloned()
    }

    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.get_object(kind, namespace, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().objects.is_empty()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.read().counts.clone()
    }

    pub fn reset_counts(&self) {
        self.write().counts = OperationCounts::default();
    }

    /// Make every `operation` on objects named `name` fail with a server error
    pub fn fail_on(&self, operation: MockOperation, name: &str) {
        self.write().failures.insert((operation, name.to_string()));
    }

    /// Make deletes of objects named `name` report the object as terminating
    pub fn mark_terminating(&self, name: &str) {
        self.write().terminating.insert(name.to_string());
    }

    fn record(&self, operation: MockOperation, name: &str) -> Result<()> {
        let mut state = self.write();
        let counts = &mut state.counts;
        match operation {
            MockOperation::Get => counts.gets += 1,
            MockOperation::List => counts.lists += 1,
            MockOperation::Create => counts.creates += 1,
            MockOperation::Update => counts.updates += 1,
            MockOperation::Delete => counts.deletes += 1,
        }
        if state.failures.contains(&(operation, name.to_string())) {
            return Err(api_error(
                500,
                "InternalError",
                format!("injected {operation:?} failure for {name}"),
            ));
        }
        Ok(())
    }

    fn not_found(kind: &str, namespace: &str, name: &str) -> KubeError {
        match ResourceKind::from_kind_name(kind) {
            Some(kind) => KubeError::NotFound {
                identity: Identity::new(kind, namespace, name),
            },
            None => api_error(404, "NotFound", format!("{kind} {namespace}/{name} not found")),
        }
    }

    /// Server-side defaults and bookkeeping applied on every write
    fn admit(state: &mut MockState, object: &mut DynamicObject) {
        state.next_version += 1;
        let version = state.next_version;
        object.metadata.resource_version = Some(version.to_string());
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(format!("uid-{version}"));
        }

        let is_service = object.types.as_ref().is_some_and(|t| t.kind == "Service");
        if is_service {
            if let Some(spec) = object.data.get_mut("spec").and_then(|s| s.as_object_mut()) {
                spec.entry("clusterIP")
                    .or_insert_with(|| format!("10.96.0.{}", version % 250).into());
            }
        }
    }
}

#[async_trait]
impl LiveClient for MockLiveClient {
    async fn get(&self, resource: &ApiResource, identity: &Identity) -> Result<DynamicObject> {
        self.record(MockOperation::Get, &identity.name)?;
        let key = (
            resource.kind.clone(),
            identity.namespace.clone(),
            identity.name.clone(),
        );
        self.read().objects.get(&key).cloned().ok_or_else(|| {
            Self::not_found(&resource.kind, &identity.namespace, &identity.name)
        })
    }

    async fn list_managed(
        &self,
        resource: &ApiResource,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>> {
        self.record(MockOperation::List, &resource.kind)?;
        let state = self.read();
        Ok(state
            .objects
            .iter()
            .filter(|((kind, _, _), _)| *kind == resource.kind)
            .filter(|(_, object)| selector_matches(selector, object.metadata.labels.as_ref()))
            .map(|(_, object)| object.metadata.clone())
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.metadata.name.clone().unwrap_or_default();
        self.record(MockOperation::Create, &name)?;

        let mut state = self.write();
        let key = key_of(&resource.kind, &object.metadata);
        if state.objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} {} already exists", resource.kind, name),
            ));
        }
        let mut created = object.clone();
        Self::admit(&mut state, &mut created);
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.metadata.name.clone().unwrap_or_default();
        self.record(MockOperation::Update, &name)?;

        let mut state = self.write();
        let key = key_of(&resource.kind, &object.metadata);
        let Some(current) = state.objects.get(&key) else {
            return Err(Self::not_found(&resource.kind, &key.1, &key.2));
        };
        if let Some(expected) = &object.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(api_error(409, "Conflict", format!("{name} was modified")));
            }
        }

        let mut updated = object.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        Self::admit(&mut state, &mut updated);
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<()> {
        let identity = &target.identity;
        self.record(MockOperation::Delete, &identity.name)?;

        let mut state = self.write();
        if state.terminating.contains(&identity.name) {
            return Err(KubeError::Gone {
                identity: identity.clone(),
            });
        }
        let key = (
            target.api_resource.kind.clone(),
            identity.namespace.clone(),
            identity.name.clone(),
        );
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(
                &target.api_resource.kind,
                &identity.namespace,
                &identity.name,
            )),
        }
    }
}
