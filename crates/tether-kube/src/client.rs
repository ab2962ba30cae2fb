//! Live cluster access
//!
//! The store only talks to the cluster through [`LiveClient`], so the same
//! reconcile code runs against a real API server ([`KubeLiveClient`]) or an
//! in-memory one ([`MockLiveClient`](crate::mock::MockLiveClient)).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

use tether_core::PlatformInfo;

use crate::error::{KubeError, Result};
use crate::object::{DeleteTarget, Identity};
use crate::owner::Owner;

/// Get, list, create, update and delete by kind and identity
#[async_trait]
pub trait LiveClient: Send + Sync {
    /// Fetch one object; absence is a not-found error
    async fn get(&self, resource: &ApiResource, identity: &Identity) -> Result<DynamicObject>;

    /// Metadata of every object of a kind matching a label selector
    async fn list_managed(&self, resource: &ApiResource, selector: &str)
    -> Result<Vec<ObjectMeta>>;

    async fn create(&self, resource: &ApiResource, object: &DynamicObject)
    -> Result<DynamicObject>;

    async fn update(&self, resource: &ApiResource, object: &DynamicObject)
    -> Result<DynamicObject>;

    async fn delete(&self, target: &DeleteTarget) -> Result<()>;
}

/// [`LiveClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeLiveClient {
    client: Client,
}

impl KubeLiveClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a client from the default kubeconfig or in-cluster environment
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, resource),
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    /// Look up the owner object to get its uid
    pub async fn fetch_owner(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Owner> {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (resource, _caps) = kube::discovery::pinned_kind(&self.client, &gvk).await?;
        let object = self.api(&resource, Some(namespace)).get(name).await?;

        let mut owner = Owner::from_dynamic(&object)?;
        if owner.namespace.is_empty() {
            owner.namespace = namespace.to_string();
        }
        Ok(owner)
    }
}

#[async_trait]
impl LiveClient for KubeLiveClient {
    async fn get(&self, resource: &ApiResource, identity: &Identity) -> Result<DynamicObject> {
        let api = self.api(resource, identity.namespace_opt());
        Ok(api.get(&identity.name).await?)
    }

    async fn list_managed(
        &self,
        resource: &ApiResource,
        selector: &str,
    ) -> Result<Vec<ObjectMeta>> {
        let api = self.api(resource, None);
        let list = api
            .list_metadata(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items.into_iter().map(|item| item.metadata).collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let api = self.api(resource, object.metadata.namespace.as_deref());
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::InvalidManifest("object has no name".to_string()))?;
        let api = self.api(resource, object.metadata.namespace.as_deref());
        Ok(api.replace(name, &PostParams::default(), object).await?)
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<()> {
        let api = self.api(&target.api_resource, target.identity.namespace_opt());
        api.delete(&target.identity.name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}

/// Build [`PlatformInfo`] from API discovery
pub async fn discover_platform(client: &Client) -> Result<PlatformInfo> {
    let discovery = Discovery::new(client.clone()).run().await?;

    let mut preferred: BTreeMap<String, String> = BTreeMap::new();
    let mut other: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for group in discovery.groups() {
        let preferred_version = group.preferred_version_or_latest();
        for (resource, _caps) in group.versioned_resources(preferred_version) {
            preferred
                .entry(resource.kind.clone())
                .or_insert(resource.api_version.clone());
        }
        for version in group.versions().filter(|v| *v != preferred_version) {
            for (resource, _caps) in group.versioned_resources(version) {
                other
                    .entry(resource.kind.clone())
                    .or_default()
                    .push(resource.api_version.clone());
            }
        }
    }
    debug!(kinds = preferred.len(), "discovered API resources");

    let version = client.apiserver_version().await?;
    Ok(PlatformInfo::from_version_maps(preferred, other).with_server_version(version.git_version))
}
