use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::collections::BTreeMap;

use tether_core::ResourceKind;
use tether_core::merge::{MergeFunction, merge_map_entry, override_current};

use super::load;
use crate::error::Result;
use crate::store::Store;

/// Key/value entries of config maps and secrets
pub struct DataManager<'a> {
    store: &'a Store,
}

impl<'a> DataManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn add_config_map_entry(&self, namespace: &str, name: &str, key: &str, value: &str) -> Result<()> {
        self.add_config_map_entry_with_merge(namespace, name, key, value, override_current)
    }

    pub fn add_config_map_entry_with_merge(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
        merge: MergeFunction<String>,
    ) -> Result<()> {
        let mut config_map: ConfigMap = load(self.store, ResourceKind::ConfigMap, namespace, name)?;
        merge_map_entry(
            config_map.data.get_or_insert_with(BTreeMap::new),
            key,
            value.to_string(),
            merge,
        )?;
        self.store.add_or_update(ResourceKind::ConfigMap, config_map)
    }

    /// Secret entries are stored decoded in `data`
    pub fn add_secret_entry(&self, namespace: &str, name: &str, key: &str, value: &[u8]) -> Result<()> {
        self.add_secret_entry_with_merge(namespace, name, key, value, override_current)
    }

    pub fn add_secret_entry_with_merge(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &[u8],
        merge: MergeFunction<ByteString>,
    ) -> Result<()> {
        let mut secret: Secret = load(self.store, ResourceKind::Secret, namespace, name)?;
        merge_map_entry(
            secret.data.get_or_insert_with(BTreeMap::new),
            key,
            ByteString(value.to_vec()),
            merge,
        )?;
        self.store.add_or_update(ResourceKind::Secret, secret)
    }
}
