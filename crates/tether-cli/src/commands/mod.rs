//! CLI commands

pub mod apply;
pub mod diff;
pub mod inject;
pub mod kinds;
pub mod list;
pub mod teardown;

use console::style;
use std::path::Path;
use std::sync::Arc;

use tether_core::{PlatformInfo, TetherConfig};
use tether_kube::{
    KindRegistry, KubeLiveClient, Owner, ReconcileError, Store, StoreOptions, discover_platform,
    parse_manifest,
};

use crate::Target;
use crate::error::{CliError, Result};

pub fn load_config(path: Option<&Path>) -> Result<TetherConfig> {
    let config = match path {
        Some(path) => TetherConfig::load_from(path)?,
        None => TetherConfig::load()?,
    };
    Ok(config)
}

/// Split a `namespace/name` owner reference
pub fn parse_owner_ref(value: &str) -> Result<(String, String)> {
    match value.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(CliError::input_with_help(
            format!("invalid owner '{value}'"),
            "use the form namespace/name, e.g. --owner monitoring/agent",
        )),
    }
}

/// Parse the target manifest and write every object into `store`
fn populate(store: &Store, target: &Target, owner_namespace: &str) -> Result<()> {
    let content = std::fs::read_to_string(&target.manifest)?;
    let namespace = target.namespace.as_deref().unwrap_or(owner_namespace);
    let objects = parse_manifest(
        &content,
        namespace,
        store.registry(),
        store.platform_info(),
    )?;
    for (kind, object) in objects {
        store.add_or_update(kind, object)?;
    }
    Ok(())
}

/// Store filled from a manifest, without a cluster
pub fn offline_store(config: &TetherConfig, target: &Target, owner: Owner) -> Result<Store> {
    let namespace = owner.namespace.clone();
    let store = Store::new(
        Some(owner),
        Arc::new(KindRegistry::with_defaults()),
        StoreOptions::from_config(config, PlatformInfo::default()),
    );
    populate(&store, target, &namespace)?;
    Ok(store)
}

/// Cluster client and a store filled from the target manifest
pub struct Session {
    pub client: KubeLiveClient,
    pub store: Store,
}

impl Session {
    pub async fn open(config: &TetherConfig, target: &Target) -> Result<Self> {
        let (namespace, name) = parse_owner_ref(&target.owner)?;
        if !target.manifest.exists() {
            return Err(CliError::Io {
                message: format!("manifest not found: {}", target.manifest.display()),
            });
        }

        let client = KubeLiveClient::try_default().await?;
        let platform = discover_platform(client.client()).await?;
        let owner = client
            .fetch_owner(&config.owner.api_version, &config.owner.kind, &namespace, &name)
            .await?;

        let store = Store::new(
            Some(owner),
            Arc::new(KindRegistry::with_defaults()),
            StoreOptions::from_config(config, platform),
        );
        populate(&store, target, &namespace)?;
        Ok(Self { client, store })
    }
}

/// Print collected failures; any failure fails the command
pub fn report_errors(errors: &[ReconcileError]) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    for error in errors {
        eprintln!("{} {}", style("✗").red().bold(), error);
    }
    Err(CliError::Reconcile {
        failed: errors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_ref() {
        assert_eq!(
            parse_owner_ref("monitoring/agent").unwrap(),
            ("monitoring".to_string(), "agent".to_string())
        );
        assert!(parse_owner_ref("agent").is_err());
        assert!(parse_owner_ref("/agent").is_err());
        assert!(parse_owner_ref("monitoring/").is_err());
    }
}
