//! Inject command - show objects as the store writes them

use tether_core::TetherConfig;
use tether_kube::Owner;

use super::{offline_store, parse_owner_ref};
use crate::Target;
use crate::error::{CliError, Result};

/// Run every manifest object through a store owned by `--owner` and print the result
pub fn run(config: &TetherConfig, target: &Target, owner_uid: &str) -> Result<()> {
    let (namespace, name) = parse_owner_ref(&target.owner)?;
    let owner = Owner::new(&config.owner.api_version, &config.owner.kind, namespace, name)
        .with_uid(owner_uid);

    let store = offline_store(config, target, owner)?;
    for (_identity, object) in store.objects() {
        let yaml = object
            .to_yaml()
            .map_err(|e| CliError::internal(format!("failed to render YAML: {e}")))?;
        println!("---");
        print!("{yaml}");
    }

    Ok(())
}
