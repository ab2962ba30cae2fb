//! Kinds command - list the resource kinds the store manages

use console::style;

use tether_core::{PlatformInfo, ResourceKind, TetherConfig};
use tether_kube::KindRegistry;

use crate::error::Result;

pub fn run(config: &TetherConfig) -> Result<()> {
    let registry = KindRegistry::with_defaults();
    let platform = PlatformInfo::default();
    let collected = platform.managed_kinds(config.support_extra_kinds);

    println!(
        "{:<34} {:<38} {:<10} {}",
        style("KIND").bold(),
        style("API VERSION").bold(),
        style("SCOPE").bold(),
        style("COLLECTED").bold()
    );

    for kind in ResourceKind::all() {
        let resource = registry.api_resource(*kind, &platform);
        let scope = if kind.is_cluster_scoped() {
            "Cluster"
        } else {
            "Namespace"
        };
        let gc = if collected.contains(kind) {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!(
            "{:<34} {:<38} {:<10} {}",
            kind.kind_name(),
            resource.api_version,
            scope,
            gc
        );
    }

    Ok(())
}
