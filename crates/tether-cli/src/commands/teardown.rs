//! Teardown command - delete the managed objects of a manifest

use console::style;

use tether_core::TetherConfig;

use super::{Session, report_errors};
use crate::Target;
use crate::error::Result;

/// Delete every marker-labeled object that the manifest describes
///
/// The store is filled from the manifest first: an empty manifest
/// deletes nothing.
pub async fn run(config: &TetherConfig, target: &Target) -> Result<()> {
    let session = Session::open(config, target).await?;
    let count = session.store.len();

    let errors = session.store.delete_all(&session.client).await;
    if errors.is_empty() {
        println!(
            "{} Removed the managed objects of {} manifest entries",
            style("✓").green().bold(),
            count
        );
    }
    report_errors(&errors)
}
