//! Apply command - create and update the objects of a manifest

use console::style;

use tether_core::TetherConfig;

use super::diff::print_plan;
use super::{Session, report_errors};
use crate::Target;
use crate::error::Result;

pub async fn run(config: &TetherConfig, target: &Target, prune: bool) -> Result<()> {
    let session = Session::open(config, target).await?;
    let Session { client, store } = &session;

    let plan = store.plan(client).await;
    print_plan(&plan);
    let summary = plan.summary();
    let mut errors = store.execute(plan, client).await;

    if prune {
        errors.extend(store.cleanup(client).await);
    }

    if errors.is_empty() {
        println!("{} {}", style("✓").green().bold(), summary);
    } else {
        println!("{} {}", style("⚠").yellow().bold(), summary);
    }
    report_errors(&errors)
}
