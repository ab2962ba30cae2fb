//! Diff command - show what apply would change

use console::style;

use tether_core::TetherConfig;
use tether_kube::ReconcilePlan;

use super::{Session, report_errors};
use crate::Target;
use crate::error::Result;

/// Print the creates and updates of a plan, with the update diffs
pub fn print_plan(plan: &ReconcilePlan) {
    for change in &plan.creates {
        println!("{} create {}", style("+").green().bold(), change.identity);
    }
    for change in &plan.updates {
        println!("{} update {}", style("~").yellow().bold(), change.identity);
        if let Some(diff) = &change.diff {
            for line in diff.lines() {
                let styled = match line.chars().next() {
                    Some('+') if !line.starts_with("+++") => style(line).green(),
                    Some('-') if !line.starts_with("---") => style(line).red(),
                    _ => style(line).dim(),
                };
                println!("    {styled}");
            }
        }
    }
}

pub async fn run(config: &TetherConfig, target: &Target) -> Result<()> {
    let session = Session::open(config, target).await?;
    let plan = session.store.plan(&session.client).await;

    print_plan(&plan);
    println!();
    println!("{} {}", style("→").blue().bold(), plan.summary());

    report_errors(&plan.errors)
}
