//! List command - list marker-labeled objects on the cluster

use chrono::{DateTime, Utc};
use console::style;
use tracing::warn;

use tether_core::labels::marker_selector;
use tether_core::{PART_OF_LABEL, PartOfLabelValue, TetherConfig};
use tether_kube::{Identity, KindRegistry, KubeLiveClient, LiveClient, discover_platform};

use super::parse_owner_ref;
use crate::error::Result;

/// Compact age such as `3d` or `5m`
fn age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    if elapsed.num_days() > 0 {
        format!("{}d", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h", elapsed.num_hours())
    } else if elapsed.num_minutes() > 0 {
        format!("{}m", elapsed.num_minutes())
    } else {
        format!("{}s", elapsed.num_seconds().max(0))
    }
}

pub async fn run(config: &TetherConfig, owner: Option<&str>) -> Result<()> {
    let filter = owner
        .map(parse_owner_ref)
        .transpose()?
        .map(|(namespace, name)| PartOfLabelValue::new(namespace, name));

    let client = KubeLiveClient::try_default().await?;
    let platform = discover_platform(client.client()).await?;
    let registry = KindRegistry::with_defaults();
    let now = Utc::now();

    let mut rows = Vec::new();
    for kind in platform.managed_kinds(config.support_extra_kinds) {
        let resource = registry.api_resource(kind, &platform);
        let listed = match client.list_managed(&resource, marker_selector()).await {
            Ok(listed) => listed,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                warn!(kind = %kind, error = %e, "failed to list");
                continue;
            }
        };

        for meta in listed {
            let part_of = meta
                .labels
                .as_ref()
                .and_then(|labels| labels.get(PART_OF_LABEL))
                .cloned()
                .unwrap_or_default();
            if filter.as_ref().is_some_and(|f| !f.matches(&part_of)) {
                continue;
            }
            let created = meta
                .creation_timestamp
                .as_ref()
                .map(|t| age(t.0, now))
                .unwrap_or_else(|| "-".to_string());
            rows.push((Identity::from_meta(kind, &meta), part_of, created));
        }
    }

    if rows.is_empty() {
        println!("No managed objects found");
        return Ok(());
    }

    rows.sort();
    println!(
        "{:<32} {:<20} {:<40} {:<30} {}",
        style("KIND").bold(),
        style("NAMESPACE").bold(),
        style("NAME").bold(),
        style("PART OF").bold(),
        style("AGE").bold()
    );
    for (identity, part_of, created) in rows {
        println!(
            "{:<32} {:<20} {:<40} {:<30} {}",
            identity.kind.kind_name(),
            identity.namespace,
            identity.name,
            part_of,
            created
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age() {
        let now = Utc::now();
        assert_eq!(age(now - Duration::days(3), now), "3d");
        assert_eq!(age(now - Duration::hours(5), now), "5h");
        assert_eq!(age(now - Duration::minutes(7), now), "7m");
        assert_eq!(age(now + Duration::seconds(2), now), "0s");
    }
}
