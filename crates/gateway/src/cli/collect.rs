//! `nhi-agent collect`

use anyhow::Context;
use nhi_collector::IdentityCollector;
use nhi_domain::config::Config;
use nhi_domain::identity::CollectionReport;

use super::CollectArgs;

pub async fn run(mut config: Config, args: CollectArgs) -> anyhow::Result<()> {
    if let Some(profile) = args.aws_profile {
        config.aws.profile = Some(profile);
    }
    if let Some(region) = args.aws_region {
        config.aws.region = region;
    }

    eprintln!("Collecting identities...");
    let mut collector = IdentityCollector::from_config(&config);
    let report = collector.collect_all_identities(args.user.as_deref()).await;
    collector.close().await;

    print!("{}", render_summary(&report));

    let json = serde_json::to_string_pretty(&report).context("serializing identities")?;
    std::fs::write(&args.output, json).with_context(|| format!("writing {}", args.output))?;
    eprintln!("Identities saved to {}", args.output);
    Ok(())
}

/// Per-category counts as a plain-text table. Empty categories are omitted.
pub fn render_summary(report: &CollectionReport) -> String {
    let aws = &report.aws;
    let rows = [
        ("Users", aws.users.len()),
        ("Roles", aws.roles.len()),
        ("Groups", aws.groups.len()),
        ("Access Keys", aws.access_keys.len()),
    ];

    let mut out = String::from("Identity Collection Summary\n");
    out.push_str(&format!("{:<8}{:<14}{:>6}\n", "Source", "Type", "Count"));
    for (kind, count) in rows.into_iter().filter(|(_, n)| *n > 0) {
        out.push_str(&format!("{:<8}{:<14}{:>6}\n", "AWS", kind, count));
    }
    out.push_str(&format!("{:<8}{:<14}{:>6}\n", "", "Total", report.total_count));
    out
}
