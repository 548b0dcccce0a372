//! Report stored and missing images without fetching anything.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use crate::catalog::JsonCatalog;
use crate::config::Settings;
use crate::http::HttpClient;
use crate::models::AssetKind;
use crate::services::SyncService;

pub async fn cmd_status(settings: &Settings, check: Option<&str>, json: bool) -> anyhow::Result<i32> {
    let store = settings
        .store
        .open(Duration::from_secs(settings.request_timeout))?;
    let client = HttpClient::new(&settings.http_config())?;
    let service = SyncService::new(
        Arc::new(JsonCatalog::in_dir(&settings.data_dir)),
        store,
        Arc::new(client),
        settings.sync_config(),
    );

    if let Some(target) = check {
        let (kind, key) = parse_check(target)?;
        let stored = service.is_stored(kind, key).await;
        if json {
            println!(
                "{}",
                serde_json::json!({ "kind": kind, "key": key, "stored": stored })
            );
        } else if stored {
            println!("{} {} {} is stored", style("✓").green(), kind, key);
        } else {
            println!("{} {} {} is not stored", style("✗").red(), kind, key);
        }
        return Ok(0);
    }

    let survey = service.survey().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "titles": survey.titles,
                "achievements": survey.achievements,
            }))?
        );
        return Ok(0);
    }

    println!(
        "{} Store: {}",
        style("→").cyan(),
        settings.store.describe()
    );
    for kind in AssetKind::ALL {
        let stats = survey.stats(kind);
        println!(
            "  {:<13} {:>6} in catalog  {:>6} stored  {:>6} missing  {:>6} without image",
            kind.container(),
            stats.catalog,
            stats.existing,
            stats.eligible,
            stats.skipped
        );
        if stats.from_cache > 0 {
            println!(
                "  {} {} missing images can be uploaded from the local cache",
                style("→").dim(),
                stats.from_cache
            );
        }
        if stats.degraded {
            println!("  {} Listing {} failed", style("!").yellow(), kind.container());
        }
    }

    Ok(0)
}

/// Parse `kind:key`, e.g. `title:1234`.
fn parse_check(target: &str) -> anyhow::Result<(AssetKind, &str)> {
    let (kind, key) = target
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected kind:key, got '{}'", target))?;
    let kind = AssetKind::from_str(kind)
        .ok_or_else(|| anyhow::anyhow!("unknown asset kind '{}'", kind))?;
    if key.is_empty() {
        anyhow::bail!("missing key in '{}'", target);
    }
    Ok((kind, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check() {
        assert_eq!(
            parse_check("title:1234").unwrap(),
            (AssetKind::Title, "1234")
        );
        assert_eq!(
            parse_check("achievements:1.2").unwrap(),
            (AssetKind::Achievement, "1.2")
        );
        assert!(parse_check("1234").is_err());
        assert!(parse_check("stat:1").is_err());
        assert!(parse_check("title:").is_err());
    }
}
