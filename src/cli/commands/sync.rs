//! Run the image sync once.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::{mpsc, watch};

use super::{EXIT_CHANGES, EXIT_NO_CHANGES};
use crate::catalog::JsonCatalog;
use crate::cli::progress::SyncProgress;
use crate::config::Settings;
use crate::http::HttpClient;
use crate::models::{AssetKind, AssetStatus, SyncResult};
use crate::services::{SyncEvent, SyncService};

/// Map a finished run to the process exit code.
pub fn exit_code(result: &SyncResult) -> i32 {
    if result.total_changes() > 0 {
        EXIT_CHANGES
    } else {
        EXIT_NO_CHANGES
    }
}

pub async fn cmd_sync(settings: &Settings, show_progress: bool) -> anyhow::Result<i32> {
    let store = settings
        .store
        .open(Duration::from_secs(settings.request_timeout))?;
    if store.is_none() {
        println!(
            "{} No durable store configured; images are only cached in {}",
            style("!").yellow(),
            settings.data_dir.display()
        );
    }

    let client = HttpClient::new(&settings.http_config())?;
    let catalog = JsonCatalog::in_dir(&settings.data_dir);
    let service = SyncService::new(
        Arc::new(catalog),
        store,
        Arc::new(client),
        settings.sync_config(),
    );

    println!(
        "{} Syncing images from {} to {} ({} concurrent fetches)",
        style("→").cyan(),
        settings.data_dir.display(),
        settings.store.describe(),
        settings.max_concurrent_fetches
    );

    // Event channel for progress updates
    let (event_tx, mut event_rx) = mpsc::channel::<SyncEvent>(100);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{} Interrupted; waiting for in-flight downloads",
                style("!").yellow()
            );
            let _ = cancel_tx.send(true);
        }
    });

    let progress_display = show_progress.then(|| Arc::new(SyncProgress::new()));

    // Spawn event handler task (UI layer)
    let progress_clone = progress_display.clone();
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SyncEvent::StreamStarted { kind, stats } => {
                    if let Some(ref progress) = progress_clone {
                        progress.start_stream(kind, &stats);
                    }
                }
                SyncEvent::AssetStarted { .. } => {}
                SyncEvent::AssetFinished { outcome } => {
                    if let Some(ref progress) = progress_clone {
                        progress.record(&outcome);
                    }
                    if outcome.status.is_failure() {
                        let line = format!(
                            "{} {} {}: {}",
                            style("✗").red(),
                            outcome.kind,
                            outcome.key,
                            outcome.error.as_deref().unwrap_or(outcome.status.as_str())
                        );
                        match progress_clone {
                            Some(ref progress) => progress.println(&line),
                            None => eprintln!("{}", line),
                        }
                    }
                }
                SyncEvent::StreamFinished { kind } => {
                    if let Some(ref progress) = progress_clone {
                        progress.finish_stream(kind);
                    }
                }
            }
        }
    });

    // Run sync service (business logic)
    let result = service.run_with(Some(event_tx), Some(cancel_rx)).await;
    interrupt.abort();

    // Wait for event handler to finish
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    if let Some(ref progress) = progress_display {
        progress.finish();
    }

    let result = result?;
    print_summary(&result);
    Ok(exit_code(&result))
}

fn print_summary(result: &SyncResult) {
    for kind in AssetKind::ALL {
        let stats = result.stats(kind);
        println!(
            "{} {}: downloaded {}, uploaded {}",
            style("✓").green(),
            kind.container(),
            result.downloaded(kind),
            result.uploaded(kind)
        );
        println!(
            "  {} {} in catalog, {} already stored",
            style("→").dim(),
            stats.catalog,
            stats.existing
        );
        if stats.from_cache > 0 {
            println!(
                "  {} {} uploaded from local cache",
                style("→").dim(),
                stats.from_cache
            );
        }
        if stats.skipped > 0 {
            println!("  {} {} without an image", style("→").dim(), stats.skipped);
        }
        if stats.degraded {
            println!(
                "  {} Listing failed; every missing image was attempted",
                style("!").yellow()
            );
        }
    }

    if !result.failures.is_empty() {
        let fetch = result
            .failures
            .iter()
            .filter(|o| o.status == AssetStatus::FetchFailed)
            .count();
        println!(
            "{} {} failed ({} download, {} upload)",
            style("!").yellow(),
            result.failures.len(),
            fetch,
            result.failures.len() - fetch
        );
    }

    if result.interrupted {
        println!(
            "{} Stopped early; {} images not attempted",
            style("!").yellow(),
            result.cancelled.len()
        );
    }

    if let Some(elapsed) = result.elapsed() {
        println!(
            "{} Finished in {:.1}s",
            style("→").dim(),
            elapsed.num_milliseconds() as f64 / 1000.0
        );
    }

    if result.total_changes() == 0 {
        println!("{} No changes", style("→").dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetDescriptor, AssetOutcome};
    use std::path::Path;

    #[test]
    fn test_exit_code() {
        let mut result = SyncResult::default();
        assert_eq!(exit_code(&result), EXIT_NO_CHANGES);

        let d = AssetDescriptor::new(AssetKind::Title, "1".into(), "http://x".into(), Path::new("/d"));
        result.record(AssetOutcome::failed(&d, AssetStatus::FetchFailed, "HTTP 404"));
        assert_eq!(exit_code(&result), EXIT_NO_CHANGES);

        result.record(AssetOutcome::new(&d, AssetStatus::Fetched));
        assert_eq!(exit_code(&result), EXIT_CHANGES);
    }
}
