//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod status;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings, StoreSettings};
use crate::services::sync::CachePolicy;

/// Exit code: the run stored at least one image.
pub const EXIT_CHANGES: i32 = 0;
/// Exit code: the run could not start or failed outright.
pub const EXIT_FATAL: i32 = 1;
/// Exit code: the run completed without storing anything.
pub const EXIT_NO_CHANGES: i32 = 2;

#[derive(Parser)]
#[command(name = "xblsync")]
#[command(about = "Keep Xbox title and achievement images in durable storage")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing images and upload them to durable storage
    Sync {
        /// Data folder holding titles.json, achievements.json and the image cache
        data_dir: Option<PathBuf>,
        /// Azure Blob connection string (BlobEndpoint + SharedAccessSignature)
        connection_string: Option<String>,
        /// Maximum concurrent image fetches (default: 10)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Stop starting new downloads after this many seconds
        #[arg(long, env = "XBLSYNC_RUN_TIMEOUT")]
        timeout: Option<u64>,
        /// Do not read or write the local image cache
        #[arg(long)]
        no_local_cache: bool,
        /// Skip TLS certificate validation for image downloads
        #[arg(long)]
        accept_invalid_certs: bool,
        /// How to treat cached images missing from durable storage
        #[arg(long, value_enum)]
        cache_policy: Option<CachePolicy>,
        /// Store blobs in this directory instead of Azure
        #[arg(long, conflicts_with = "connection_string")]
        store_dir: Option<PathBuf>,
        /// Show progress bars
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Show how many catalog images are stored and missing
    Status {
        /// Data folder holding titles.json and achievements.json
        data_dir: Option<PathBuf>,
        /// Azure Blob connection string
        connection_string: Option<String>,
        /// Store blobs in this directory instead of Azure
        #[arg(long, conflicts_with = "connection_string")]
        store_dir: Option<PathBuf>,
        /// Ask the store directly about one asset, e.g. `title:1234` or `achievement:1234.5`
        #[arg(long)]
        check: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Flags that override loaded settings.
#[derive(Default)]
struct Overrides {
    workers: Option<usize>,
    timeout: Option<u64>,
    no_local_cache: bool,
    accept_invalid_certs: bool,
    cache_policy: Option<CachePolicy>,
    store_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(workers) = self.workers {
            settings.max_concurrent_fetches = workers;
        }
        if let Some(timeout) = self.timeout {
            settings.run_timeout = Some(timeout);
        }
        if self.no_local_cache {
            settings.local_cache = false;
        }
        if self.accept_invalid_certs {
            settings.accept_invalid_certs = true;
        }
        if let Some(policy) = self.cache_policy {
            settings.cache_policy = policy;
        }
        if let Some(root) = self.store_dir {
            settings.store = StoreSettings::Filesystem { root };
        }
    }
}

async fn load_settings(
    cli_config: Option<PathBuf>,
    cwd: bool,
    data: Option<PathBuf>,
    connection_string: Option<String>,
    overrides: Overrides,
) -> anyhow::Result<Settings> {
    let options = LoadOptions {
        config_path: cli_config,
        use_cwd: cwd,
        data,
        connection_string,
    };
    let (mut settings, _config) = load_settings_with_options(options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    overrides.apply(&mut settings);
    settings.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(settings)
}

/// Parse arguments, run the command, and return the process exit code.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            data_dir,
            connection_string,
            workers,
            timeout,
            no_local_cache,
            accept_invalid_certs,
            cache_policy,
            store_dir,
            progress,
        } => {
            let overrides = Overrides {
                workers,
                timeout,
                no_local_cache,
                accept_invalid_certs,
                cache_policy,
                store_dir,
            };
            let settings =
                load_settings(cli.config, cli.cwd, data_dir, connection_string, overrides).await?;
            sync::cmd_sync(&settings, progress).await
        }
        Commands::Status {
            data_dir,
            connection_string,
            store_dir,
            check,
            json,
        } => {
            let overrides = Overrides {
                store_dir,
                ..Default::default()
            };
            let settings =
                load_settings(cli.config, cli.cwd, data_dir, connection_string, overrides).await?;
            status::cmd_status(&settings, check.as_deref(), json).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_positional_invocation() {
        let cli = Cli::try_parse_from([
            "xblsync",
            "sync",
            "/data",
            "BlobEndpoint=https://acct.blob.core.windows.net;SharedAccessSignature=sv=1",
            "--cache-policy",
            "trust-local",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync {
                data_dir,
                connection_string,
                cache_policy,
                ..
            } => {
                assert_eq!(data_dir, Some(PathBuf::from("/data")));
                assert!(connection_string.is_some());
                assert_eq!(cache_policy, Some(CachePolicy::TrustLocal));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = Settings::default();
        Overrides {
            workers: Some(3),
            no_local_cache: true,
            store_dir: Some(PathBuf::from("/blobs")),
            ..Default::default()
        }
        .apply(&mut settings);

        assert_eq!(settings.max_concurrent_fetches, 3);
        assert!(!settings.local_cache);
        assert_eq!(
            settings.store,
            StoreSettings::Filesystem {
                root: PathBuf::from("/blobs")
            }
        );
    }
}
