//! Configuration management for xblsync using the prefer crate.
//!
//! Precedence, lowest first: built-in defaults, config file, environment,
//! command-line flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::{HttpClientConfig, USER_AGENT};
use crate::models::AssetKind;
use crate::services::sync::{CachePolicy, SyncConfig, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::storage::{AzureBlobStore, DurableStore, FsBlobStore, StorageResult};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "XBLSYNC_DATA_DIR";
/// Environment variable holding the Azure Blob connection string.
pub const CONNECTION_STRING_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";
/// Environment variable selecting a filesystem store root.
pub const STORE_DIR_ENV: &str = "XBLSYNC_STORE_DIR";
/// Environment variable disabling TLS certificate validation.
pub const ACCEPT_INVALID_CERTS_ENV: &str = "XBLSYNC_ACCEPT_INVALID_CERTS";

/// Where synced images are stored durably.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreSettings {
    /// Azure Blob Storage, authenticated with a SAS connection string.
    Azure { connection_string: String },
    /// One directory per container under `root`.
    Filesystem { root: PathBuf },
    /// Local cache only.
    #[default]
    None,
}

impl StoreSettings {
    pub fn describe(&self) -> String {
        match self {
            StoreSettings::Azure { .. } => "azure".to_string(),
            StoreSettings::Filesystem { root } => format!("file://{}", root.display()),
            StoreSettings::None => "none".to_string(),
        }
    }

    /// Open the configured store, if any.
    pub fn open(&self, timeout: Duration) -> StorageResult<Option<Arc<dyn DurableStore>>> {
        let store: Arc<dyn DurableStore> = match self {
            StoreSettings::Azure { connection_string } => {
                Arc::new(AzureBlobStore::from_connection_string(connection_string, timeout)?)
            }
            StoreSettings::Filesystem { root } => Arc::new(FsBlobStore::new(root.clone())),
            StoreSettings::None => return Ok(None),
        };
        Ok(Some(store))
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local data root; images are cached under `titles/` and `achievements/`.
    pub data_dir: PathBuf,
    /// Cache fetched images locally and consult the cache when filtering.
    pub local_cache: bool,
    pub store: StoreSettings,
    pub title_width: u32,
    pub achievement_width: u32,
    pub max_concurrent_fetches: usize,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Whole-run timeout in seconds.
    pub run_timeout: Option<u64>,
    /// Skip TLS certificate validation for image downloads.
    pub accept_invalid_certs: bool,
    /// User agent for HTTP requests.
    pub user_agent: String,
    pub cache_policy: CachePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: local data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xblsync");

        Self {
            data_dir,
            local_cache: true,
            store: StoreSettings::None,
            title_width: AssetKind::Title.default_width(),
            achievement_width: AssetKind::Achievement.default_width(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            request_timeout: 30,
            run_timeout: None,
            accept_invalid_certs: false,
            user_agent: USER_AGENT.to_string(),
            cache_policy: CachePolicy::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("data folder must not be empty".to_string());
        }
        if self.max_concurrent_fetches == 0 {
            return Err("max_concurrent_fetches must be at least 1".to_string());
        }
        if let StoreSettings::Azure { connection_string } = &self.store {
            if connection_string.trim().is_empty() {
                return Err("blob connection string must not be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            data_dir: self.data_dir.clone(),
            local_cache: self.local_cache,
            cache_policy: self.cache_policy,
            max_concurrent_fetches: self.max_concurrent_fetches,
            title_width: self.title_width,
            achievement_width: self.achievement_width,
            run_timeout: self.run_timeout.map(Duration::from_secs),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.request_timeout),
            user_agent: self.user_agent.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    /// Apply environment overrides through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| var(name).filter(|s| !s.is_empty());

        if let Some(dir) = var(DATA_DIR_ENV) {
            tracing::debug!("Using {} from environment: {}", DATA_DIR_ENV, dir);
            self.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        if let Some(root) = var(STORE_DIR_ENV) {
            self.store = StoreSettings::Filesystem {
                root: PathBuf::from(shellexpand::tilde(&root).as_ref()),
            };
        }
        if let Some(connection_string) = var(CONNECTION_STRING_ENV) {
            tracing::debug!("Using {} from environment", CONNECTION_STRING_ENV);
            self.store = StoreSettings::Azure { connection_string };
        }
        if let Some(flag) = var(ACCEPT_INVALID_CERTS_ENV) {
            self.accept_invalid_certs = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory path.
    #[serde(skip_serializing_if = "Option::is_none", alias = "data_folder")]
    pub data_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_cache: Option<bool>,
    /// Azure Blob connection string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    /// Filesystem store root, used when no connection string is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievement_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_fetches: Option<usize>,
    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Whole-run timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
    /// User agent string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<CachePolicy>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers xblsync config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("xblsync").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML, and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(local_cache) = self.local_cache {
            settings.local_cache = local_cache;
        }
        if let Some(ref connection_string) = self.connection_string {
            settings.store = StoreSettings::Azure {
                connection_string: connection_string.clone(),
            };
        } else if let Some(ref store_dir) = self.store_dir {
            settings.store = StoreSettings::Filesystem {
                root: self.resolve_path(store_dir, base_dir),
            };
        }
        if let Some(width) = self.title_width {
            settings.title_width = width;
        }
        if let Some(width) = self.achievement_width {
            settings.achievement_width = width;
        }
        if let Some(max) = self.max_concurrent_fetches {
            settings.max_concurrent_fetches = max;
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(timeout) = self.run_timeout {
            settings.run_timeout = Some(timeout);
        }
        if let Some(accept) = self.accept_invalid_certs {
            settings.accept_invalid_certs = accept;
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(policy) = self.cache_policy {
            settings.cache_policy = policy;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data folder given on the command line.
    pub data: Option<PathBuf>,
    /// Blob connection string given on the command line.
    pub connection_string: Option<String>,
}

/// Load config from an explicit path or via discovery.
async fn load_file_config(options: &LoadOptions) -> Result<Config, String> {
    match options.config_path {
        Some(ref config_path) => Config::load_from_path(config_path).await,
        None => Ok(Config::load().await),
    }
}

/// Layer file config, environment, and command-line values over defaults.
pub fn resolve_settings<F>(config: &Config, options: &LoadOptions, env: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env(env);

    if let Some(ref data) = options.data {
        settings.data_dir = data.clone();
    }
    if let Some(ref connection_string) = options.connection_string {
        settings.store = StoreSettings::Azure {
            connection_string: connection_string.clone(),
        };
    }

    settings
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), String> {
    let config = load_file_config(&options).await?;
    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    let settings = resolve_settings(&config, &options, |name| std::env::var(name).ok());
    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.local_cache);
        assert_eq!(settings.store, StoreSettings::None);
        assert_eq!(settings.max_concurrent_fetches, 10);
        assert_eq!(settings.title_width, 100);
        assert_eq!(settings.achievement_width, 400);
        assert!(!settings.accept_invalid_certs);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_formats() {
        let toml = Config::parse(
            "data_dir = \"data\"\ncache_policy = \"trust-local\"\nmax_concurrent_fetches = 4\n",
            Path::new("xblsync.toml"),
        )
        .unwrap();
        assert_eq!(toml.data_dir.as_deref(), Some("data"));
        assert_eq!(toml.cache_policy, Some(CachePolicy::TrustLocal));
        assert_eq!(toml.max_concurrent_fetches, Some(4));

        let yaml = Config::parse("store_dir: /srv/blobs\n", Path::new("xblsync.yaml")).unwrap();
        assert_eq!(yaml.store_dir.as_deref(), Some("/srv/blobs"));

        let json = Config::parse(r#"{"accept_invalid_certs": true}"#, Path::new("x.json")).unwrap();
        assert_eq!(json.accept_invalid_certs, Some(true));

        assert!(Config::parse("not = [valid", Path::new("x.toml")).is_err());
    }

    #[test]
    fn test_precedence() {
        let config = Config {
            data_dir: Some("/from/file".to_string()),
            store_dir: Some("/file/store".to_string()),
            request_timeout: Some(5),
            ..Default::default()
        };
        let env: HashMap<&str, &str> = HashMap::from([
            (DATA_DIR_ENV, "/from/env"),
            (ACCEPT_INVALID_CERTS_ENV, "true"),
        ]);
        let options = LoadOptions {
            data: Some(PathBuf::from("/from/cli")),
            ..Default::default()
        };

        let settings =
            resolve_settings(&config, &options, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.data_dir, PathBuf::from("/from/cli"));
        assert_eq!(
            settings.store,
            StoreSettings::Filesystem {
                root: PathBuf::from("/file/store")
            }
        );
        assert_eq!(settings.request_timeout, 5);
        assert!(settings.accept_invalid_certs);
    }

    #[test]
    fn test_connection_string_wins_over_store_dir() {
        let config = Config {
            store_dir: Some("/file/store".to_string()),
            ..Default::default()
        };
        let options = LoadOptions {
            connection_string: Some("BlobEndpoint=https://a;SharedAccessSignature=sv=1".into()),
            ..Default::default()
        };
        let settings = resolve_settings(&config, &options, no_env);
        assert!(matches!(settings.store, StoreSettings::Azure { .. }));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Config {
            data_dir: Some("data".to_string()),
            source_path: Some(PathBuf::from("/etc/xblsync/xblsync.toml")),
            ..Default::default()
        };
        let settings = resolve_settings(&config, &LoadOptions::default(), no_env);
        assert_eq!(settings.data_dir, PathBuf::from("/etc/xblsync/data"));
    }

    #[test]
    fn test_validate_rejects_empty_data_dir() {
        let settings = Settings::with_data_dir(PathBuf::new());
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xblsync.json");
        std::fs::write(&path, r#"{"data_folder": "cache"}"#).unwrap();

        let options = LoadOptions {
            config_path: Some(path.clone()),
            ..Default::default()
        };
        let (settings, config) = load_settings_with_options(options).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(settings.data_dir, dir.path().join("cache"));
    }
}
