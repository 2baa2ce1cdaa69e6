//! Configuration loader and validator for the release watcher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub github: GitHub,
    pub bark: Bark,
    pub store: Store,
    #[serde(default)]
    pub server: Server,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Seconds between scheduled polls in the long-running service. `0`
    /// disables the in-process schedule.
    #[serde(default)]
    pub poll_interval_secs: u64,
}

/// Release source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHub {
    pub token: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Push notifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bark {
    pub server: String,
    pub key: String,
}

/// Watchlist backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub backend: StoreBackend,
    #[serde(default)]
    pub nocodb: Option<NocoDb>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Nocodb,
}

/// Remote tabular backend credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NocoDb {
    pub records_url: String,
    pub token: String,
}

/// Management HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".into(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com/".into()
}

fn default_user_agent() -> String {
    "release-watch".into()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite location: `DATABASE_URL` when set, else a file under `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/release-watch.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    /// Overwrite secrets from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GH_TOKEN") {
            self.github.token = v;
        }
        if let Some(v) = get("BARK_KEY") {
            self.bark.key = v;
        }
        if let Some(v) = get("BARK_SERVER") {
            self.bark.server = v;
        }
        let url = get("NOCODB_URL");
        let token = get("NOCODB_TOKEN");
        if url.is_some() || token.is_some() {
            let nocodb = self.store.nocodb.get_or_insert_with(NocoDb::default);
            if let Some(v) = url {
                nocodb.records_url = v;
            }
            if let Some(v) = token {
                nocodb.token = v;
            }
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.github.token.trim().is_empty() {
        return Err(ConfigError::Invalid("github.token must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.github.api_base).is_err() {
        return Err(ConfigError::Invalid("github.api_base must be a valid URL"));
    }
    if cfg.github.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("github.user_agent must be non-empty"));
    }

    if cfg.bark.key.trim().is_empty() {
        return Err(ConfigError::Invalid("bark.key must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.bark.server).is_err() {
        return Err(ConfigError::Invalid("bark.server must be a valid URL"));
    }

    if cfg.store.backend == StoreBackend::Nocodb {
        let Some(nocodb) = &cfg.store.nocodb else {
            return Err(ConfigError::Invalid(
                "store.nocodb is required when store.backend is nocodb",
            ));
        };
        if reqwest::Url::parse(&nocodb.records_url).is_err() {
            return Err(ConfigError::Invalid("store.nocodb.records_url must be a valid URL"));
        }
        if nocodb.token.trim().is_empty() {
            return Err(ConfigError::Invalid("store.nocodb.token must be non-empty"));
        }
    }

    if cfg.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("server.bind must be a socket address"));
    }

    Ok(())
}

/// Returns the example YAML content shipped as `config.example.yaml`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  # Seconds between scheduled polls; 0 leaves scheduling to an external timer.
  poll_interval_secs: 3600

github:
  token: "YOUR_GITHUB_TOKEN"
  api_base: "https://api.github.com/"
  user_agent: "release-watch"

bark:
  server: "https://api.day.app"
  key: "YOUR_BARK_DEVICE_KEY"

store:
  # sqlite | nocodb
  backend: sqlite
  nocodb:
    records_url: "https://nocodb.example.com/api/v2/tables/TABLE_ID/records"
    token: "YOUR_NOCODB_TOKEN"

server:
  bind: "127.0.0.1:8787"
"#
}
