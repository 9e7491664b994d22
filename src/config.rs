//! TOML application configuration with environment overrides.

use crate::monitor::{MonitorConfig, RestartPolicy, RetryPolicy};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub helius: HeliusConfig,
    pub monitor: MonitorSection,
    pub metadata: MetadataConfig,
    pub supervisor: SupervisorConfig,
    pub input: InputConfig,
    pub publisher: PublisherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub http_url: String,
    pub ws_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            idle_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeliusConfig {
    pub api_key: String,
    pub das_url: String,
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            das_url: "https://mainnet.helius-rpc.com/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Empty disables the transaction snapshot
    pub snapshot_dir: String,
    pub report_all_buys: bool,
    pub rate_limit_retry_initial_ms: u64,
    pub rate_limit_retry_max_ms: u64,
    /// 0 = retry forever
    pub rate_limit_retry_max_attempts: u32,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            snapshot_dir: ".".to_string(),
            report_all_buys: false,
            rate_limit_retry_initial_ms: 0,
            rate_limit_retry_max_ms: 0,
            rate_limit_retry_max_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub max_cache_entries: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            cache_ttl_secs: 3600,
            max_cache_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart_backoff_initial_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub healthy_after_secs: u64,
    /// 0 disables the restart breaker
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_backoff_initial_ms: 500,
            restart_backoff_max_ms: 30_000,
            healthy_after_secs: 60,
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub wallets_file: PathBuf,
    pub template_file: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            wallets_file: PathBuf::from("input/wallets.txt"),
            template_file: PathBuf::from("input/tweet-content.txt"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub kind: PublisherKind,
    pub webhook_url: String,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Empty disables the log file
    pub file: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: "logs.log".to_string(),
            json: false,
        }
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

/// Load `WALLET_WATCH_CONFIG` (or `default_path`) and apply environment overrides.
///
/// A missing file at the default location yields the built-in defaults; the returned
/// path is `None` in that case. An explicitly configured path must exist.
pub fn load_from_env_or_default(default_path: &Path) -> Result<(AppConfig, Option<PathBuf>)> {
    let (mut config, loaded_from) = match env::var("WALLET_WATCH_CONFIG") {
        Ok(configured) => {
            let path = PathBuf::from(configured);
            (load_from_path(&path)?, Some(path))
        }
        Err(_) if default_path.exists() => (load_from_path(default_path)?, Some(default_path.to_path_buf())),
        Err(_) => (AppConfig::default(), None),
    };

    config.apply_env_overrides(|key| env::var(key).ok());
    Ok((config, loaded_from))
}

impl AppConfig {
    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup("WALLET_WATCH_HELIUS_API_KEY") {
            self.helius.api_key = api_key;
        }
        if let Some(http_url) = lookup("WALLET_WATCH_RPC_HTTP_URL") {
            self.rpc.http_url = http_url;
        }
        if let Some(ws_url) = lookup("WALLET_WATCH_RPC_WS_URL") {
            self.rpc.ws_url = ws_url;
        }
        if let Some(webhook_url) = lookup("WALLET_WATCH_WEBHOOK_URL") {
            self.publisher.webhook_url = webhook_url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_scheme("rpc.http_url", &self.rpc.http_url, &["http", "https"])?;
        require_scheme("rpc.ws_url", &self.rpc.ws_url, &["ws", "wss"])?;
        require_scheme("helius.das_url", &self.helius.das_url, &["http", "https"])?;

        for (name, value) in [
            ("rpc.request_timeout_secs", self.rpc.request_timeout_secs),
            ("rpc.connect_timeout_secs", self.rpc.connect_timeout_secs),
            ("rpc.idle_timeout_secs", self.rpc.idle_timeout_secs),
            ("metadata.request_timeout_secs", self.metadata.request_timeout_secs),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.publisher.request_timeout_secs == Some(0) {
            bail!("publisher.request_timeout_secs must be greater than zero");
        }

        if self.publisher.kind == PublisherKind::Webhook {
            if self.publisher.webhook_url.trim().is_empty() {
                bail!("publisher.webhook_url is required for the webhook publisher");
            }
            require_scheme("publisher.webhook_url", &self.publisher.webhook_url, &["http", "https"])?;
        }
        Ok(())
    }

    /// Runtime settings for the wallet monitor.
    pub fn monitor_config(&self) -> MonitorConfig {
        let snapshot_dir = self.monitor.snapshot_dir.trim();
        MonitorConfig {
            rpc_http_url: self.rpc.http_url.clone(),
            rpc_ws_url: self.rpc.ws_url.clone(),
            rpc_request_timeout: Duration::from_secs(self.rpc.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.rpc.connect_timeout_secs),
            idle_timeout: Duration::from_secs(self.rpc.idle_timeout_secs),
            das_url: self.helius.das_url.clone(),
            helius_api_key: self.helius.api_key.clone(),
            snapshot_dir: (!snapshot_dir.is_empty()).then(|| PathBuf::from(snapshot_dir)),
            report_all_buys: self.monitor.report_all_buys,
            rate_limit_retry: RetryPolicy::from_millis(
                self.monitor.rate_limit_retry_initial_ms,
                self.monitor.rate_limit_retry_max_ms,
                self.monitor.rate_limit_retry_max_attempts,
            ),
            metadata_request_timeout: Duration::from_secs(self.metadata.request_timeout_secs),
            cache_ttl: Duration::from_secs(self.metadata.cache_ttl_secs),
            max_cache_entries: self.metadata.max_cache_entries,
            restart: RestartPolicy {
                backoff: RetryPolicy::from_millis(
                    self.supervisor.restart_backoff_initial_ms,
                    self.supervisor.restart_backoff_max_ms,
                    0,
                ),
                healthy_after: Duration::from_secs(self.supervisor.healthy_after_secs),
                failure_threshold: self.supervisor.failure_threshold,
                cooldown: Duration::from_secs(self.supervisor.cooldown_secs),
            },
        }
    }
}

fn require_scheme(name: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(value).with_context(|| format!("{name} is not a valid URL: {value}"))?;
    if !schemes.contains(&url.scheme()) {
        bail!("{name} must use one of {schemes:?}, got {}", url.scheme());
    }
    Ok(())
}
