//! Wallet monitor - subscription, resolution, classification and supervision.
//!
//! One [`Supervisor`] per wallet owns a pipeline made of a [`LogsSubscription`] feeding a
//! signature queue and a [`BuyPipeline`] draining it. Enriched [`BuyEvent`]s from every
//! wallet end up on a single publisher channel.
//!
//! [`BuyEvent`]: crate::types::BuyEvent

pub mod types;
pub mod error;
pub mod retry;
pub mod restart;
pub mod subscription;
pub mod fetcher;
pub mod detector;
pub mod enricher;
pub mod pipeline;
pub mod supervisor;

// Re-export main types
pub use types::{
    BuyCandidate, TokenMetadata, TokenBalanceSnapshot, FetchOutcome, ResolvedTransaction,
    RpcTransaction, RpcTokenBalance, RpcUiTokenAmount, Lenient, MonitorConfig,
    SignatureSender, SignatureReceiver, EventSender, EventReceiver,
};
pub use error::{
    SubscriptionError, SourceError, FetchError, ClassificationError, MetadataError,
    PipelineError,
};

// Re-export key components
pub use retry::RetryPolicy;
pub use restart::{BreakerState, RestartBreaker, RestartPolicy};
pub use subscription::{subscribe_request, ChannelState, LogsSubscription, SignatureFeed};
pub use fetcher::{RpcTransactionSource, SnapshotWriter, TransactionFetcher, TransactionSource};
pub use detector::{detect_all_buys, detect_buy, token_snapshots, BuyDetector};
pub use enricher::{HeliusAssetClient, MetadataEnricher, TokenMetadataSource};
pub use pipeline::BuyPipeline;
pub use supervisor::Supervisor;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, Span};

/// Monitor builder for convenient construction with sensible defaults.
pub struct MonitorBuilder {
    config: MonitorConfig,
}

impl MonitorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// Set the JSON-RPC and websocket endpoints.
    pub fn with_rpc_endpoints(mut self, http_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        self.config.rpc_http_url = http_url.into();
        self.config.rpc_ws_url = ws_url.into();
        self
    }

    pub fn with_rpc_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_request_timeout = timeout;
        self
    }

    /// Set websocket connect and idle timeouts.
    pub fn with_websocket_timeouts(mut self, connect: Duration, idle: Duration) -> Self {
        self.config.connect_timeout = connect;
        self.config.idle_timeout = idle;
        self
    }

    /// Set the metadata service endpoint and API key.
    pub fn with_metadata_service(mut self, das_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.das_url = das_url.into();
        self.config.helius_api_key = api_key.into();
        self
    }

    pub fn with_metadata_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.metadata_request_timeout = timeout;
        self
    }

    /// Set metadata cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.cache_ttl = Duration::from_secs(ttl_seconds);
        self
    }

    /// Set max cache entries.
    pub fn with_max_cache_entries(mut self, max_entries: u64) -> Self {
        self.config.max_cache_entries = max_entries;
        self
    }

    /// Set the snapshot directory; `None` disables snapshots.
    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.snapshot_dir = dir;
        self
    }

    /// Report every balance increase per transaction.
    pub fn with_report_all_buys(mut self, enabled: bool) -> Self {
        self.config.report_all_buys = enabled;
        self
    }

    /// Set the rate-limit retry policy of the fetcher.
    pub fn with_rate_limit_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.rate_limit_retry = policy;
        self
    }

    /// Set the supervisor restart policy.
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart = policy;
        self
    }

    /// Build the monitor configuration.
    pub fn build_config(self) -> MonitorConfig {
        self.config
    }

    /// Build the monitor with live RPC, websocket and metadata clients.
    pub fn build(self) -> Result<Monitor> {
        Monitor::new(self.config)
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory for per-wallet pipelines sharing one RPC client and one metadata cache.
pub struct Monitor {
    config: MonitorConfig,
    source: Arc<dyn TransactionSource>,
    enricher: Arc<MetadataEnricher>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let source: Arc<dyn TransactionSource> = Arc::new(RpcTransactionSource::new(
            config.rpc_http_url.clone(),
            config.rpc_request_timeout,
        ));
        let metadata = HeliusAssetClient::new(
            &config.das_url,
            &config.helius_api_key,
            config.metadata_request_timeout,
        )?;
        let enricher = Arc::new(MetadataEnricher::new(
            Arc::new(metadata),
            config.cache_ttl,
            config.max_cache_entries,
        ));
        Ok(Self::with_sources(config, source, enricher))
    }

    /// Assemble a monitor around already-built sources.
    pub fn with_sources(
        config: MonitorConfig,
        source: Arc<dyn TransactionSource>,
        enricher: Arc<MetadataEnricher>,
    ) -> Self {
        Self {
            config,
            source,
            enricher,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Root span carried by every component of `wallet`'s pipeline.
    pub fn wallet_span(wallet: &str) -> Span {
        info_span!("wallet", wallet = %wallet)
    }

    /// Processing half of `wallet`'s pipeline.
    pub fn pipeline(&self, wallet: &str, span: Span) -> BuyPipeline {
        let snapshots = match &self.config.snapshot_dir {
            Some(dir) => SnapshotWriter::new(dir, wallet),
            None => SnapshotWriter::disabled(),
        };
        let fetcher = TransactionFetcher::new(
            self.source.clone(),
            self.config.rate_limit_retry.clone(),
            snapshots,
            span.clone(),
        );
        let detector = BuyDetector::new(wallet, span.clone());
        BuyPipeline::new(
            fetcher,
            detector,
            self.enricher.clone(),
            self.config.report_all_buys,
            span,
        )
    }

    /// Websocket subscription for `wallet`.
    pub fn subscription(&self, wallet: &str, span: Span) -> LogsSubscription {
        LogsSubscription::new(
            self.config.rpc_ws_url.clone(),
            wallet,
            self.config.connect_timeout,
            self.config.idle_timeout,
            span,
        )
    }

    /// Supervisor running `wallet`'s full pipeline.
    pub fn supervisor(&self, wallet: &str) -> Supervisor {
        let span = Self::wallet_span(wallet);
        let feed: Arc<dyn SignatureFeed> = Arc::new(self.subscription(wallet, span.clone()));
        let pipeline = Arc::new(self.pipeline(wallet, span.clone()));
        Supervisor::new(feed, pipeline, self.config.restart.clone(), span)
    }
}
