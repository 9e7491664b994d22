//! Token display metadata resolution (`getAsset` on a DAS endpoint) with an async cache.

use crate::monitor::error::MetadataError;
use crate::monitor::types::TokenMetadata;
use anyhow::Context;
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Where token metadata comes from.
#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, MetadataError>;
}

/// Helius DAS `getAsset` client.
pub struct HeliusAssetClient {
    http_client: Client,
    url: Url,
}

impl HeliusAssetClient {
    /// `api_key` is appended as the `api-key` query parameter when not empty.
    pub fn new(das_url: &str, api_key: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let mut url = Url::parse(das_url).with_context(|| format!("invalid DAS url {das_url}"))?;
        if !api_key.is_empty() {
            url.query_pairs_mut().append_pair("api-key", api_key);
        }
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client, url })
    }
}

#[async_trait]
impl TokenMetadataSource for HeliusAssetClient {
    #[instrument(skip(self, mint), fields(mint = %mint))]
    async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, MetadataError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "wallet-watch",
            "method": "getAsset",
            "params": { "id": mint },
        });

        let response = self
            .http_client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status()));
        }

        let body: Value = response.json().await?;
        parse_asset_response(body)
    }
}

#[derive(Debug, Deserialize)]
struct DasResponse {
    #[serde(default)]
    result: Option<DasAsset>,
    #[serde(default)]
    error: Option<DasError>,
}

#[derive(Debug, Deserialize)]
struct DasError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DasAsset {
    #[serde(default)]
    content: Option<DasContent>,
}

#[derive(Debug, Deserialize)]
struct DasContent {
    #[serde(default)]
    metadata: Option<DasMetadata>,
}

#[derive(Debug, Deserialize)]
struct DasMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

/// Extract `result.content.metadata.{name, symbol}` from a `getAsset` response.
pub fn parse_asset_response(body: Value) -> Result<TokenMetadata, MetadataError> {
    let response: DasResponse = serde_json::from_value(body)?;

    if let Some(error) = response.error {
        return Err(MetadataError::Rpc {
            code: error.code,
            message: error.message.unwrap_or_default(),
        });
    }

    let metadata = response
        .result
        .ok_or(MetadataError::MissingField("result"))?
        .content
        .ok_or(MetadataError::MissingField("result.content"))?
        .metadata
        .ok_or(MetadataError::MissingField("result.content.metadata"))?;

    Ok(TokenMetadata {
        name: metadata
            .name
            .ok_or(MetadataError::MissingField("result.content.metadata.name"))?,
        symbol: metadata
            .symbol
            .ok_or(MetadataError::MissingField("result.content.metadata.symbol"))?,
    })
}

/// Resolves mints to display metadata, caching successful lookups.
pub struct MetadataEnricher {
    source: Arc<dyn TokenMetadataSource>,
    cache: Cache<String, TokenMetadata>,
}

impl MetadataEnricher {
    pub fn new(source: Arc<dyn TokenMetadataSource>, cache_ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(cache_ttl)
            .build();
        Self { source, cache }
    }

    /// Resolve display metadata for `mint`. Failures are not cached.
    #[instrument(skip(self, mint), fields(mint = %mint))]
    pub async fn enrich(&self, mint: &str) -> Result<TokenMetadata, MetadataError> {
        if let Some(hit) = self.cache.get(mint).await {
            debug!("metadata cache hit");
            return Ok(hit);
        }

        let metadata = self.source.fetch_metadata(mint).await?;
        debug!(name = %metadata.name, symbol = %metadata.symbol, "metadata resolved");
        self.cache.insert(mint.to_string(), metadata.clone()).await;
        Ok(metadata)
    }
}
