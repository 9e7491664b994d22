//! Signature-to-transaction resolution.
//!
//! [`TransactionFetcher`] drives an explicit retry loop over a [`TransactionSource`]:
//! rate-limited calls are retried according to a [`RetryPolicy`], every other failure is
//! terminal for the signature. A successful payload is also written to a wallet-scoped
//! debug snapshot.

use crate::monitor::error::{FetchError, SourceError};
use crate::monitor::retry::RetryPolicy;
use crate::monitor::types::{FetchOutcome, ResolvedTransaction, RpcTransaction};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn, Span};

/// Where transactions come from.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch the `jsonParsed` transaction for `signature`.
    ///
    /// `Ok(None)` means the node answered but has no confirmed transaction.
    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, SourceError>;
}

/// [`TransactionSource`] backed by a Solana JSON-RPC endpoint.
pub struct RpcTransactionSource {
    client: Arc<RpcClient>,
}

impl RpcTransactionSource {
    pub fn new(rpc_url: String, request_timeout: Duration) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_timeout(rpc_url, request_timeout)),
        }
    }
}

#[async_trait]
impl TransactionSource for RpcTransactionSource {
    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, SourceError> {
        let signature = Signature::from_str(signature)
            .map_err(|e| anyhow!("invalid signature {signature}: {e}"))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::finalized()),
            max_supported_transaction_version: Some(0),
        };
        let params = json!([signature.to_string(), config]);

        // Option<Value> so a `null` result is "not confirmed" instead of a decode error
        self.client
            .send::<Option<Value>>(RpcRequest::GetTransaction, params)
            .await
            .map_err(classify_client_error)
    }
}

/// Sort a client error into rate-limited or terminal.
fn classify_client_error(error: ClientError) -> SourceError {
    let throttled_status = match error.kind() {
        ClientErrorKind::Reqwest(e) => e.status().is_some_and(|s| s.as_u16() == 429),
        _ => false,
    };
    let message = error.to_string();
    if throttled_status || looks_rate_limited(&message) {
        SourceError::RateLimited(message)
    } else {
        SourceError::Failed(anyhow::Error::new(error).context("getTransaction failed"))
    }
}

/// Heuristic used when the transport does not expose a status code.
pub fn looks_rate_limited(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("429") || message.contains("too many requests") || message.contains("rate limit")
}

/// Overwrites one file with the most recently fetched transaction of a wallet.
#[derive(Debug, Clone, Default)]
pub struct SnapshotWriter {
    path: Option<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, wallet: &str) -> Self {
        Self {
            path: Some(dir.as_ref().join(format!("last_trx_{wallet}.json"))),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write `payload`; failures are logged, never returned.
    pub async fn write(&self, payload: &Value) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(e) = write_snapshot(path, payload).await {
            warn!(path = %path.display(), error = %e, "failed to write transaction snapshot");
        }
    }
}

async fn write_snapshot(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(payload)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Resolves signatures into transactions, one at a time.
pub struct TransactionFetcher {
    source: Arc<dyn TransactionSource>,
    retry: RetryPolicy,
    snapshots: SnapshotWriter,
    span: Span,
}

impl TransactionFetcher {
    pub fn new(
        source: Arc<dyn TransactionSource>,
        retry: RetryPolicy,
        snapshots: SnapshotWriter,
        span: Span,
    ) -> Self {
        Self {
            source,
            retry,
            snapshots,
            span,
        }
    }

    /// Resolve `signature`, retrying rate-limited calls per the retry policy.
    #[instrument(parent = &self.span, skip(self, signature), fields(signature = %signature))]
    pub async fn fetch(&self, signature: &str) -> Result<FetchOutcome, FetchError> {
        info!("fetching transaction details");

        let mut delays = self.retry.delays();
        let mut attempts: u32 = 0;
        let payload = loop {
            attempts += 1;
            match self.source.get_transaction(signature).await {
                Ok(payload) => break payload,
                Err(SourceError::RateLimited(message)) => match delays.next() {
                    Some(delay) => {
                        debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "rate limited, retrying");
                        if delay.is_zero() {
                            // immediate retries still yield to the scheduler
                            tokio::task::yield_now().await;
                        } else {
                            sleep(delay).await;
                        }
                    }
                    None => {
                        return Err(FetchError::RetriesExhausted {
                            attempts,
                            last: message,
                        })
                    }
                },
                Err(SourceError::Failed(source)) => {
                    return Err(FetchError::Rpc { attempts, source });
                }
            }
        };

        let Some(raw) = payload.filter(|v| !v.is_null()) else {
            warn!(attempts, "transaction not found or not yet confirmed");
            return Ok(FetchOutcome::NotConfirmed);
        };

        self.snapshots.write(&raw).await;

        let transaction: RpcTransaction = serde_json::from_value(raw)?;
        debug!(attempts, slot = ?transaction.slot, "transaction resolved");
        Ok(FetchOutcome::Resolved(ResolvedTransaction {
            signature: signature.to_string(),
            transaction,
            attempts,
        }))
    }
}
