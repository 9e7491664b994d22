//! Data model for the buy-detection pipeline.
//!
//! Wire payloads are deserialized into the `Rpc*` boundary structs below, where every
//! field is optional. They are validated once into [`TokenBalanceSnapshot`] before the
//! detector looks at them.

use crate::monitor::restart::RestartPolicy;
use crate::monitor::retry::RetryPolicy;
use crate::types::{BuyEvent, TransactionSignature, WalletAddress};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// A balance observation for one (mint, owner) pair, before or after a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalanceSnapshot {
    pub mint: String,
    pub owner: WalletAddress,
    /// Human-scaled amount (raw amount / 10^decimals)
    pub ui_amount: f64,
    pub decimals: u8,
}

/// A token balance increase for the monitored wallet, not yet enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyCandidate {
    pub buyer: WalletAddress,
    pub mint: String,
    pub amount_received: f64,
    pub final_balance: f64,
    pub previous_balance: f64,
    pub decimals: u8,
}

/// Display metadata for a token mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

/// Result of resolving a signature against the ledger.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The RPC returned a confirmed transaction
    Resolved(ResolvedTransaction),
    /// The RPC call succeeded but returned no value
    NotConfirmed,
}

/// A transaction resolved by the fetcher.
#[derive(Debug, Clone)]
pub struct ResolvedTransaction {
    pub signature: TransactionSignature,
    /// Typed view of the payload
    pub transaction: RpcTransaction,
    /// Number of RPC attempts it took, rate-limited ones included
    pub attempts: u32,
}

/// A payload field that either has the expected shape or is kept as the raw JSON it was.
///
/// Balance records go through this so a record of the wrong shape reaches the detector
/// (and becomes a classification failure) instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    Valid(T),
    Invalid(Value),
}

impl<T> Lenient<T> {
    pub fn valid(&self) -> Result<&T, &Value> {
        match self {
            Lenient::Valid(value) => Ok(value),
            Lenient::Invalid(raw) => Err(raw),
        }
    }
}

/// `getTransaction` result (jsonParsed encoding), reduced to what the pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub meta: Option<RpcTransactionMeta>,
}

/// Status meta of a transaction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionMeta {
    #[serde(default)]
    pub pre_token_balances: Option<Vec<Lenient<RpcTokenBalance>>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<Lenient<RpcTokenBalance>>>,
}

/// One entry of `preTokenBalances` / `postTokenBalances`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTokenBalance {
    #[serde(default)]
    pub mint: Option<Lenient<String>>,
    #[serde(default)]
    pub owner: Option<Lenient<String>>,
    #[serde(default)]
    pub ui_token_amount: Option<Lenient<RpcUiTokenAmount>>,
}

/// `uiTokenAmount` of a token balance entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUiTokenAmount {
    #[serde(default)]
    pub ui_amount: Option<Lenient<f64>>,
    #[serde(default)]
    pub ui_amount_string: Option<Lenient<String>>,
    #[serde(default)]
    pub decimals: Option<Lenient<u8>>,
}

impl RpcTokenBalance {
    /// Convenience constructor, mostly for tests and tooling.
    pub fn new(mint: &str, owner: &str, ui_amount: f64, decimals: u8) -> Self {
        Self {
            mint: Some(Lenient::Valid(mint.to_string())),
            owner: Some(Lenient::Valid(owner.to_string())),
            ui_token_amount: Some(Lenient::Valid(RpcUiTokenAmount {
                ui_amount: Some(Lenient::Valid(ui_amount)),
                ui_amount_string: Some(Lenient::Valid(ui_amount.to_string())),
                decimals: Some(Lenient::Valid(decimals)),
            })),
        }
    }
}

impl RpcTransaction {
    /// Build a transaction carrying only token balance lists.
    pub fn with_token_balances(pre: Vec<RpcTokenBalance>, post: Vec<RpcTokenBalance>) -> Self {
        Self {
            slot: None,
            meta: Some(RpcTransactionMeta {
                pre_token_balances: Some(pre.into_iter().map(Lenient::Valid).collect()),
                post_token_balances: Some(post.into_iter().map(Lenient::Valid).collect()),
            }),
        }
    }
}

// --- Pipeline queues ---

/// Producer side of the signature queue (subscription channel)
pub type SignatureSender = mpsc::UnboundedSender<TransactionSignature>;
/// Consumer side of the signature queue (drain loop)
pub type SignatureReceiver = mpsc::UnboundedReceiver<TransactionSignature>;

/// Producer side of an output queue
pub type EventSender = mpsc::UnboundedSender<BuyEvent>;
/// Consumer side of an output queue
pub type EventReceiver = mpsc::UnboundedReceiver<BuyEvent>;

/// Runtime settings shared by every wallet pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// JSON-RPC endpoint used for `getTransaction`
    pub rpc_http_url: String,
    /// Websocket endpoint used for `logsSubscribe`
    pub rpc_ws_url: String,
    pub rpc_request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Silence on the websocket before a ping; twice this without traffic is fatal
    pub idle_timeout: Duration,
    /// DAS endpoint used for `getAsset`
    pub das_url: String,
    pub helius_api_key: String,
    /// Where `last_trx_<wallet>.json` goes; `None` disables the snapshot
    pub snapshot_dir: Option<PathBuf>,
    /// Report every balance increase of a transaction instead of the first one
    pub report_all_buys: bool,
    pub rate_limit_retry: RetryPolicy,
    pub metadata_request_timeout: Duration,
    pub cache_ttl: Duration,
    pub max_cache_entries: u64,
    pub restart: RestartPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_http_url: "https://api.mainnet-beta.solana.com".to_string(),
            rpc_ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            rpc_request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            das_url: "https://mainnet.helius-rpc.com/".to_string(),
            helius_api_key: String::new(),
            snapshot_dir: Some(PathBuf::from(".")),
            report_all_buys: false,
            rate_limit_retry: RetryPolicy::Immediate,
            metadata_request_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(3600),
            max_cache_entries: 10_000,
            restart: RestartPolicy::default(),
        }
    }
}
