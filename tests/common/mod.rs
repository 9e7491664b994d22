//! In-process fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Span;
use wallet_watch::monitor::{
    BuyDetector, BuyPipeline, MetadataEnricher, MetadataError, RetryPolicy, SnapshotWriter,
    SourceError, TokenMetadata, TokenMetadataSource, TransactionFetcher, TransactionSource,
};

pub const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const OTHER_WALLET: &str = "83astBRguLMdt2h5U1Tpdq5tjFoJ6noeGwaY3mDLVcri";

/// One scripted answer of [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum Reply {
    RateLimited,
    Fail(&'static str),
    NotFound,
    Null,
    Tx(Value),
    /// Never answers
    Pending,
}

/// Transaction source answering from per-signature scripts. The last reply of a
/// script repeats; unscripted signatures are not found.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, signature: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(signature.to_string(), replies.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, signature: &str) -> usize {
        self.calls().iter().filter(|s| *s == signature).count()
    }
}

#[async_trait]
impl TransactionSource for ScriptedSource {
    async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, SourceError> {
        self.calls.lock().unwrap().push(signature.to_string());
        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(signature).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match reply.unwrap_or(Reply::NotFound) {
            Reply::RateLimited => Err(SourceError::RateLimited(
                "HTTP status client error (429 Too Many Requests)".to_string(),
            )),
            Reply::Fail(message) => Err(SourceError::Failed(anyhow::anyhow!(message))),
            Reply::NotFound => Ok(None),
            Reply::Null => Ok(Some(Value::Null)),
            Reply::Tx(payload) => Ok(Some(payload)),
            Reply::Pending => std::future::pending().await,
        }
    }
}

/// Metadata source with a fixed set of known mints.
#[derive(Default)]
pub struct StaticMetadata {
    known: HashMap<String, TokenMetadata>,
    calls: AtomicUsize,
}

impl StaticMetadata {
    pub fn with(entries: &[(&str, &str, &str)]) -> Self {
        Self {
            known: entries
                .iter()
                .map(|(mint, name, symbol)| {
                    (
                        mint.to_string(),
                        TokenMetadata {
                            name: name.to_string(),
                            symbol: symbol.to_string(),
                        },
                    )
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenMetadataSource for StaticMetadata {
    async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.known
            .get(mint)
            .cloned()
            .ok_or_else(|| MetadataError::Rpc {
                code: Some(-32000),
                message: "Asset Not Found".to_string(),
            })
    }
}

/// A `postTokenBalances`/`preTokenBalances` entry as the RPC sends it.
pub fn token_balance(mint: &str, owner: &str, ui_amount: f64, decimals: u8) -> Value {
    let raw = (ui_amount * 10f64.powi(decimals as i32)).round() as u64;
    json!({
        "accountIndex": 1,
        "mint": mint,
        "owner": owner,
        "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
        "uiTokenAmount": {
            "amount": raw.to_string(),
            "decimals": decimals,
            "uiAmount": ui_amount,
            "uiAmountString": ui_amount.to_string()
        }
    })
}

/// A `getTransaction` result in jsonParsed encoding.
pub fn transaction(pre: Vec<Value>, post: Vec<Value>) -> Value {
    json!({
        "slot": 250_000_000u64,
        "blockTime": 1_700_000_000i64,
        "version": 0,
        "meta": {
            "err": null,
            "fee": 5000,
            "preTokenBalances": pre,
            "postTokenBalances": post
        },
        "transaction": { "signatures": ["placeholder"] }
    })
}

/// A transaction where `WALLET` goes from `before` to `after` of `mint`.
pub fn buy_of(mint: &str, before: f64, after: f64) -> Value {
    transaction(
        vec![token_balance(mint, WALLET, before, 6)],
        vec![token_balance(mint, WALLET, after, 6)],
    )
}

pub fn pipeline(
    source: Arc<ScriptedSource>,
    metadata: Arc<StaticMetadata>,
    report_all_buys: bool,
) -> BuyPipeline {
    let fetcher = TransactionFetcher::new(
        source,
        RetryPolicy::Immediate,
        SnapshotWriter::disabled(),
        Span::none(),
    );
    let enricher = MetadataEnricher::new(metadata, Duration::from_secs(60), 100);
    BuyPipeline::new(
        fetcher,
        BuyDetector::new(WALLET, Span::none()),
        Arc::new(enricher),
        report_all_buys,
        Span::none(),
    )
}
