//! Fetch one transaction and print how the buy detector classifies it for a wallet.
//!
//! Usage: `inspect_transaction <wallet> <signature>`

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::info_span;
use wallet_watch::config::{self, DEFAULT_CONFIG_PATH};
use wallet_watch::monitor::detector::token_snapshots;
use wallet_watch::monitor::{
    detect_all_buys, detect_buy, FetchOutcome, RpcTransactionSource, SnapshotWriter,
    TransactionFetcher,
};
use wallet_watch::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [wallet, signature] = args.as_slice() else {
        bail!("usage: inspect_transaction <wallet> <signature>");
    };

    let (mut config, _) = config::load_from_env_or_default(Path::new(DEFAULT_CONFIG_PATH))?;
    config.logging.file.clear();
    let _log_guard = telemetry::init_tracing(&config.logging)?;
    config.validate()?;

    let monitor_config = config.monitor_config();
    let source = Arc::new(RpcTransactionSource::new(
        monitor_config.rpc_http_url.clone(),
        monitor_config.rpc_request_timeout,
    ));
    let fetcher = TransactionFetcher::new(
        source,
        monitor_config.rate_limit_retry.clone(),
        SnapshotWriter::disabled(),
        info_span!("inspect", wallet = %wallet),
    );

    let report = match fetcher.fetch(signature).await? {
        FetchOutcome::NotConfirmed => json!({
            "signature": signature,
            "status": "not_confirmed",
        }),
        FetchOutcome::Resolved(resolved) => match token_snapshots(&resolved.transaction) {
            Ok((pre, post)) => json!({
                "signature": signature,
                "status": "resolved",
                "attempts": resolved.attempts,
                "slot": resolved.transaction.slot,
                "pre_token_balances": pre,
                "post_token_balances": post,
                "buy": detect_buy(&pre, &post, wallet),
                "all_buys": detect_all_buys(&pre, &post, wallet),
            }),
            Err(e) => json!({
                "signature": signature,
                "status": "unclassifiable",
                "attempts": resolved.attempts,
                "error": e.to_string(),
            }),
        },
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}
