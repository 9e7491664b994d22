//! Rate-limit retries and outcomes of the transaction fetcher.

mod common;

use common::{buy_of, token_balance, transaction, Reply, ScriptedSource, WALLET};
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;
use wallet_watch::monitor::{
    token_snapshots, ClassificationError, FetchError, FetchOutcome, RetryPolicy,
    SnapshotWriter, TransactionFetcher,
};

fn fetcher(source: Arc<ScriptedSource>, retry: RetryPolicy) -> TransactionFetcher {
    TransactionFetcher::new(source, retry, SnapshotWriter::disabled(), Span::none())
}

#[tokio::test]
async fn test_rate_limited_twice_then_resolved() -> anyhow::Result<()> {
    let source = Arc::new(ScriptedSource::new());
    source.script(
        "sig1",
        vec![Reply::RateLimited, Reply::RateLimited, Reply::Tx(buy_of("MintA", 0.0, 1.0))],
    );
    source.script("sig2", vec![Reply::Tx(buy_of("MintB", 0.0, 2.0))]);
    let fetcher = fetcher(source.clone(), RetryPolicy::Immediate);

    match fetcher.fetch("sig1").await? {
        FetchOutcome::Resolved(resolved) => {
            assert_eq!(resolved.attempts, 3);
            assert_eq!(resolved.signature, "sig1");
            assert_eq!(resolved.transaction.slot, Some(250_000_000));
        }
        FetchOutcome::NotConfirmed => panic!("expected a resolved transaction"),
    }

    assert!(matches!(fetcher.fetch("sig2").await?, FetchOutcome::Resolved(_)));
    assert_eq!(source.calls(), vec!["sig1", "sig1", "sig1", "sig2"]);
    Ok(())
}

#[tokio::test]
async fn test_backoff_delays_are_applied() -> anyhow::Result<()> {
    let source = Arc::new(ScriptedSource::new());
    source.script(
        "sig1",
        vec![Reply::RateLimited, Reply::Tx(buy_of("MintA", 0.0, 1.0))],
    );
    let fetcher = fetcher(
        source.clone(),
        RetryPolicy::Fixed {
            delay: Duration::from_millis(50),
            max_attempts: None,
        },
    );

    let started = tokio::time::Instant::now();
    assert!(matches!(fetcher.fetch("sig1").await?, FetchOutcome::Resolved(_)));
    assert!(started.elapsed() >= Duration::from_millis(50));
    Ok(())
}

#[tokio::test]
async fn test_capped_policy_gives_up() {
    let source = Arc::new(ScriptedSource::new());
    source.script("sig1", vec![Reply::RateLimited]);
    let fetcher = fetcher(
        source.clone(),
        RetryPolicy::Fixed {
            delay: Duration::from_millis(1),
            max_attempts: Some(3),
        },
    );

    match fetcher.fetch("sig1").await {
        Err(FetchError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(source.calls_for("sig1"), 3);
}

#[tokio::test]
async fn test_missing_transaction_is_not_confirmed() -> anyhow::Result<()> {
    let source = Arc::new(ScriptedSource::new());
    source.script("null", vec![Reply::Null]);
    let fetcher = fetcher(source.clone(), RetryPolicy::Immediate);

    assert!(matches!(fetcher.fetch("absent").await?, FetchOutcome::NotConfirmed));
    assert!(matches!(fetcher.fetch("null").await?, FetchOutcome::NotConfirmed));
    assert_eq!(source.calls_for("absent"), 1);
    Ok(())
}

#[tokio::test]
async fn test_other_failures_are_not_retried() {
    let source = Arc::new(ScriptedSource::new());
    source.script("sig1", vec![Reply::Fail("connection reset by peer")]);
    let fetcher = fetcher(source.clone(), RetryPolicy::Immediate);

    match fetcher.fetch("sig1").await {
        Err(FetchError::Rpc { attempts, .. }) => assert_eq!(attempts, 1),
        other => panic!("expected an rpc failure, got {other:?}"),
    }
    assert_eq!(source.calls_for("sig1"), 1);
}

#[tokio::test]
async fn test_resolved_payload_is_snapshotted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = Arc::new(ScriptedSource::new());
    let payload = buy_of("MintA", 0.0, 1.0);
    source.script("sig1", vec![Reply::Tx(payload.clone())]);

    let snapshots = SnapshotWriter::new(dir.path(), common::WALLET);
    let fetcher = TransactionFetcher::new(source, RetryPolicy::Immediate, snapshots.clone(), Span::none());
    fetcher.fetch("sig1").await?;

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(snapshots.path().unwrap())?)?;
    assert_eq!(written, payload);
    Ok(())
}

#[tokio::test]
async fn test_mistyped_balance_record_still_resolves() -> anyhow::Result<()> {
    let mut broken = token_balance("MintB", WALLET, 1.0, 6);
    broken["uiTokenAmount"]["uiAmount"] = serde_json::json!("not-a-number");
    let source = Arc::new(ScriptedSource::new());
    source.script(
        "sig1",
        vec![Reply::Tx(transaction(
            vec![],
            vec![token_balance("MintA", WALLET, 2.0, 6), broken],
        ))],
    );
    let fetcher = fetcher(source, RetryPolicy::Immediate);

    let FetchOutcome::Resolved(resolved) = fetcher.fetch("sig1").await? else {
        panic!("expected a resolved transaction");
    };
    assert!(matches!(
        token_snapshots(&resolved.transaction),
        Err(ClassificationError::InvalidField { list: "post", index: 1, field: "uiAmount", .. })
    ));
    Ok(())
}
