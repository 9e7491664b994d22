//! Error taxonomy of the detection pipeline.

use super::subscription::ChannelState;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Fatal failure of a subscription channel. Never retried by the channel itself.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("invalid websocket url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("timed out connecting to {url} after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("subscription rejected by server (code {code:?}): {message}")]
    Rejected { code: Option<i64>, message: String },
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("websocket closed by server: {reason}")]
    Closed { reason: String },
    #[error("no inbound traffic for {0:?}")]
    Stalled(Duration),
    #[error("malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message received in {0:?} state")]
    UnexpectedMessage(ChannelState),
    #[error("signature queue closed")]
    QueueClosed,
}

/// Failure reported by a [`TransactionSource`](super::fetcher::TransactionSource) for one call.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The endpoint throttled the request; the fetcher retries these.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Failure to resolve a signature. Terminal for that signature only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited {attempts} times, retry policy exhausted: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("rpc call failed after {attempts} attempt(s): {source}")]
    Rpc {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("unexpected transaction payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A balance record could not be interpreted. The detector reports these as "no buy".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    #[error("transaction has no status meta")]
    MissingMeta,
    #[error("{list} balance #{index} is missing `{field}`")]
    MissingField {
        list: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("{list} balance #{index} is not a balance record: {value}")]
    MalformedRecord {
        list: &'static str,
        index: usize,
        value: String,
    },
    #[error("{list} balance #{index} has an invalid `{field}`: {value}")]
    InvalidField {
        list: &'static str,
        index: usize,
        field: &'static str,
        value: String,
    },
    #[error("{list} balance #{index} has unparseable amount {value:?}")]
    BadAmount {
        list: &'static str,
        index: usize,
        value: String,
    },
}

/// Failure to resolve display metadata for a mint.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metadata service answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("metadata service error (code {code:?}): {message}")]
    Rpc { code: Option<i64>, message: String },
    #[error("metadata response is missing `{0}`")]
    MissingField(&'static str),
    #[error("unexpected metadata payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a pipeline generation stopped. Every variant except
/// [`PipelineError::PublisherClosed`] leads to a restart.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error("signature feed ended without an error")]
    FeedEnded,
    #[error("signature queue closed")]
    SignatureQueueClosed,
    #[error("output queue closed")]
    OutputQueueClosed,
    #[error("publisher channel closed")]
    PublisherClosed,
    #[error("pipeline task panicked: {0}")]
    Panicked(String),
    #[error("pipeline task cancelled")]
    Cancelled,
}
