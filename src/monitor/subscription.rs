//! Websocket log subscription for one wallet.
//!
//! The channel connects, sends a single `logsSubscribe` request, waits for the
//! acknowledgment and then forwards every notified transaction signature to the
//! signature queue. It never reconnects on its own: any transport or protocol
//! failure ends the channel with a [`SubscriptionError`] and restarting is up to the
//! supervisor.

use crate::monitor::error::SubscriptionError;
use crate::monitor::types::SignatureSender;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, Instrument, Span};
use url::Url;

/// Commitment level requested for notifications.
pub const COMMITMENT: &str = "finalized";

/// Request id of the subscribe call; one subscription per connection.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Anything that can fill a signature queue until it fails.
#[async_trait]
pub trait SignatureFeed: Send + Sync {
    /// Push signatures into `queue` until a fatal error occurs.
    async fn stream_signatures(&self, queue: SignatureSender) -> Result<(), SubscriptionError>;
}

/// `logsSubscribe` request scoped to the transactions mentioning `wallet`.
pub fn subscribe_request(wallet: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": SUBSCRIBE_REQUEST_ID,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [wallet] },
            { "commitment": COMMITMENT }
        ]
    })
}

/// Lifecycle of one subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    AwaitingAck,
    Subscribed,
    Terminated,
}

/// What an inbound text frame meant for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server acknowledged the subscribe request
    Subscribed { subscription_id: Option<u64> },
    /// A log notification carrying a transaction signature
    Signature(String),
    /// Valid JSON without a signature
    Ignored,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    #[serde(default)]
    result: Option<NotificationResult>,
}

#[derive(Debug, Deserialize)]
struct NotificationResult {
    #[serde(default)]
    value: Option<LogsValue>,
}

#[derive(Debug, Deserialize)]
struct LogsValue {
    #[serde(default)]
    signature: Option<String>,
}

/// Protocol state machine, independent of the transport.
#[derive(Debug)]
pub struct SubscriptionSession {
    state: ChannelState,
}

impl Default for SubscriptionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionSession {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Connecting,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The subscribe request went out.
    pub fn subscribe_sent(&mut self) {
        self.transition(ChannelState::AwaitingAck);
    }

    pub fn terminate(&mut self) {
        self.transition(ChannelState::Terminated);
    }

    /// Interpret one inbound text frame.
    pub fn on_text(&mut self, text: &str) -> Result<SessionEvent, SubscriptionError> {
        match self.state {
            ChannelState::Connecting | ChannelState::Terminated => {
                Err(SubscriptionError::UnexpectedMessage(self.state))
            }
            ChannelState::AwaitingAck => {
                let message = self.parse(text)?;
                if let Some(error) = message.error {
                    self.terminate();
                    return Err(rejection(&error));
                }
                self.transition(ChannelState::Subscribed);
                Ok(SessionEvent::Subscribed {
                    subscription_id: message.result.as_ref().and_then(Value::as_u64),
                })
            }
            ChannelState::Subscribed => {
                let message = self.parse(text)?;
                let signature = message
                    .params
                    .and_then(|p| p.result)
                    .and_then(|r| r.value)
                    .and_then(|v| v.signature)
                    .filter(|s| !s.is_empty());
                Ok(match signature {
                    Some(signature) => SessionEvent::Signature(signature),
                    None => SessionEvent::Ignored,
                })
            }
        }
    }

    fn parse(&mut self, text: &str) -> Result<InboundMessage, SubscriptionError> {
        serde_json::from_str(text).map_err(|e| {
            self.terminate();
            SubscriptionError::Malformed(e)
        })
    }

    fn transition(&mut self, next: ChannelState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "subscription state");
            self.state = next;
        }
    }
}

fn rejection(error: &Value) -> SubscriptionError {
    SubscriptionError::Rejected {
        code: error.get("code").and_then(Value::as_i64),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    }
}

/// Websocket `logsSubscribe` channel for one wallet.
#[derive(Debug, Clone)]
pub struct LogsSubscription {
    ws_url: String,
    wallet: String,
    connect_timeout: Duration,
    idle_timeout: Duration,
    span: Span,
}

impl LogsSubscription {
    pub fn new(
        ws_url: impl Into<String>,
        wallet: impl Into<String>,
        connect_timeout: Duration,
        idle_timeout: Duration,
        span: Span,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            wallet: wallet.into(),
            connect_timeout,
            idle_timeout,
            span,
        }
    }

    async fn run(&self, queue: SignatureSender) -> Result<(), SubscriptionError> {
        let mut session = SubscriptionSession::new();
        let url = Url::parse(&self.ws_url).map_err(|source| SubscriptionError::InvalidUrl {
            url: self.ws_url.clone(),
            source,
        })?;

        info!(url = %self.ws_url, "connecting to notification endpoint");
        let (mut ws, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SubscriptionError::ConnectTimeout {
                url: self.ws_url.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| SubscriptionError::Connect {
                url: self.ws_url.clone(),
                source,
            })?;

        ws.send(Message::Text(subscribe_request(&self.wallet).to_string()))
            .await?;
        session.subscribe_sent();
        debug!("subscribe request sent");

        let result = self.receive_loop(&mut ws, &mut session, &queue).await;
        session.terminate();
        result
    }

    async fn receive_loop<S>(
        &self,
        ws: &mut S,
        session: &mut SubscriptionSession,
        queue: &SignatureSender,
    ) -> Result<(), SubscriptionError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let mut ping_outstanding = false;
        loop {
            let frame = match timeout(self.idle_timeout, ws.next()).await {
                Ok(frame) => frame,
                Err(_) if ping_outstanding => {
                    return Err(SubscriptionError::Stalled(self.idle_timeout * 2));
                }
                Err(_) => {
                    debug!("no traffic, sending ping");
                    ws.send(Message::Ping(Vec::new())).await?;
                    ping_outstanding = true;
                    continue;
                }
            };
            ping_outstanding = false;

            match frame {
                Some(Ok(Message::Text(text))) => match session.on_text(&text)? {
                    SessionEvent::Subscribed { subscription_id } => {
                        info!(wallet = %self.wallet, ?subscription_id, "subscribed to wallet logs");
                    }
                    SessionEvent::Signature(signature) => {
                        debug!(%signature, "signature queued");
                        queue
                            .send(signature)
                            .map_err(|_| SubscriptionError::QueueClosed)?;
                    }
                    SessionEvent::Ignored => {}
                },
                Some(Ok(Message::Ping(payload))) => ws.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(SubscriptionError::Closed { reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SubscriptionError::Closed {
                        reason: "stream ended".to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl SignatureFeed for LogsSubscription {
    async fn stream_signatures(&self, queue: SignatureSender) -> Result<(), SubscriptionError> {
        self.run(queue).instrument(self.span.clone()).await
    }
}
