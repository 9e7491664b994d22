//! Whole-pipeline supervision for one wallet.
//!
//! A generation is a subscription task, a drain task and a relay task sharing two
//! fresh queues. The first of them to stop ends the generation: the others are
//! aborted, both queues are dropped with whatever they still held, and the restart
//! breaker decides when the next generation starts.

use crate::monitor::error::PipelineError;
use crate::monitor::pipeline::BuyPipeline;
use crate::monitor::restart::{RestartBreaker, RestartPolicy};
use crate::monitor::subscription::SignatureFeed;
use crate::monitor::types::{EventReceiver, EventSender};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, Instant};
use tracing::{error, info, info_span, Instrument, Span};

/// Restarts the pipeline of one wallet until the publisher channel closes.
pub struct Supervisor {
    feed: Arc<dyn SignatureFeed>,
    pipeline: Arc<BuyPipeline>,
    restart: RestartPolicy,
    span: Span,
}

impl Supervisor {
    pub fn new(
        feed: Arc<dyn SignatureFeed>,
        pipeline: Arc<BuyPipeline>,
        restart: RestartPolicy,
        span: Span,
    ) -> Self {
        Self {
            feed,
            pipeline,
            restart,
            span,
        }
    }

    /// Run generations until `publisher` closes; returns how many were started.
    pub async fn run(&self, publisher: EventSender) -> u64 {
        let mut breaker = RestartBreaker::new(self.restart.clone());
        let mut generation: u64 = 0;

        loop {
            if publisher.is_closed() {
                info!(parent: &self.span, generations = generation, "publisher channel closed, supervisor stopping");
                return generation;
            }

            generation += 1;
            let started = Instant::now();
            let fault = self.run_generation(generation, &publisher).await;
            if matches!(fault, PipelineError::PublisherClosed) {
                info!(parent: &self.span, generations = generation, "publisher channel closed, supervisor stopping");
                return generation;
            }

            let ran_for = started.elapsed();
            let decision = breaker.on_generation_ended(ran_for);
            error!(
                parent: &self.span,
                generation,
                error = %fault,
                ran_for_ms = ran_for.as_millis() as u64,
                restart_in_ms = decision.delay.as_millis() as u64,
                breaker = ?decision.state,
                "pipeline failed, restarting"
            );

            if decision.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep(decision.delay).await;
            }
        }
    }

    async fn run_generation(&self, generation: u64, publisher: &EventSender) -> PipelineError {
        let span = info_span!(parent: &self.span, "generation", generation);
        info!(parent: &span, "starting pipeline");

        let (signature_tx, signature_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut tasks: JoinSet<PipelineError> = JoinSet::new();

        let feed = self.feed.clone();
        tasks.spawn(
            async move {
                match feed.stream_signatures(signature_tx).await {
                    Ok(()) => PipelineError::FeedEnded,
                    Err(e) => PipelineError::Subscription(e),
                }
            }
            .instrument(span.clone()),
        );

        let pipeline = self.pipeline.clone();
        tasks.spawn(async move { pipeline.drain(signature_rx, event_tx).await }.instrument(span.clone()));

        tasks.spawn(relay(event_rx, publisher.clone()).instrument(span.clone()));

        let fault = match tasks.join_next().await {
            Some(Ok(fault)) => fault,
            Some(Err(e)) => join_fault(e),
            None => PipelineError::Cancelled,
        };
        tasks.shutdown().await;
        fault
    }
}

/// Move events from a generation's output queue to the publisher channel.
async fn relay(mut events: EventReceiver, publisher: EventSender) -> PipelineError {
    loop {
        tokio::select! {
            _ = publisher.closed() => return PipelineError::PublisherClosed,
            event = events.recv() => match event {
                Some(event) => {
                    if publisher.send(event).is_err() {
                        return PipelineError::PublisherClosed;
                    }
                }
                None => return PipelineError::OutputQueueClosed,
            },
        }
    }
}

fn join_fault(error: JoinError) -> PipelineError {
    if error.is_panic() {
        PipelineError::Panicked(panic_message(error.into_panic()))
    } else {
        PipelineError::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
