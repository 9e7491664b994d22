//! Per-signature processing: fetch, classify, enrich.

use crate::monitor::detector::BuyDetector;
use crate::monitor::enricher::MetadataEnricher;
use crate::monitor::error::PipelineError;
use crate::monitor::fetcher::TransactionFetcher;
use crate::monitor::types::{EventSender, FetchOutcome, SignatureReceiver};
use crate::types::BuyEvent;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Span};

/// The processing half of a wallet pipeline.
///
/// Stateless across signatures apart from the metadata cache, so one instance serves
/// every generation of a supervisor.
pub struct BuyPipeline {
    fetcher: TransactionFetcher,
    detector: BuyDetector,
    enricher: Arc<MetadataEnricher>,
    report_all_buys: bool,
    span: Span,
}

impl BuyPipeline {
    pub fn new(
        fetcher: TransactionFetcher,
        detector: BuyDetector,
        enricher: Arc<MetadataEnricher>,
        report_all_buys: bool,
        span: Span,
    ) -> Self {
        Self {
            fetcher,
            detector,
            enricher,
            report_all_buys,
            span,
        }
    }

    pub fn wallet(&self) -> &str {
        self.detector.wallet()
    }

    /// Turn one signature into the buy events it produced.
    ///
    /// Unresolvable signatures, non-buys and candidates without metadata yield nothing.
    #[instrument(parent = &self.span, skip(self, signature), fields(signature = %signature))]
    pub async fn process(&self, signature: &str) -> Vec<BuyEvent> {
        let resolved = match self.fetcher.fetch(signature).await {
            Ok(FetchOutcome::Resolved(resolved)) => resolved,
            Ok(FetchOutcome::NotConfirmed) => return Vec::new(),
            Err(e) => {
                error!(error = %e, "failed to resolve transaction");
                return Vec::new();
            }
        };

        let candidates = if self.report_all_buys {
            self.detector.detect_all(&resolved.transaction)
        } else {
            self.detector.detect(&resolved.transaction).into_iter().collect()
        };
        if candidates.is_empty() {
            debug!("no token buy in transaction");
            return Vec::new();
        }

        let mut events = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.enricher.enrich(&candidate.mint).await {
                Ok(metadata) => {
                    info!(
                        mint = %candidate.mint,
                        amount = candidate.amount_received,
                        symbol = %metadata.symbol,
                        "token buy detected"
                    );
                    events.push(BuyEvent::new(candidate, metadata, signature.to_string()));
                }
                Err(e) => {
                    warn!(mint = %candidate.mint, error = %e, "metadata lookup failed, dropping buy");
                }
            }
        }
        events
    }

    /// Process queued signatures in arrival order until a queue closes.
    pub async fn drain(&self, mut signatures: SignatureReceiver, events: EventSender) -> PipelineError {
        while let Some(signature) = signatures.recv().await {
            for event in self.process(&signature).await {
                if events.send(event).is_err() {
                    return PipelineError::OutputQueueClosed;
                }
            }
        }
        PipelineError::SignatureQueueClosed
    }
}
