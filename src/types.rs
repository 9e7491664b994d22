//! Core types shared by the wallet-watch pipeline and its publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A wallet public key in its base58 string form
pub type WalletAddress = String;

/// A transaction signature in its base58 string form
pub type TransactionSignature = String;

/// A token purchase observed for a monitored wallet, enriched with display metadata.
///
/// Only constructed by [`BuyEvent::new`] once metadata resolution succeeded, so a
/// published event always carries a name and a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyEvent {
    /// The monitored wallet that received the tokens
    pub buyer: WalletAddress,
    /// The mint address of the received token
    pub mint: String,
    /// `final_balance - previous_balance`, always positive
    pub amount_received: f64,
    /// UI balance after the transaction
    pub final_balance: f64,
    /// UI balance before the transaction (0 if the account did not exist)
    pub previous_balance: f64,
    /// Token decimals
    pub decimals: u8,
    /// Display name from the metadata service
    pub token_name: String,
    /// Display symbol from the metadata service
    pub token_symbol: String,
    /// The transaction that produced the balance increase
    pub signature: TransactionSignature,
    /// When the pipeline finished building the event
    pub detected_at: DateTime<Utc>,
}

impl BuyEvent {
    /// Build an event from a detected candidate and its resolved metadata.
    pub fn new(
        candidate: crate::monitor::BuyCandidate,
        metadata: crate::monitor::TokenMetadata,
        signature: TransactionSignature,
    ) -> Self {
        Self {
            buyer: candidate.buyer,
            mint: candidate.mint,
            amount_received: candidate.amount_received,
            final_balance: candidate.final_balance,
            previous_balance: candidate.previous_balance,
            decimals: candidate.decimals,
            token_name: metadata.name,
            token_symbol: metadata.symbol,
            signature,
            detected_at: Utc::now(),
        }
    }
}
