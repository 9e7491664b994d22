//! wallet-watch - Solana wallet buy monitor
//!
//! Subscribes to the transaction logs of a set of wallets, resolves every notified
//! transaction, classifies token balance increases as buys and publishes them,
//! enriched with token metadata.

pub mod types;
pub mod monitor;
pub mod config;
pub mod inputs;
pub mod publisher;
pub mod telemetry;

// Re-export main types for convenience
pub use types::{BuyEvent, TransactionSignature, WalletAddress};
pub use monitor::{Monitor, MonitorBuilder, MonitorConfig};
