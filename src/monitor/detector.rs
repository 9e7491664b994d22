//! Balance-diff classification of transactions as token buys.
//!
//! A transaction is a buy for a wallet when one of the wallet's post-transaction token
//! balances is strictly larger than its pre-transaction balance for the same mint.
//! Balances absent from the pre list count as zero (a freshly created token account).

use crate::monitor::error::ClassificationError;
use crate::monitor::types::{
    BuyCandidate, Lenient, RpcTokenBalance, RpcTransaction, TokenBalanceSnapshot,
};
use std::collections::HashMap;
use tracing::{debug, warn, Span};

/// Classifies resolved transactions for one monitored wallet.
#[derive(Debug, Clone)]
pub struct BuyDetector {
    wallet: String,
    span: Span,
}

impl BuyDetector {
    /// Create a detector for `wallet`, logging under `span`.
    pub fn new(wallet: impl Into<String>, span: Span) -> Self {
        Self {
            wallet: wallet.into(),
            span,
        }
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    /// Report the first qualifying balance increase, in post-balance order.
    ///
    /// Malformed balance data is logged and reported as "no buy".
    pub fn detect(&self, transaction: &RpcTransaction) -> Option<BuyCandidate> {
        let _entered = self.span.enter();
        match token_snapshots(transaction) {
            Ok((pre, post)) => detect_buy(&pre, &post, &self.wallet),
            Err(e) => {
                warn!(error = %e, "token buy detection failed");
                None
            }
        }
    }

    /// Report every qualifying balance increase, in post-balance order.
    pub fn detect_all(&self, transaction: &RpcTransaction) -> Vec<BuyCandidate> {
        let _entered = self.span.enter();
        match token_snapshots(transaction) {
            Ok((pre, post)) => detect_all_buys(&pre, &post, &self.wallet),
            Err(e) => {
                warn!(error = %e, "token buy detection failed");
                Vec::new()
            }
        }
    }
}

/// Validate the pre and post token balance lists of a transaction.
///
/// A missing list is treated as empty; a missing `meta` section is an error.
pub fn token_snapshots(
    transaction: &RpcTransaction,
) -> Result<(Vec<TokenBalanceSnapshot>, Vec<TokenBalanceSnapshot>), ClassificationError> {
    let meta = transaction
        .meta
        .as_ref()
        .ok_or(ClassificationError::MissingMeta)?;

    let pre = validate_list("pre", meta.pre_token_balances.as_deref().unwrap_or_default())?;
    let post = validate_list("post", meta.post_token_balances.as_deref().unwrap_or_default())?;
    Ok((pre, post))
}

fn validate_list(
    list: &'static str,
    balances: &[Lenient<RpcTokenBalance>],
) -> Result<Vec<TokenBalanceSnapshot>, ClassificationError> {
    balances
        .iter()
        .enumerate()
        .map(|(index, balance)| {
            let balance = balance
                .valid()
                .map_err(|raw| ClassificationError::MalformedRecord {
                    list,
                    index,
                    value: raw.to_string(),
                })?;
            validate_balance(list, index, balance)
        })
        .collect()
}

fn validate_balance(
    list: &'static str,
    index: usize,
    balance: &RpcTokenBalance,
) -> Result<TokenBalanceSnapshot, ClassificationError> {
    // Present and of the expected type, or the matching classification error
    fn typed<'a, T>(
        list: &'static str,
        index: usize,
        name: &'static str,
        value: &'a Option<Lenient<T>>,
    ) -> Result<Option<&'a T>, ClassificationError> {
        match value {
            None => Ok(None),
            Some(value) => value.valid().map(Some).map_err(|raw| {
                ClassificationError::InvalidField {
                    list,
                    index,
                    field: name,
                    value: raw.to_string(),
                }
            }),
        }
    }
    let missing = |field| ClassificationError::MissingField { list, index, field };

    let mint = typed(list, index, "mint", &balance.mint)?.ok_or_else(|| missing("mint"))?;
    let owner = typed(list, index, "owner", &balance.owner)?.ok_or_else(|| missing("owner"))?;
    let amount = typed(list, index, "uiTokenAmount", &balance.ui_token_amount)?
        .ok_or_else(|| missing("uiTokenAmount"))?;
    let decimals = *typed(list, index, "decimals", &amount.decimals)?
        .ok_or_else(|| missing("decimals"))?;
    let ui_amount = typed(list, index, "uiAmount", &amount.ui_amount)?.copied();
    let ui_amount_string = typed(list, index, "uiAmountString", &amount.ui_amount_string)?;

    // uiAmount is null for zero balances on some nodes; uiAmountString is always set
    let ui_amount = match (ui_amount, ui_amount_string) {
        (Some(value), _) => value,
        (None, Some(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ClassificationError::BadAmount {
                list,
                index,
                value: text.to_string(),
            })?,
        (None, None) => return Err(missing("uiAmount")),
    };
    if !ui_amount.is_finite() {
        return Err(ClassificationError::BadAmount {
            list,
            index,
            value: ui_amount.to_string(),
        });
    }

    Ok(TokenBalanceSnapshot {
        mint: mint.clone(),
        owner: owner.clone(),
        ui_amount,
        decimals,
    })
}

/// First-match buy detection over validated snapshots.
pub fn detect_buy(
    pre: &[TokenBalanceSnapshot],
    post: &[TokenBalanceSnapshot],
    wallet: &str,
) -> Option<BuyCandidate> {
    scan(pre, post, wallet).next()
}

/// Enumerate every buy over validated snapshots.
pub fn detect_all_buys(
    pre: &[TokenBalanceSnapshot],
    post: &[TokenBalanceSnapshot],
    wallet: &str,
) -> Vec<BuyCandidate> {
    scan(pre, post, wallet).collect()
}

fn scan<'a>(
    pre: &'a [TokenBalanceSnapshot],
    post: &'a [TokenBalanceSnapshot],
    wallet: &'a str,
) -> impl Iterator<Item = BuyCandidate> + 'a {
    // Later duplicates win, matching the order balances are reported in
    let pre_amounts: HashMap<(&str, &str), f64> = pre
        .iter()
        .map(|b| ((b.mint.as_str(), b.owner.as_str()), b.ui_amount))
        .collect();

    post.iter()
        .filter(move |b| b.owner == wallet)
        .filter_map(move |b| {
            let previous = pre_amounts
                .get(&(b.mint.as_str(), wallet))
                .copied()
                .unwrap_or(0.0);
            if b.ui_amount > previous {
                debug!(mint = %b.mint, previous, current = b.ui_amount, "balance increase");
                Some(BuyCandidate {
                    buyer: wallet.to_string(),
                    mint: b.mint.clone(),
                    amount_received: b.ui_amount - previous,
                    final_balance: b.ui_amount,
                    previous_balance: previous,
                    decimals: b.decimals,
                })
            } else {
                None
            }
        })
}
