// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! Submission and confirmation tracking.
//!
//! A submitted group ends in exactly one of the [`TxnConfirmationError`]
//! variants or in a [`Confirmation`]. Only [`TxnConfirmationError::WaitTimeout`]
//! is ambiguous: the group may still be included later.

use crate::abi::decode_return;
use crate::client::{LedgerClient, PendingTransaction};
use crate::error::LedgerError;
use crate::txn::{encode_group, SignedTransaction};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub txn_id: String,
    pub confirmed_round: u64,
    pub leaf_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxnConfirmationError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("overspend: {0}")]
    OverSpend(String),
    #[error("balance below minimum: {0}")]
    MinBalance(String),
    #[error("transaction expired: {0}")]
    Expired(String),
    #[error("not confirmed in time: {0}")]
    WaitTimeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TxnConfirmationError {
    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout(_))
    }

    pub fn cause(&self) -> &str {
        match self {
            Self::Rejected(c)
            | Self::OverSpend(c)
            | Self::MinBalance(c)
            | Self::Expired(c)
            | Self::WaitTimeout(c)
            | Self::Internal(c) => c,
        }
    }

    /// Map a node-side failure onto a terminal outcome.
    pub fn classify(err: &LedgerError) -> Self {
        match err {
            LedgerError::Api { status, message } => {
                classify_message(message).unwrap_or_else(|| {
                    if *status == 400 {
                        Self::Rejected(message.clone())
                    } else {
                        Self::Internal(err.to_string())
                    }
                })
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

fn classify_message(message: &str) -> Option<TxnConfirmationError> {
    let lower = message.to_lowercase();
    let cause = message.to_string();
    if lower.contains("overspend") {
        Some(TxnConfirmationError::OverSpend(cause))
    } else if lower.contains("balance")
        && (lower.contains("below min") || lower.contains("min balance"))
    {
        Some(TxnConfirmationError::MinBalance(cause))
    } else if lower.contains("txn dead") || lower.contains("round outside") {
        Some(TxnConfirmationError::Expired(cause))
    } else {
        None
    }
}

/// Poll until `txid` is confirmed, rejected, or `max_rounds` rounds pass.
pub async fn wait_for_confirmation(
    client: &dyn LedgerClient,
    txid: &str,
    max_rounds: u64,
) -> Result<(u64, PendingTransaction), TxnConfirmationError> {
    let status = client
        .status()
        .await
        .map_err(|e| TxnConfirmationError::classify(&e))?;
    let start = status.last_round;
    let deadline = start.saturating_add(max_rounds);
    let mut current = start;

    while current < deadline {
        let pending = match client.pending_transaction(txid).await {
            Ok(p) => Some(p),
            // not yet visible to the node
            Err(LedgerError::Api { status: 404, .. }) => None,
            Err(e) => return Err(TxnConfirmationError::classify(&e)),
        };
        if let Some(pending) = pending {
            if let Some(round) = pending.confirmed_round {
                return Ok((round, pending));
            }
            if !pending.pool_error.is_empty() {
                return Err(classify_message(&pending.pool_error)
                    .unwrap_or(TxnConfirmationError::Rejected(pending.pool_error)));
            }
        }
        let status = client
            .status_after_block(current)
            .await
            .map_err(|e| TxnConfirmationError::classify(&e))?;
        current = status.last_round.max(current + 1);
    }

    Err(TxnConfirmationError::WaitTimeout(format!(
        "{txid} not confirmed after {max_rounds} rounds"
    )))
}

/// Submit `group`, wait for it, and read the leaf index the pool program
/// logged from the `watch_txid` transaction.
pub async fn send_group(
    client: &dyn LedgerClient,
    group: &[SignedTransaction],
    watch_txid: &str,
    wait_rounds: u64,
) -> Result<Confirmation, TxnConfirmationError> {
    let raw = encode_group(group).map_err(|e| TxnConfirmationError::Internal(e.to_string()))?;
    let submitted = client
        .submit_raw_transaction(&raw)
        .await
        .map_err(|e| TxnConfirmationError::classify(&e))?;
    tracing::info!(txid = %watch_txid, submitted = %submitted, "group submitted");

    let (round, pending) = wait_for_confirmation(client, watch_txid, wait_rounds).await?;
    let leaf_index = leaf_index_from_logs(&pending.logs).ok_or_else(|| {
        TxnConfirmationError::Internal(format!("{watch_txid}: no leaf index in return log"))
    })?;
    tracing::info!(txid = %watch_txid, round, leaf_index, "group confirmed");

    Ok(Confirmation {
        txn_id: watch_txid.to_string(),
        confirmed_round: round,
        leaf_index,
    })
}

/// The last logged `(uint64,byte[32])` return value carries the leaf index.
pub fn leaf_index_from_logs(logs: &[Vec<u8>]) -> Option<u64> {
    logs.iter()
        .rev()
        .find_map(|l| decode_return(l))
        .map(|(leaf_index, _root)| leaf_index)
}
