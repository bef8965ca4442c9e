// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! The node surface the pool needs, as a trait.

use async_trait::async_trait;
use hv_types::Address;

use crate::error::LedgerError;

/// Parameters a new transaction must carry to be valid on the current chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Suggested per-transaction fee.
    pub fee: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

impl ChainParams {
    /// Per-transaction base fee: the larger of suggested and minimum.
    pub fn base_fee(&self) -> u64 {
        self.fee.max(self.min_fee)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingTransaction {
    pub confirmed_round: Option<u64>,
    /// Non-empty when the node evicted the transaction from its pool.
    pub pool_error: String,
    pub logs: Vec<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub last_round: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub amount: u64,
    pub min_balance: u64,
}

impl AccountInfo {
    pub fn spendable(&self) -> u64 {
        self.amount.saturating_sub(self.min_balance)
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn suggested_params(&self) -> Result<ChainParams, LedgerError>;

    /// Submit an encoded signed group. Returns the id the node reports.
    async fn submit_raw_transaction(&self, group: &[u8]) -> Result<String, LedgerError>;

    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, LedgerError>;

    async fn status(&self) -> Result<NodeStatus, LedgerError>;

    /// Block until the node has seen a round after `round`.
    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, LedgerError>;

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, LedgerError>;
}
