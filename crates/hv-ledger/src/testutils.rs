// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! Scripted in-memory ledger for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hv_types::Address;

use crate::client::{AccountInfo, ChainParams, LedgerClient, NodeStatus, PendingTransaction};
use crate::abi::encode_return;
use crate::error::LedgerError;
use crate::txn::{decode_group, SignedTransaction};

/// What the mock does with the next submitted group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Include the group `after_rounds` rounds after submission.
    Confirm { after_rounds: u64 },
    /// Refuse the submission with a 400 carrying this message.
    Reject(String),
    /// Accept, then evict from the pool with this message.
    PoolError(String),
    NeverConfirm,
    TransportFailure,
}

struct PendingEntry {
    submitted_round: u64,
    behavior: SubmitBehavior,
    leaf_index: u64,
}

struct MockState {
    round: u64,
    behavior: SubmitBehavior,
    next_leaf: u64,
    params: ChainParams,
    submitted: Vec<Vec<SignedTransaction>>,
    pending: HashMap<String, PendingEntry>,
    accounts: HashMap<Address, AccountInfo>,
}

pub struct MockLedger {
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                round: 1_000,
                behavior: SubmitBehavior::Confirm { after_rounds: 1 },
                next_leaf: 0,
                params: ChainParams {
                    fee: 0,
                    min_fee: hv_types::MIN_TXN_FEE,
                    first_valid: 1_000,
                    last_valid: 2_000,
                    genesis_id: "mocknet-v1".into(),
                    genesis_hash: [0x11; 32],
                },
                submitted: Vec::new(),
                pending: HashMap::new(),
                accounts: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_behavior(&self, behavior: SubmitBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn set_next_leaf(&self, leaf: u64) {
        self.lock().next_leaf = leaf;
    }

    pub fn set_params(&self, params: ChainParams) {
        self.lock().params = params;
    }

    pub fn set_account(&self, address: Address, info: AccountInfo) {
        self.lock().accounts.insert(address, info);
    }

    pub fn round(&self) -> u64 {
        self.lock().round
    }

    /// Every group accepted by `submit_raw_transaction`, in order.
    pub fn submitted(&self) -> Vec<Vec<SignedTransaction>> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn suggested_params(&self) -> Result<ChainParams, LedgerError> {
        Ok(self.lock().params.clone())
    }

    async fn submit_raw_transaction(&self, group: &[u8]) -> Result<String, LedgerError> {
        let decoded = decode_group(group)?;
        let first = decoded
            .first()
            .ok_or_else(|| LedgerError::Decode("empty group".into()))?;
        let txid = first.txn.id()?;

        let mut state = self.lock();
        match state.behavior.clone() {
            SubmitBehavior::Reject(message) => {
                return Err(LedgerError::Api {
                    status: 400,
                    message,
                })
            }
            SubmitBehavior::TransportFailure => {
                return Err(LedgerError::Transport("connection refused".into()))
            }
            behavior => {
                let leaf_index = state.next_leaf;
                state.next_leaf += 1;
                let submitted_round = state.round;
                state.pending.insert(
                    txid.clone(),
                    PendingEntry {
                        submitted_round,
                        behavior,
                        leaf_index,
                    },
                );
            }
        }
        state.submitted.push(decoded);
        Ok(txid)
    }

    async fn pending_transaction(&self, txid: &str) -> Result<PendingTransaction, LedgerError> {
        let state = self.lock();
        let entry = state.pending.get(txid).ok_or_else(|| LedgerError::Api {
            status: 404,
            message: format!("{txid} not found"),
        })?;
        let pending = match &entry.behavior {
            SubmitBehavior::Confirm { after_rounds }
                if state.round >= entry.submitted_round + after_rounds =>
            {
                PendingTransaction {
                    confirmed_round: Some(entry.submitted_round + after_rounds),
                    pool_error: String::new(),
                    logs: vec![encode_return(entry.leaf_index, &[0u8; 32])],
                }
            }
            SubmitBehavior::PoolError(message) => PendingTransaction {
                pool_error: message.clone(),
                ..PendingTransaction::default()
            },
            _ => PendingTransaction::default(),
        };
        Ok(pending)
    }

    async fn status(&self) -> Result<NodeStatus, LedgerError> {
        Ok(NodeStatus {
            last_round: self.lock().round,
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, LedgerError> {
        let mut state = self.lock();
        state.round = state.round.max(round + 1);
        Ok(NodeStatus {
            last_round: state.round,
        })
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfo, LedgerError> {
        self.lock()
            .accounts
            .get(address)
            .copied()
            .ok_or_else(|| LedgerError::Api {
                status: 404,
                message: format!("account {address} not found"),
            })
    }
}
