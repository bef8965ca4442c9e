//! Pending deposit sessions, keyed by transaction group id.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hv_ledger::txn::{GroupId, Transaction};
use hv_types::{Address, Amount, Note};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a deposit session already exists for this group")]
    AlreadyExists,
    #[error("deposit session not found or expired")]
    NotFound,
}

/// A prepared deposit waiting for the depositor's signature.
#[derive(Clone, Debug)]
pub struct DepositData {
    pub amount: Amount,
    pub address: Address,
    pub note: Note,
    pub txns: Vec<Transaction>,
    pub group_id: GroupId,
    pub watch_txid: String,
    pub index_to_sign: usize,
}

struct SessionEntry {
    data: DepositData,
    created_at: Instant,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

pub struct SessionStore {
    entries: DashMap<GroupId, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self, data: DepositData) -> Result<GroupId, SessionError> {
        let key = data.group_id;
        let entry = SessionEntry {
            data,
            created_at: Instant::now(),
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(self.ttl) {
                    return Err(SessionError::AlreadyExists);
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(key)
    }

    pub fn retrieve(&self, key: &GroupId) -> Result<DepositData, SessionError> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Ok(entry.data.clone()),
            _ => Err(SessionError::NotFound),
        }
    }

    /// Remove and return the session. Concurrent callers get at most one
    /// success.
    pub fn take(&self, key: &GroupId) -> Result<DepositData, SessionError> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(self.ttl) => Ok(entry.data),
            _ => Err(SessionError::NotFound),
        }
    }

    pub fn delete(&self, key: &GroupId) {
        self.entries.remove(key);
    }

    /// Evict expired sessions, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(self.ttl);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
