//! Deposit and withdrawal orchestration.
//!
//! Every flow validates its input before touching state. Once a group is
//! submitted, the matching unconfirmed-note record is owned by an
//! [`UnconfirmedNoteGuard`], which decides on every exit path whether the
//! record can go or must stay for the cleanup sweep.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use hv_ledger::builder::TxnBuilder;
use hv_ledger::confirm::send_group;
use hv_ledger::txn::{GroupId, SignedTransaction, Transaction};
use hv_ledger::{LedgerClient, TxnConfirmationError};
use hv_mimc::{fr_to_word, Word};
use hv_types::{Address, Amount, Note, NoteError, WithdrawalData};
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::db::{Db, DbError, Stats};
use crate::error::ServiceError;
use crate::memstore::{DepositData, SessionStore};
use crate::tree::SparseMerkleTree;

/// Everything the depositor needs to sign and later confirm a deposit.
#[derive(Clone, Debug, Serialize)]
pub struct DepositTicket {
    pub group_id: GroupId,
    pub amount: Amount,
    /// Base64 of each unsigned transaction's canonical msgpack encoding.
    pub txns: Vec<String>,
    pub index_to_sign: usize,
    /// Bearer secret for the new note. Shown once, never stored.
    pub note_text: String,
}

pub struct ConfirmDeposit {
    pub amount: u64,
    pub address: Address,
    pub note_text: String,
    /// Base64 of the depositor's signed payment.
    pub signed_txn: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DepositReceipt {
    pub txn_id: String,
    pub leaf_index: u64,
    pub amount: Amount,
}

pub struct ConfirmWithdrawal {
    pub amount: u64,
    pub address: Address,
    pub note_text: String,
    pub change_note_text: String,
    /// Opaque proof from an external prover.
    pub proof: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalReceipt {
    pub txn_id: String,
    pub amount: Amount,
    pub fee: Amount,
    pub change_amount: Amount,
    pub change_leaf_index: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct MerkleWitness {
    pub leaf_index: u64,
    #[serde(serialize_with = "hex_word")]
    pub root: Word,
    #[serde(serialize_with = "hex_words")]
    pub siblings: Vec<Word>,
    pub indices: Vec<bool>,
}

/// Deletes the unconfirmed-note record on drop, unless the outcome left
/// the note's fate unknown.
pub struct UnconfirmedNoteGuard {
    db: Arc<Db>,
    id: i64,
    delete: bool,
}

impl UnconfirmedNoteGuard {
    pub fn new(db: Arc<Db>, id: i64) -> Self {
        Self {
            db,
            id,
            delete: false,
        }
    }

    /// `Ok(saved)` for a confirmed group, `Err` for a failed one.
    pub fn record_outcome(&mut self, outcome: &Result<bool, TxnConfirmationError>) {
        self.delete = should_delete_unconfirmed(outcome);
    }
}

impl Drop for UnconfirmedNoteGuard {
    fn drop(&mut self) {
        if self.delete {
            self.db.delete_unconfirmed(self.id);
        } else {
            tracing::info!(id = self.id, "unconfirmed note retained for the cleanup sweep");
        }
    }
}

/// Delete when confirmed and saved, or when the group definitely failed.
pub fn should_delete_unconfirmed(outcome: &Result<bool, TxnConfirmationError>) -> bool {
    match outcome {
        Ok(saved) => *saved,
        Err(e) => !e.is_wait_timeout(),
    }
}

pub struct Service {
    client: Arc<dyn LedgerClient>,
    db: Arc<Db>,
    sessions: Arc<SessionStore>,
    config: Arc<ServiceConfig>,
    builder: TxnBuilder,
}

impl Service {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        db: Arc<Db>,
        sessions: Arc<SessionStore>,
        config: Arc<ServiceConfig>,
        builder: TxnBuilder,
    ) -> Self {
        Self {
            client,
            db,
            sessions,
            config,
            builder,
        }
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Deposit
    // -----------------------------------------------------------------------

    pub async fn prepare_deposit(
        &self,
        amount: u64,
        address: Address,
    ) -> Result<DepositTicket, ServiceError> {
        let minimum = self.builder.config().deposit_minimum;
        if amount < minimum {
            return Err(hv_ledger::BuildError::BelowMinimumDeposit { amount, minimum }.into());
        }

        let mut note = Note::generate(amount).map_err(note_error)?;
        let params = self.client.suggested_params().await?;
        let group = self
            .builder
            .build_deposit_group(amount, &address, &note, &params)?;
        note.txn_id = Some(group.watch_txid.clone());
        let note_text = note.text();
        let encoded = group
            .txns
            .iter()
            .map(encode_txn)
            .collect::<Result<Vec<_>, _>>()?;

        let group_id = self.sessions.store(DepositData {
            amount: Amount::new(amount),
            address,
            note,
            txns: group.txns,
            group_id: group.group_id,
            watch_txid: group.watch_txid,
            index_to_sign: group.index_to_sign,
        })?;
        tracing::debug!(group = %group_id, amount, "deposit prepared");

        Ok(DepositTicket {
            group_id,
            amount: Amount::new(amount),
            txns: encoded,
            index_to_sign: group.index_to_sign,
            note_text,
        })
    }

    pub async fn confirm_deposit(
        &self,
        form: ConfirmDeposit,
    ) -> Result<DepositReceipt, ServiceError> {
        let signed = decode_signed_txn(&form.signed_txn)?;
        let group_id = signed
            .txn
            .group
            .ok_or_else(|| ServiceError::BadRequest("signed transaction has no group".into()))?;
        let data = self.sessions.take(&group_id)?;

        let form_note = Note::from_text(&form.note_text)
            .map_err(|_| ServiceError::Validation("invalid note".into()))?;
        if form.amount != data.amount.units
            || form.address != data.address
            || form_note.text() != data.note.text()
        {
            tracing::warn!(
                group = %group_id,
                form_amount = form.amount,
                stored_amount = data.amount.units,
                "deposit form does not match the prepared deposit"
            );
            return Err(ServiceError::Validation(
                "deposit data does not match the prepared deposit".into(),
            ));
        }
        let group = self.builder.authorize_deposit(&data.txns, signed)?;

        let mut note = data.note;
        let id = self.db.register_unconfirmed(&note)?;
        let mut guard = UnconfirmedNoteGuard::new(self.db.clone(), id);

        let sent = send_group(
            self.client.as_ref(),
            &group,
            &data.watch_txid,
            self.config.wait_rounds,
        )
        .await;
        let confirmation = match sent {
            Ok(c) => c,
            Err(error) => {
                guard.record_outcome(&Err(error.clone()));
                tracing::warn!(group = %group_id, error = %error, "deposit not confirmed");
                let max_amount = match error {
                    TxnConfirmationError::OverSpend(_) | TxnConfirmationError::MinBalance(_) => {
                        self.max_deposit(&data.address).await.ok()
                    }
                    _ => None,
                };
                return Err(ServiceError::Confirmation { error, max_amount });
            }
        };

        note.leaf_index = confirmation.leaf_index;
        if note.txn_id.as_deref() != Some(confirmation.txn_id.as_str()) {
            tracing::warn!(expected = ?note.txn_id, got = %confirmation.txn_id, "deposit txn id mismatch");
        }
        let saved = self.db.save_note(&note);
        guard.record_outcome(&Ok(saved.is_ok()));
        if let Err(e) = &saved {
            // the deposit is on-chain; the sweep will promote the record
            tracing::error!(leaf_index = confirmation.leaf_index, error = %e, "failed to save deposit note");
        }
        tracing::info!(
            leaf_index = confirmation.leaf_index,
            amount = data.amount.units,
            address = %data.address,
            "deposit confirmed"
        );

        Ok(DepositReceipt {
            txn_id: confirmation.txn_id,
            leaf_index: confirmation.leaf_index,
            amount: data.amount,
        })
    }

    /// Largest deposit `address` can currently afford.
    pub async fn max_deposit(&self, address: &Address) -> Result<Amount, ServiceError> {
        let account = self.client.account_info(address).await?;
        let params = self.client.suggested_params().await?;
        Ok(Amount::new(self.builder.max_deposit(&account, &params)))
    }

    // -----------------------------------------------------------------------
    // Withdrawal
    // -----------------------------------------------------------------------

    pub fn prepare_withdrawal(
        &self,
        amount: u64,
        address: Address,
        note_text: &str,
    ) -> Result<WithdrawalData, ServiceError> {
        if amount == 0 {
            return Err(ServiceError::Validation("withdrawal amount must be positive".into()));
        }
        let note = self.confirmed_note(note_text)?;
        let max_withdrawal = note.max_withdrawal_amount(&self.config.fee_policy);
        WithdrawalData::new(amount, address, note, &self.config.fee_policy)
            .map_err(|e| withdrawal_error(e, max_withdrawal))
    }

    pub async fn confirm_withdrawal(
        &self,
        form: ConfirmWithdrawal,
    ) -> Result<WithdrawalReceipt, ServiceError> {
        if form.amount == 0 {
            return Err(ServiceError::Validation("withdrawal amount must be positive".into()));
        }
        let from_note = self.confirmed_note(&form.note_text)?;
        let change_note = Note::from_text(&form.change_note_text)
            .map_err(|_| ServiceError::Validation("invalid change note".into()))?;
        let max_withdrawal = from_note.max_withdrawal_amount(&self.config.fee_policy);
        let data = WithdrawalData::with_change_note(
            form.amount,
            form.address,
            from_note,
            change_note,
            &self.config.fee_policy,
        )
        .map_err(|e| withdrawal_error(e, max_withdrawal))?;

        let root = self.verified_root()?;
        let params = self.client.suggested_params().await?;
        let group = self
            .builder
            .build_withdrawal_group(&data, &root, &form.proof, &params)?;
        let signed = self.builder.authorize_program(&group.txns);

        let mut change = data.change_note.clone();
        change.txn_id = Some(group.watch_txid.clone());
        let id = self.db.register_unconfirmed(&change)?;
        let mut guard = UnconfirmedNoteGuard::new(self.db.clone(), id);

        let sent = send_group(
            self.client.as_ref(),
            &signed,
            &group.watch_txid,
            self.config.wait_rounds,
        )
        .await;
        let confirmation = match sent {
            Ok(c) => c,
            Err(error) => {
                guard.record_outcome(&Err(error.clone()));
                tracing::warn!(txid = %group.watch_txid, error = %error, "withdrawal not confirmed");
                return Err(error.into());
            }
        };

        change.leaf_index = confirmation.leaf_index;
        let saved = self.db.save_note(&change);
        guard.record_outcome(&Ok(saved.is_ok()));
        if let Err(e) = &saved {
            tracing::error!(leaf_index = confirmation.leaf_index, error = %e, "failed to save change note");
        }
        tracing::info!(
            leaf_index = confirmation.leaf_index,
            amount = data.amount.units,
            address = %data.address,
            "withdrawal confirmed"
        );

        Ok(WithdrawalReceipt {
            txn_id: confirmation.txn_id,
            amount: data.amount.clone(),
            fee: data.fee.clone(),
            change_amount: Amount::new(change.amount),
            change_leaf_index: confirmation.leaf_index,
        })
    }

    // -----------------------------------------------------------------------
    // Pool state
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> Result<Stats, ServiceError> {
        Ok(self.db.stats()?)
    }

    pub fn root(&self) -> Result<(Word, u64), ServiceError> {
        Ok(self.db.current_root()?)
    }

    /// Authentication path for `leaf_index` against the current tree.
    pub fn merkle_witness(&self, leaf_index: u64) -> Result<MerkleWitness, ServiceError> {
        let tree = SparseMerkleTree::from_commitments(&self.db.all_commitments()?);
        let path = tree
            .proof(leaf_index as usize)
            .ok_or_else(|| ServiceError::Validation(format!("leaf index {leaf_index} out of range")))?;
        Ok(MerkleWitness {
            leaf_index,
            root: tree.root_word(),
            siblings: path.siblings.iter().map(fr_to_word).collect(),
            indices: path.indices,
        })
    }

    /// Parse `text` and attach the leaf index and txn id recorded on-chain.
    fn confirmed_note(&self, text: &str) -> Result<Note, ServiceError> {
        let mut note = Note::from_text(text).map_err(|_| ServiceError::InvalidNote)?;
        let commitment = hv_mimc::commitment(&note);
        match self.db.txn_by_commitment(&commitment) {
            Ok((leaf_index, txn_id)) => {
                note.leaf_index = leaf_index;
                note.txn_id = Some(txn_id);
                Ok(note)
            }
            Err(DbError::NotFound) => {
                tracing::debug!(commitment = %hex::encode(commitment), "no leaf for commitment");
                Err(ServiceError::InvalidNote)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Root of the tree rebuilt from the recorded leaves, checked against the
    /// root the subscriber last wrote.
    fn verified_root(&self) -> Result<Word, ServiceError> {
        let commitments = self.db.all_commitments()?;
        let computed = SparseMerkleTree::from_commitments(&commitments).root_word();
        let (stored, leaf_count) = match self.db.current_root() {
            Ok(r) => r,
            Err(DbError::NotFound) => {
                return Err(ServiceError::Internal("pool root not available yet".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if stored != computed || leaf_count != commitments.len() as u64 {
            return Err(ServiceError::Internal(format!(
                "root mismatch: stored {} over {leaf_count} leaves, computed {} over {}",
                hex::encode(stored),
                hex::encode(computed),
                commitments.len()
            )));
        }
        Ok(computed)
    }
}

pub fn decode_signed_txn(b64: &str) -> Result<SignedTransaction, ServiceError> {
    let bytes = B64
        .decode(b64.trim())
        .map_err(|_| ServiceError::BadRequest("the signed transaction is malformed".into()))?;
    SignedTransaction::decode(&bytes)
        .map_err(|_| ServiceError::BadRequest("the signed transaction is malformed".into()))
}

pub fn encode_txn(txn: &Transaction) -> Result<String, ServiceError> {
    let bytes = txn
        .encode()
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    Ok(B64.encode(bytes))
}

pub fn encode_signed_txn(signed: &SignedTransaction) -> Result<String, ServiceError> {
    let bytes = signed
        .encode()
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    Ok(B64.encode(bytes))
}

fn note_error(e: NoteError) -> ServiceError {
    match e {
        NoteError::Malformed(_) => ServiceError::InvalidNote,
        other => ServiceError::Internal(other.to_string()),
    }
}

fn withdrawal_error(e: NoteError, max_withdrawal: Amount) -> ServiceError {
    match e {
        NoteError::InsufficientNoteAmount { .. } => ServiceError::NoteTooSmall { max_withdrawal },
        NoteError::Malformed(reason) => ServiceError::Validation(reason),
        NoteError::Overflow => ServiceError::Validation("amount overflows".into()),
        other => ServiceError::Internal(other.to_string()),
    }
}

fn hex_word<S: serde::Serializer>(word: &Word, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(word))
}

fn hex_words<S: serde::Serializer>(words: &[Word], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(words.iter().map(hex::encode))
}
