// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! Deposit and withdrawal group assembly.
//!
//! Both builders are pure: the same inputs always give byte-identical
//! groups. The pool's verifier program authorizes every transaction except
//! the depositor's payment, which the depositor signs in their own wallet.
//!
//! Method arguments are ARC-4 encoded behind the method selector. Numeric
//! public inputs travel as 32-byte big-endian words, the same layout the
//! note hashes use.

use hv_mimc::{amount_word, fr_to_word, word_to_fr};
use hv_types::{
    Address, Note, WithdrawalData, DEPOSIT_METHOD_SIGNATURE, DEPOSIT_MINIMUM_AMOUNT,
    DEPOSIT_MIN_FEE_MULTIPLIER, NOOP_METHOD_SIGNATURE, NULLIFIER_MBR, USER_DEPOSIT_TXN_INDEX,
    VERIFIER_TOP_LEVEL_TXN_NEEDED, WITHDRAWAL_METHOD_SIGNATURE, WITHDRAWAL_MIN_FEE_MULTIPLIER,
};

use crate::abi;
use crate::client::{AccountInfo, ChainParams};
use crate::error::BuildError;
use crate::txn::{assign_group, Authorization, GroupId, SignedTransaction, Transaction, TxnKind};

/// The deployed pool application and its verifier.
#[derive(Clone, Debug)]
pub struct PoolContract {
    pub app_id: u64,
    pub app_address: Address,
    pub verifier_address: Address,
    /// Logic program that authorizes transactions sent by the verifier.
    pub verifier_program: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
pub struct BuilderConfig {
    pub deposit_minimum: u64,
    pub deposit_fee_multiplier: u64,
    pub withdrawal_fee_multiplier: u64,
    pub nullifier_mbr: u64,
    /// Top-level transactions per group.
    pub group_size: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            deposit_minimum: DEPOSIT_MINIMUM_AMOUNT,
            deposit_fee_multiplier: DEPOSIT_MIN_FEE_MULTIPLIER,
            withdrawal_fee_multiplier: WITHDRAWAL_MIN_FEE_MULTIPLIER,
            nullifier_mbr: NULLIFIER_MBR,
            group_size: VERIFIER_TOP_LEVEL_TXN_NEEDED,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DepositGroup {
    pub txns: Vec<Transaction>,
    pub group_id: GroupId,
    /// Id of the app call whose logs carry the new leaf index.
    pub watch_txid: String,
    pub index_to_sign: usize,
}

#[derive(Clone, Debug)]
pub struct WithdrawalGroup {
    pub txns: Vec<Transaction>,
    pub group_id: GroupId,
    pub watch_txid: String,
}

pub struct TxnBuilder {
    pool: PoolContract,
    config: BuilderConfig,
}

impl TxnBuilder {
    pub fn new(pool: PoolContract, config: BuilderConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PoolContract {
        &self.pool
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn build_deposit_group(
        &self,
        amount: u64,
        depositor: &Address,
        note: &Note,
        params: &ChainParams,
    ) -> Result<DepositGroup, BuildError> {
        if amount == 0 {
            return Err(BuildError::ZeroAmount);
        }
        if amount < self.config.deposit_minimum {
            return Err(BuildError::BelowMinimumDeposit {
                amount,
                minimum: self.config.deposit_minimum,
            });
        }
        if note.amount != amount {
            return Err(BuildError::Encoding(format!(
                "note amount {} does not match deposit amount {amount}",
                note.amount
            )));
        }
        self.check_group_size()?;

        let user_fee = self
            .config
            .deposit_fee_multiplier
            .checked_mul(params.min_fee)
            .ok_or(BuildError::FeeOverflow)?;

        // the deposit proof comes from outside the service; none is attached
        let args = vec![
            abi::selector(DEPOSIT_METHOD_SIGNATURE).to_vec(),
            abi::word_array(&[])?,
            abi::word_array(&[amount_word(amount), hv_mimc::commitment(note)])?,
            abi::address(depositor),
        ];
        let mut txns = Vec::with_capacity(self.config.group_size);
        txns.push(self.app_call(params, 0, args, Vec::new(), Vec::new()));
        txns.push(Transaction {
            sender: depositor.clone(),
            fee: user_fee,
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            group: None,
            note: Vec::new(),
            kind: TxnKind::Payment {
                receiver: self.pool.app_address.clone(),
                amount,
            },
        });
        self.push_noops(&mut txns, params);

        let group_id = assign_group(&mut txns).map_err(encoding)?;
        let watch_txid = txns[0].id().map_err(encoding)?;
        tracing::debug!(group = %group_id, txid = %watch_txid, amount, "built deposit group");
        Ok(DepositGroup {
            txns,
            group_id,
            watch_txid,
            index_to_sign: USER_DEPOSIT_TXN_INDEX,
        })
    }

    pub fn build_withdrawal_group(
        &self,
        data: &WithdrawalData,
        root: &[u8; 32],
        proof: &[u8],
        params: &ChainParams,
    ) -> Result<WithdrawalGroup, BuildError> {
        data.from_note
            .leaf_index()
            .ok_or(BuildError::MissingLeafIndex)?;
        if data.amount.units == 0 {
            return Err(BuildError::ZeroAmount);
        }
        self.check_group_size()?;

        let call_fee = self
            .config
            .withdrawal_fee_multiplier
            .checked_mul(params.min_fee)
            .ok_or(BuildError::FeeOverflow)?;
        let required = call_fee
            .checked_add(self.config.nullifier_mbr)
            .ok_or(BuildError::FeeOverflow)?;
        if data.fee.units < required {
            return Err(BuildError::FeeBelowBudget {
                fee: data.fee.units,
                required,
            });
        }

        let public_inputs = [
            recipient_word(&data.address),
            amount_word(data.amount.units),
            amount_word(data.fee.units),
            hv_mimc::commitment(&data.change_note),
            hv_mimc::nullifier(&data.from_note),
            *root,
        ];
        let args = vec![
            abi::selector(WITHDRAWAL_METHOD_SIGNATURE).to_vec(),
            abi::word_array(&abi::proof_words(proof)?)?,
            abi::word_array(&public_inputs)?,
            // the verifier sends the call and collects the fee
            abi::account(0),
            abi::account(1),
            abi::boolean(data.change_note.amount == 0),
        ];
        let mut txns = Vec::with_capacity(self.config.group_size);
        txns.push(self.app_call(
            params,
            call_fee,
            args,
            vec![data.address.clone()],
            Vec::new(),
        ));
        self.push_noops(&mut txns, params);

        let group_id = assign_group(&mut txns).map_err(encoding)?;
        let watch_txid = txns[0].id().map_err(encoding)?;
        tracing::debug!(group = %group_id, txid = %watch_txid, amount = data.amount.units, "built withdrawal group");
        Ok(WithdrawalGroup {
            txns,
            group_id,
            watch_txid,
        })
    }

    /// Combine the depositor's signed payment with program authorization
    /// for the rest of the group.
    pub fn authorize_deposit(
        &self,
        txns: &[Transaction],
        user_signed: SignedTransaction,
    ) -> Result<Vec<SignedTransaction>, BuildError> {
        let expected = txns
            .get(USER_DEPOSIT_TXN_INDEX)
            .ok_or(BuildError::GroupSize(txns.len()))?;
        let signed_ok = match &user_signed.auth {
            Authorization::Signature(sig) => !sig.is_empty(),
            Authorization::Program(_) => false,
        };
        if user_signed.txn != *expected || !signed_ok {
            return Err(BuildError::SignedTxnMismatch);
        }

        let mut signed = self.authorize_program(txns);
        signed[USER_DEPOSIT_TXN_INDEX] = user_signed;
        Ok(signed)
    }

    /// Authorize every transaction in the group with the verifier program.
    pub fn authorize_program(&self, txns: &[Transaction]) -> Vec<SignedTransaction> {
        txns.iter().map(|t| self.program_signed(t)).collect()
    }

    /// Largest deposit `account` can afford, net of its minimum balance and
    /// the fee it pays for the group.
    pub fn max_deposit(&self, account: &AccountInfo, params: &ChainParams) -> u64 {
        let fees = self
            .config
            .deposit_fee_multiplier
            .saturating_mul(params.min_fee);
        account.spendable().saturating_sub(fees)
    }

    fn program_signed(&self, txn: &Transaction) -> SignedTransaction {
        SignedTransaction {
            txn: txn.clone(),
            auth: Authorization::Program(self.pool.verifier_program.clone()),
        }
    }

    fn check_group_size(&self) -> Result<(), BuildError> {
        if self.config.group_size <= USER_DEPOSIT_TXN_INDEX {
            return Err(BuildError::GroupSize(self.config.group_size));
        }
        Ok(())
    }

    fn push_noops(&self, txns: &mut Vec<Transaction>, params: &ChainParams) {
        let noop = abi::selector(NOOP_METHOD_SIGNATURE).to_vec();
        for i in txns.len()..self.config.group_size {
            txns.push(self.app_call(
                params,
                0,
                vec![noop.clone()],
                Vec::new(),
                // distinct note keeps every noop id unique
                (i as u64).to_be_bytes().to_vec(),
            ));
        }
    }

    fn app_call(
        &self,
        params: &ChainParams,
        fee: u64,
        args: Vec<Vec<u8>>,
        accounts: Vec<Address>,
        note: Vec<u8>,
    ) -> Transaction {
        Transaction {
            sender: self.pool.verifier_address.clone(),
            fee,
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            group: None,
            note,
            kind: TxnKind::AppCall {
                app_id: self.pool.app_id,
                args,
                accounts,
            },
        }
    }
}

/// The recipient's public key reduced into the scalar field.
fn recipient_word(address: &Address) -> abi::Word {
    fr_to_word(&word_to_fr(address.public_key()))
}

fn encoding(e: crate::error::LedgerError) -> BuildError {
    BuildError::Encoding(e.to_string())
}
