// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! Typed errors for node access and group assembly.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("node returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("encode: {0}")]
    Encode(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LedgerError::Decode(e.to_string())
        } else {
            LedgerError::Transport(e.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for LedgerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        LedgerError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for LedgerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        LedgerError::Decode(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("amount {amount} is below the minimum deposit of {minimum}")]
    BelowMinimumDeposit { amount: u64, minimum: u64 },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("fee computation overflows")]
    FeeOverflow,

    #[error("fee {fee} does not cover the withdrawal budget of {required}")]
    FeeBelowBudget { fee: u64, required: u64 },

    #[error("note has no leaf index; it is not confirmed on-chain")]
    MissingLeafIndex,

    #[error("group size {0} is too small")]
    GroupSize(usize),

    #[error("signed transaction does not match the prepared group")]
    SignedTxnMismatch,

    #[error("proof is {0} bytes, not a whole number of 32-byte words")]
    MalformedProof(usize),

    #[error("encoding: {0}")]
    Encoding(String),
}
