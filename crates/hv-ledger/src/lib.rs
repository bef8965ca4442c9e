// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! # hv-ledger
//!
//! Everything between a note and the chain: building the pool's deposit
//! and withdrawal transaction groups, talking to a ledger node, and
//! classifying what happened after a group was submitted.
//!
//! ## Crate layout
//!
//! | Module | Purpose |
//! |---|---|
//! | [`txn`] | Transaction model, canonical msgpack encoding, ids and group ids |
//! | [`abi`] | ARC-4 method selectors, arguments and return values |
//! | [`builder`] | Deposit / withdrawal group assembly |
//! | [`client`] | [`LedgerClient`] trait and the node-side data it returns |
//! | [`node`] | REST implementation of [`LedgerClient`] over `reqwest` |
//! | [`confirm`] | Submission, bounded wait, outcome classification |
//!
//! The client is always passed in as a handle (`Arc<dyn LedgerClient>`);
//! with the `testutils` feature, [`testutils::MockLedger`] stands in for a
//! real node.
//!
//! ## Typical deposit flow
//!
//! ```rust,no_run
//! use hv_ledger::builder::{PoolContract, TxnBuilder, BuilderConfig};
//! use hv_ledger::client::LedgerClient;
//! use hv_ledger::confirm::send_group;
//! use hv_types::{Address, Note};
//!
//! # async fn example(client: &dyn LedgerClient, pool: PoolContract, depositor: Address,
//! #     signed_user_txn: hv_ledger::txn::SignedTransaction) -> anyhow::Result<()> {
//! let builder = TxnBuilder::new(pool, BuilderConfig::default());
//! let note = Note::generate(1_000_000)?;
//! let params = client.suggested_params().await?;
//! let group = builder.build_deposit_group(note.amount, &depositor, &note, &params)?;
//!
//! // ... the depositor signs group.txns[group.index_to_sign] in their wallet ...
//!
//! let signed = builder.authorize_deposit(&group.txns, signed_user_txn)?;
//! let confirmation = send_group(client, &signed, &group.watch_txid, 30).await?;
//! println!("leaf index {}", confirmation.leaf_index);
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod builder;
pub mod client;
pub mod confirm;
pub mod error;
pub mod node;
pub mod txn;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use client::LedgerClient;
pub use confirm::{Confirmation, TxnConfirmationError};
pub use error::{BuildError, LedgerError};
