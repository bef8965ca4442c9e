// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! Transaction model and the ledger's canonical msgpack encoding.
//!
//! A transaction encodes as a msgpack map with the ledger's short field
//! names, keys sorted, zero-valued fields omitted and integers in their
//! smallest form. That is the byte string wallets sign and nodes accept:
//!
//! - txid = base32 (no padding) of `SHA-512/256("TX" || msgpack(txn))`;
//! - group id = `SHA-512/256("TG" || msgpack({"txlist": [txid_0, ..]}))`,
//!   computed over the members with `grp` unset;
//! - a signed group is the concatenation of the members' `SignedTxn`
//!   encodings.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use data_encoding::BASE32_NOPAD;
use hv_types::Address;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};

use crate::error::LedgerError;

const TXID_DOMAIN: &[u8] = b"TX";
const GROUP_DOMAIN: &[u8] = b"TG";
const PAYMENT_TYPE: &str = "pay";
const APP_CALL_TYPE: &str = "appl";
const SIGNATURE_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(pub [u8; 32]);

impl GroupId {
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, LedgerError> {
        let bytes = B64
            .decode(s.trim())
            .map_err(|e| LedgerError::Decode(format!("group id: {e}")))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::Decode(format!("group id: {} bytes", bytes.len())))?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl TryFrom<String> for GroupId {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_base64(&s)
    }
}

impl From<GroupId> for String {
    fn from(g: GroupId) -> Self {
        g.to_base64()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxnKind {
    Payment {
        receiver: Address,
        amount: u64,
    },
    /// A no-op application call. `args[0]` is the ABI method selector.
    AppCall {
        app_id: u64,
        args: Vec<Vec<u8>>,
        accounts: Vec<Address>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Address,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub group: Option<GroupId>,
    pub note: Vec<u8>,
    pub kind: TxnKind,
}

impl Transaction {
    /// The bytes a wallet signs, after the `"TX"` prefix.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(rmp_serde::to_vec_named(&WireTxn::from(self))?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let wire: WireTxn = rmp_serde::from_slice(bytes)?;
        let txn = Self::try_from(wire)?;
        ensure_canonical(&txn.encode()?, bytes)?;
        Ok(txn)
    }

    pub fn id_bytes(&self) -> Result<[u8; 32], LedgerError> {
        Ok(domain_hash(TXID_DOMAIN, &self.encode()?))
    }

    pub fn id(&self) -> Result<String, LedgerError> {
        Ok(BASE32_NOPAD.encode(&self.id_bytes()?))
    }
}

/// Compute the group id over `txns` and write it into every member.
pub fn assign_group(txns: &mut [Transaction]) -> Result<GroupId, LedgerError> {
    let mut txlist = Vec::with_capacity(txns.len());
    for txn in txns.iter_mut() {
        txn.group = None;
        txlist.push(ByteBuf::from(txn.id_bytes()?.to_vec()));
    }
    let encoded = rmp_serde::to_vec_named(&WireGroup { txlist })?;
    let gid = GroupId(domain_hash(GROUP_DOMAIN, &encoded));
    for txn in txns.iter_mut() {
        txn.group = Some(gid);
    }
    Ok(gid)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    /// Ed25519 signature by the sender's key, made in an external wallet.
    Signature(Vec<u8>),
    /// Approved by the pool's verifier program.
    Program(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub txn: Transaction,
    pub auth: Authorization,
}

impl SignedTransaction {
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        let (sig, lsig) = match &self.auth {
            Authorization::Signature(sig) => (Some(ByteBuf::from(sig.clone())), None),
            Authorization::Program(program) => (
                None,
                Some(WireLogicSig {
                    l: ByteBuf::from(program.clone()),
                }),
            ),
        };
        Ok(rmp_serde::to_vec_named(&WireSignedTxn {
            lsig,
            sig,
            txn: WireTxn::from(&self.txn),
        })?)
    }

    /// Decode exactly one signed transaction.
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        let mut group = decode_group(bytes)?;
        if group.len() != 1 {
            return Err(LedgerError::Decode(format!(
                "expected one signed transaction, got {}",
                group.len()
            )));
        }
        Ok(group.remove(0))
    }

    fn from_wire(wire: WireSignedTxn) -> Result<Self, LedgerError> {
        let auth = match (wire.sig, wire.lsig) {
            (Some(sig), None) if sig.len() == SIGNATURE_SIZE => {
                Authorization::Signature(sig.into_vec())
            }
            (Some(sig), None) => {
                return Err(LedgerError::Decode(format!("signature: {} bytes", sig.len())))
            }
            (None, Some(lsig)) => Authorization::Program(lsig.l.into_vec()),
            _ => {
                return Err(LedgerError::Decode(
                    "expected exactly one of sig and lsig".into(),
                ))
            }
        };
        Ok(Self {
            txn: Transaction::try_from(wire.txn)?,
            auth,
        })
    }
}

/// Concatenated member encodings, as `POST /v2/transactions` expects.
pub fn encode_group(group: &[SignedTransaction]) -> Result<Vec<u8>, LedgerError> {
    let mut out = Vec::new();
    for signed in group {
        out.extend_from_slice(&signed.encode()?);
    }
    Ok(out)
}

pub fn decode_group(bytes: &[u8]) -> Result<Vec<SignedTransaction>, LedgerError> {
    let mut rest = bytes;
    let mut group = Vec::new();
    while !rest.is_empty() {
        let before = rest;
        let wire: WireSignedTxn = rmp_serde::from_read(&mut rest)?;
        let raw = &before[..before.len() - rest.len()];
        let signed = SignedTransaction::from_wire(wire)?;
        ensure_canonical(&signed.encode()?, raw)?;
        group.push(signed);
    }
    Ok(group)
}

/// Re-encoding must reproduce the input, or a signature over it would not
/// survive the round trip.
fn ensure_canonical(encoded: &[u8], raw: &[u8]) -> Result<(), LedgerError> {
    if encoded != raw {
        return Err(LedgerError::Decode("non-canonical transaction encoding".into()));
    }
    Ok(())
}

fn domain_hash(domain: &[u8], bytes: &[u8]) -> [u8; 32] {
    let mut h = Sha512_256::new();
    h.update(domain);
    h.update(bytes);
    h.finalize().into()
}

// ---------------------------------------------------------------------------
// Wire form. Fields are declared in key order.
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireGroup {
    txlist: Vec<ByteBuf>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireSignedTxn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lsig: Option<WireLogicSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sig: Option<ByteBuf>,
    txn: WireTxn,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireLogicSig {
    l: ByteBuf,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireTxn {
    #[serde(default, skip_serializing_if = "is_zero")]
    amt: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    apaa: Vec<ByteBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    apat: Vec<ByteBuf>,
    #[serde(default, skip_serializing_if = "is_zero")]
    apid: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    fee: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    fv: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    gen: String,
    #[serde(default, skip_serializing_if = "is_zero_key")]
    gh: ByteBuf,
    #[serde(default, skip_serializing_if = "is_zero_key")]
    grp: ByteBuf,
    #[serde(default, skip_serializing_if = "is_zero")]
    lv: u64,
    #[serde(default, skip_serializing_if = "is_empty")]
    note: ByteBuf,
    #[serde(default, skip_serializing_if = "is_zero_key")]
    rcv: ByteBuf,
    #[serde(default, skip_serializing_if = "is_zero_key")]
    snd: ByteBuf,
    #[serde(rename = "type")]
    kind: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_empty(b: &ByteBuf) -> bool {
    b.is_empty()
}

/// The zero address and the zero digest are omitted like any zero value.
fn is_zero_key(b: &ByteBuf) -> bool {
    b.iter().all(|x| *x == 0)
}

fn key(bytes: [u8; 32]) -> ByteBuf {
    ByteBuf::from(bytes.to_vec())
}

fn address(a: &Address) -> ByteBuf {
    key(*a.public_key())
}

fn read_key(field: &str, b: &ByteBuf) -> Result<[u8; 32], LedgerError> {
    if b.is_empty() {
        return Ok([0u8; 32]);
    }
    b.as_slice()
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("{field}: {} bytes", b.len())))
}

fn read_address(field: &str, b: &ByteBuf) -> Result<Address, LedgerError> {
    read_key(field, b).map(Address::from_public_key)
}

impl From<&Transaction> for WireTxn {
    fn from(t: &Transaction) -> Self {
        let mut wire = WireTxn {
            fee: t.fee,
            fv: t.first_valid,
            gen: t.genesis_id.clone(),
            gh: key(t.genesis_hash),
            grp: t.group.map(|g| key(g.0)).unwrap_or_default(),
            lv: t.last_valid,
            note: ByteBuf::from(t.note.clone()),
            snd: address(&t.sender),
            ..WireTxn::default()
        };
        match &t.kind {
            TxnKind::Payment { receiver, amount } => {
                wire.kind = PAYMENT_TYPE.into();
                wire.amt = *amount;
                wire.rcv = address(receiver);
            }
            TxnKind::AppCall {
                app_id,
                args,
                accounts,
            } => {
                wire.kind = APP_CALL_TYPE.into();
                wire.apid = *app_id;
                wire.apaa = args.iter().cloned().map(ByteBuf::from).collect();
                wire.apat = accounts.iter().map(address).collect();
            }
        }
        wire
    }
}

impl TryFrom<WireTxn> for Transaction {
    type Error = LedgerError;

    fn try_from(w: WireTxn) -> Result<Self, Self::Error> {
        let kind = match w.kind.as_str() {
            PAYMENT_TYPE => TxnKind::Payment {
                receiver: read_address("rcv", &w.rcv)?,
                amount: w.amt,
            },
            APP_CALL_TYPE => TxnKind::AppCall {
                app_id: w.apid,
                args: w.apaa.into_iter().map(ByteBuf::into_vec).collect(),
                accounts: w
                    .apat
                    .iter()
                    .map(|a| read_address("apat", a))
                    .collect::<Result<_, _>>()?,
            },
            other => {
                return Err(LedgerError::Decode(format!(
                    "unsupported transaction type {other:?}"
                )))
            }
        };
        let group = if is_zero_key(&w.grp) {
            None
        } else {
            Some(GroupId(read_key("grp", &w.grp)?))
        };
        Ok(Self {
            sender: read_address("snd", &w.snd)?,
            fee: w.fee,
            first_valid: w.fv,
            last_valid: w.lv,
            genesis_id: w.gen,
            genesis_hash: read_key("gh", &w.gh)?,
            group,
            note: w.note.into_vec(),
            kind,
        })
    }
}
