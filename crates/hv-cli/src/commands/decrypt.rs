use std::collections::BTreeMap;
use std::io::{BufRead, IsTerminal};
use std::path::Path;

use anyhow::{Context, Result};
use hv_service::db::{DbError, Snapshot, TxnRecord};
use hv_vault::{decrypt, VaultSecret};
use zeroize::Zeroizing;

use crate::output;

/// The vault secret, typed without echo on a terminal or piped as one line.
fn read_secret() -> Result<VaultSecret> {
    let stdin = std::io::stdin();
    let hex = if stdin.is_terminal() {
        Zeroizing::new(
            rpassword::prompt_password("vault secret (hex): ")
                .context("reading vault secret from the terminal")?,
        )
    } else {
        let mut line = Zeroizing::new(String::new());
        stdin
            .lock()
            .read_line(&mut line)
            .context("reading vault secret from stdin")?;
        line
    };
    VaultSecret::from_hex(hex.trim()).map_err(|e| {
        output::fail_with_hint(
            &format!("invalid vault secret: {e}"),
            "expected the 64-character hex printed by `hv keygen`",
        )
    })
}

pub fn run(blob_hex: &str) -> Result<()> {
    let blob = hex::decode(blob_hex.trim().trim_start_matches("0x"))
        .context("sealed nullifier is not valid hex")?;
    let secret = read_secret()?;
    let nullifier = decrypt(&blob, &secret)?;

    if output::is_json() {
        output::json_output(serde_json::json!({ "nullifier": hex::encode(&nullifier) }))?;
    } else {
        println!("{}", hex::encode(&nullifier));
    }
    Ok(())
}

pub fn run_db(db_path: &Path) -> Result<()> {
    let snapshot =
        Snapshot::open(db_path).with_context(|| format!("opening {}", db_path.display()))?;
    let sealed = snapshot.encrypted_nullifiers()?;
    let secret = read_secret()?;

    let opened = decrypt_all(&sealed, &secret);
    let notes = note_statuses(&snapshot, &opened)?;
    let funds = unspent_funds(&snapshot, &opened)?;
    let failed = notes.iter().filter(|n| n.nullifier.is_none()).count();

    if output::is_json() {
        let rows: Vec<_> = notes
            .iter()
            .map(|n| {
                serde_json::json!({
                    "leaf_index": n.leaf_index,
                    "nullifier": n.nullifier.as_ref().map(hex::encode),
                    "spent_by": n.spent_by,
                })
            })
            .collect();
        let chains: Vec<_> = funds
            .iter()
            .map(|(deposit, end)| match end {
                ChainEnd::Unspent { leaf_index, amount } => serde_json::json!({
                    "deposit": deposit,
                    "status": "unspent",
                    "leaf_index": leaf_index,
                    "amount": amount,
                    "change": leaf_index != deposit,
                }),
                ChainEnd::Exhausted => serde_json::json!({
                    "deposit": deposit,
                    "status": "spent",
                }),
                ChainEnd::Broken { leaf_index, reason } => serde_json::json!({
                    "deposit": deposit,
                    "status": "unknown",
                    "leaf_index": leaf_index,
                    "reason": reason,
                }),
            })
            .collect();
        output::json_output(serde_json::json!({
            "notes": rows,
            "deposits": chains,
            "failed": failed,
        }))?;
    } else {
        for n in &notes {
            let nullifier = n.nullifier.as_ref().map(hex::encode).unwrap_or("-".into());
            let status = match n.spent_by {
                Some(w) => format!("spent by {w}"),
                None if n.nullifier.is_some() => "unspent".into(),
                None => "-".into(),
            };
            println!("{}\t{nullifier}\t{status}", n.leaf_index);
        }
        output::label("notes", &notes.len().to_string());
        for (deposit, end) in &funds {
            match end {
                ChainEnd::Unspent { leaf_index, amount } => {
                    let kind = if leaf_index == deposit { "deposit" } else { "change" };
                    output::label(
                        &format!("deposit {deposit}"),
                        &format!("{kind} at leaf {leaf_index} holds {amount}"),
                    );
                }
                ChainEnd::Exhausted => {}
                ChainEnd::Broken { leaf_index, reason } => output::warn(&format!(
                    "deposit {deposit}: chain stops at leaf {leaf_index}: {reason}"
                )),
            }
        }
        if failed > 0 {
            output::warn(&format!(
                "{failed} nullifier(s) did not open with this secret"
            ));
        }
    }
    Ok(())
}

fn decrypt_all(sealed: &[(u64, Vec<u8>)], secret: &VaultSecret) -> BTreeMap<u64, Option<Vec<u8>>> {
    sealed
        .iter()
        .map(|(leaf, blob)| (*leaf, decrypt(blob, secret).ok()))
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
struct NoteStatus {
    leaf_index: u64,
    nullifier: Option<Vec<u8>>,
    /// Leaf index of the withdrawal that spent the note.
    spent_by: Option<u64>,
}

fn note_statuses(
    snapshot: &Snapshot,
    opened: &BTreeMap<u64, Option<Vec<u8>>>,
) -> Result<Vec<NoteStatus>, DbError> {
    opened
        .iter()
        .map(|(leaf, nullifier)| {
            let spent_by = match nullifier {
                Some(n) => snapshot.spent_by(n)?.map(|w| w.leaf_index),
                None => None,
            };
            Ok(NoteStatus {
                leaf_index: *leaf,
                nullifier: nullifier.clone(),
                spent_by,
            })
        })
        .collect()
}

/// Where a deposit's value ends up after following its change notes.
#[derive(Debug, PartialEq, Eq)]
enum ChainEnd {
    Unspent { leaf_index: u64, amount: u64 },
    /// The last withdrawal left no change.
    Exhausted,
    Broken { leaf_index: u64, reason: &'static str },
}

/// The end of every deposit's change chain, keyed by the deposit's leaf.
fn unspent_funds(
    snapshot: &Snapshot,
    opened: &BTreeMap<u64, Option<Vec<u8>>>,
) -> Result<Vec<(u64, ChainEnd)>, DbError> {
    snapshot
        .deposits()?
        .iter()
        .map(|deposit| Ok((deposit.leaf_index, follow_chain(snapshot, opened, deposit)?)))
        .collect()
}

/// A withdrawal spending a note of value `v` for `amount + fee` leaves a
/// change note of `v - amount - fee` at the withdrawal's own leaf.
fn follow_chain(
    snapshot: &Snapshot,
    opened: &BTreeMap<u64, Option<Vec<u8>>>,
    deposit: &TxnRecord,
) -> Result<ChainEnd, DbError> {
    let mut leaf_index = deposit.leaf_index;
    let mut amount = deposit.amount;
    loop {
        let Some(Some(nullifier)) = opened.get(&leaf_index) else {
            return Ok(ChainEnd::Broken {
                leaf_index,
                reason: "no readable note at this leaf",
            });
        };
        let Some(withdrawal) = snapshot.spent_by(nullifier)? else {
            return Ok(ChainEnd::Unspent { leaf_index, amount });
        };
        if withdrawal.leaf_index <= leaf_index {
            return Ok(ChainEnd::Broken {
                leaf_index,
                reason: "withdrawal precedes the note it spends",
            });
        }
        let Some(change) = withdrawal
            .amount
            .checked_add(withdrawal.fee)
            .and_then(|spent| amount.checked_sub(spent))
        else {
            return Ok(ChainEnd::Broken {
                leaf_index,
                reason: "withdrawal exceeds the note amount",
            });
        };
        if change == 0 {
            return Ok(ChainEnd::Exhausted);
        }
        leaf_index = withdrawal.leaf_index;
        amount = change;
    }
}
