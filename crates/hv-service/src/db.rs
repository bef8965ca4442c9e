use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use hv_mimc::Word;
use hv_types::{Amount, Note};
use hv_vault::{NullifierVault, VaultError};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("nullifier encryption: {0}")]
    Vault(#[from] VaultError),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("not found")]
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnType {
    Deposit = 0,
    Withdrawal = 1,
}

/// One pool transaction as written by the chain subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxnRecord {
    pub leaf_index: u64,
    pub commitment: Word,
    pub txn_id: String,
    pub txn_type: TxnType,
    pub amount: u64,
    pub fee: u64,
    pub from_nullifier: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnconfirmedNoteRecord {
    pub id: i64,
    pub commitment: Word,
    pub nullifier: Vec<u8>,
    pub txn_id: String,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedNoteRecord {
    pub leaf_index: u64,
    pub commitment: Word,
    pub txn_id: String,
    pub nullifier: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    pub deposit_total: Amount,
    pub withdrawal_total: Amount,
    pub fee_total: Amount,
    pub deposit_count: u64,
    pub note_count: u64,
}

impl Stats {
    /// Every note that is not a deposit is a change note, so one spent note.
    pub fn spent_note_count(&self) -> u64 {
        self.note_count.saturating_sub(self.deposit_count)
    }

    pub fn tvl(&self) -> Amount {
        Amount::new(
            self.deposit_total
                .units
                .saturating_sub(self.withdrawal_total.units)
                .saturating_sub(self.fee_total.units),
        )
    }
}

pub struct Db {
    conn: Mutex<Connection>,
    vault: Arc<NullifierVault>,
}

impl Db {
    pub fn open(path: &Path, vault: Arc<NullifierVault>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notes (
                leaf_index INTEGER PRIMARY KEY,
                commitment BLOB NOT NULL,
                txn_id TEXT NOT NULL,
                nullifier BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS unconfirmed_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                commitment BLOB NOT NULL,
                nullifier BLOB NOT NULL,
                txn_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS txns (
                leaf_index INTEGER PRIMARY KEY,
                commitment BLOB NOT NULL UNIQUE,
                txn_id TEXT NOT NULL,
                txn_type INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                fee INTEGER NOT NULL,
                from_nullifier BLOB
            );
            CREATE TABLE IF NOT EXISTS roots (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                value BLOB NOT NULL,
                leaf_count INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS stats (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            vault,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // -----------------------------------------------------------------------
    // Notes
    // -----------------------------------------------------------------------

    /// Record a note whose group was submitted but whose outcome is unknown.
    pub fn register_unconfirmed(&self, note: &Note) -> Result<i64, DbError> {
        let txn_id = note
            .txn_id
            .as_deref()
            .ok_or_else(|| DbError::Malformed("unconfirmed note without txn id".into()))?;
        let nullifier = self.vault.encrypt(&hv_mimc::nullifier(note))?;
        let commitment = hv_mimc::commitment(note);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO unconfirmed_notes (commitment, nullifier, txn_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![commitment.as_slice(), nullifier, txn_id, unix_now() as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_note(&self, note: &Note) -> Result<(), DbError> {
        let (Some(leaf_index), Some(txn_id)) = (note.leaf_index(), note.txn_id.as_deref()) else {
            return Err(DbError::Malformed(format!("unconfirmed note {note:?}")));
        };
        let nullifier = self.vault.encrypt(&hv_mimc::nullifier(note))?;
        let commitment = hv_mimc::commitment(note);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notes (leaf_index, commitment, txn_id, nullifier) VALUES (?1, ?2, ?3, ?4)",
            params![leaf_index as i64, commitment.as_slice(), txn_id, nullifier],
        )?;
        Ok(())
    }

    /// Never fails; errors are logged.
    pub fn delete_unconfirmed(&self, id: i64) {
        let result = self.conn().and_then(|conn| {
            conn.execute("DELETE FROM unconfirmed_notes WHERE id = ?1", params![id])
                .map_err(DbError::from)
        });
        if let Err(e) = result {
            tracing::error!(id, error = %e, "failed to delete unconfirmed note");
        }
    }

    pub fn confirmed_note(&self, leaf_index: u64) -> Result<ConfirmedNoteRecord, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT leaf_index, commitment, txn_id, nullifier FROM notes WHERE leaf_index = ?1",
            params![leaf_index as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or(DbError::NotFound)
        .and_then(|(leaf_index, commitment, txn_id, nullifier)| {
            Ok(ConfirmedNoteRecord {
                leaf_index: leaf_index as u64,
                commitment: to_word(&commitment)?,
                txn_id,
                nullifier,
            })
        })
    }

    pub fn encrypted_nullifiers(&self) -> Result<Vec<(u64, Vec<u8>)>, DbError> {
        let conn = self.conn()?;
        read_encrypted_nullifiers(&conn)
    }

    // -----------------------------------------------------------------------
    // Pool state (written by the chain subscriber)
    // -----------------------------------------------------------------------

    pub fn leaf_index_by_commitment(&self, commitment: &Word) -> Result<u64, DbError> {
        self.txn_by_commitment(commitment).map(|(leaf, _)| leaf)
    }

    pub fn txn_by_commitment(&self, commitment: &Word) -> Result<(u64, String), DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT leaf_index, txn_id FROM txns WHERE commitment = ?1",
            params![commitment.as_slice()],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    pub fn all_commitments(&self) -> Result<Vec<Word>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT commitment FROM txns ORDER BY leaf_index ASC")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.iter().map(|c| to_word(c)).collect()
    }

    pub fn current_root(&self) -> Result<(Word, u64), DbError> {
        let conn = self.conn()?;
        let (value, count) = conn
            .query_row("SELECT value, leaf_count FROM roots WHERE id = 1", [], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?
            .ok_or(DbError::NotFound)?;
        Ok((to_word(&value)?, count as u64))
    }

    pub fn stats(&self) -> Result<Stats, DbError> {
        let conn = self.conn()?;
        let (deposits, withdrawals, fees, deposit_count): (i64, i64, i64, i64) = conn.query_row(
            "SELECT
                COALESCE((SELECT value FROM stats WHERE key = 'total_deposits'), 0),
                COALESCE((SELECT value FROM stats WHERE key = 'total_withdrawals'), 0),
                COALESCE((SELECT value FROM stats WHERE key = 'total_fees'), 0),
                COALESCE((SELECT value FROM stats WHERE key = 'count_deposits'), 0)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let note_count: i64 = conn.query_row("SELECT COUNT(*) FROM txns", [], |row| row.get(0))?;
        Ok(Stats {
            deposit_total: Amount::new(deposits as u64),
            withdrawal_total: Amount::new(withdrawals as u64),
            fee_total: Amount::new(fees as u64),
            deposit_count: deposit_count as u64,
            note_count: note_count as u64,
        })
    }

    /// Insert a pool transaction and update the running totals.
    pub fn record_txn(&self, txn: &TxnRecord) -> Result<(), DbError> {
        let amount = sql_int("amount", txn.amount)?;
        let fee = sql_int("fee", txn.fee)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO txns (leaf_index, commitment, txn_id, txn_type, amount, fee, from_nullifier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                txn.leaf_index as i64,
                txn.commitment.as_slice(),
                txn.txn_id,
                txn.txn_type as i64,
                amount,
                fee,
                txn.from_nullifier,
            ],
        )?;
        let bumps: &[(&str, i64)] = match txn.txn_type {
            TxnType::Deposit => &[("total_deposits", amount), ("count_deposits", 1)],
            TxnType::Withdrawal => &[("total_withdrawals", amount), ("total_fees", fee)],
        };
        for (key, delta) in bumps {
            tx.execute(
                "INSERT INTO stats (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = value + ?2",
                params![key, delta],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The withdrawal that revealed `nullifier`, if any.
    pub fn spent_by(&self, nullifier: &[u8]) -> Result<Option<TxnRecord>, DbError> {
        let conn = self.conn()?;
        read_spent_by(&conn, nullifier)
    }

    pub fn set_root(&self, root: &Word, leaf_count: u64) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO roots (id, value, leaf_count) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET value = ?1, leaf_count = ?2",
            params![root.as_slice(), leaf_count as i64],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sweep support
    // -----------------------------------------------------------------------

    pub fn unconfirmed_batch(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<UnconfirmedNoteRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, commitment, nullifier, txn_id, created_at FROM unconfirmed_notes
             WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, commitment, nullifier, txn_id, created_at)| {
                Ok(UnconfirmedNoteRecord {
                    id,
                    commitment: to_word(&commitment)?,
                    nullifier,
                    txn_id,
                    created_at: created_at as u64,
                })
            })
            .collect()
    }

    /// Move an unconfirmed record into `notes` in one sqlite transaction.
    pub fn promote_unconfirmed(
        &self,
        record: &UnconfirmedNoteRecord,
        leaf_index: u64,
    ) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO notes (leaf_index, commitment, txn_id, nullifier)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                leaf_index as i64,
                record.commitment.as_slice(),
                record.txn_id,
                record.nullifier
            ],
        )?;
        tx.execute(
            "DELETE FROM unconfirmed_notes WHERE id = ?1",
            params![record.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_unconfirmed_batch(&self, ids: &[i64]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let conn = self.conn()?;
        let deleted = conn.execute(
            &format!("DELETE FROM unconfirmed_notes WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(deleted)
    }

    pub fn unconfirmed_count(&self) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM unconfirmed_notes", [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    }
}

/// A read-only view of a service database, for offline inspection.
pub struct Snapshot {
    conn: Connection,
}

impl Snapshot {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Sealed nullifiers of confirmed notes, by leaf index.
    pub fn encrypted_nullifiers(&self) -> Result<Vec<(u64, Vec<u8>)>, DbError> {
        read_encrypted_nullifiers(&self.conn)
    }

    pub fn deposits(&self) -> Result<Vec<TxnRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM txns WHERE txn_type = ?1 ORDER BY leaf_index"
        ))?;
        let rows = stmt
            .query_map(params![TxnType::Deposit as i64], txn_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(txn_record).collect()
    }

    pub fn spent_by(&self, nullifier: &[u8]) -> Result<Option<TxnRecord>, DbError> {
        read_spent_by(&self.conn, nullifier)
    }
}

const TXN_COLUMNS: &str = "leaf_index, commitment, txn_id, txn_type, amount, fee, from_nullifier";

type TxnRow = (i64, Vec<u8>, String, i64, i64, i64, Option<Vec<u8>>);

fn txn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TxnRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn txn_record(row: TxnRow) -> Result<TxnRecord, DbError> {
    let (leaf_index, commitment, txn_id, txn_type, amount, fee, from_nullifier) = row;
    let txn_type = match txn_type {
        0 => TxnType::Deposit,
        1 => TxnType::Withdrawal,
        other => return Err(DbError::Malformed(format!("txn_type {other}"))),
    };
    let unsigned = |field: &str, v: i64| {
        u64::try_from(v).map_err(|_| DbError::Malformed(format!("negative {field} {v}")))
    };
    Ok(TxnRecord {
        leaf_index: unsigned("leaf_index", leaf_index)?,
        commitment: to_word(&commitment)?,
        txn_id,
        txn_type,
        amount: unsigned("amount", amount)?,
        fee: unsigned("fee", fee)?,
        from_nullifier,
    })
}

fn read_spent_by(conn: &Connection, nullifier: &[u8]) -> Result<Option<TxnRecord>, DbError> {
    conn.query_row(
        &format!("SELECT {TXN_COLUMNS} FROM txns WHERE txn_type = ?1 AND from_nullifier = ?2"),
        params![TxnType::Withdrawal as i64, nullifier],
        txn_row,
    )
    .optional()?
    .map(txn_record)
    .transpose()
}

fn read_encrypted_nullifiers(conn: &Connection) -> Result<Vec<(u64, Vec<u8>)>, DbError> {
    let mut stmt = conn.prepare("SELECT leaf_index, nullifier FROM notes ORDER BY leaf_index")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, Vec<u8>>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// sqlite integers are signed 64-bit.
fn sql_int(field: &str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value)
        .map_err(|_| DbError::Malformed(format!("{field} {value} exceeds the sqlite integer range")))
}

fn to_word(bytes: &[u8]) -> Result<Word, DbError> {
    bytes
        .try_into()
        .map_err(|_| DbError::Malformed(format!("expected 32-byte value, got {}", bytes.len())))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_vault::{decrypt, VaultKeypair};

    fn open() -> (tempfile::TempDir, Db, VaultKeypair) {
        let tmp = tempfile::tempdir().unwrap();
        let kp = VaultKeypair::generate().unwrap();
        let db = Db::open(&tmp.path().join("test.db"), Arc::new(kp.vault())).unwrap();
        (tmp, db, kp)
    }

    fn submitted_note(amount: u64) -> Note {
        let mut note = Note::generate(amount).unwrap();
        note.txn_id = Some("TXID".into());
        note
    }

    #[test]
    fn unconfirmed_lifecycle() {
        let (_tmp, db, kp) = open();
        let note = submitted_note(1_000_000);
        let id = db.register_unconfirmed(&note).unwrap();
        assert_eq!(db.unconfirmed_count().unwrap(), 1);

        let batch = db.unconfirmed_batch(0, 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].commitment, hv_mimc::commitment(&note));
        assert_eq!(
            decrypt(&batch[0].nullifier, &kp.secret).unwrap(),
            hv_mimc::nullifier(&note).to_vec()
        );

        db.delete_unconfirmed(id);
        assert_eq!(db.unconfirmed_count().unwrap(), 0);
        // second delete is a no-op
        db.delete_unconfirmed(id);
    }

    #[test]
    fn register_requires_txn_id() {
        let (_tmp, db, _kp) = open();
        let note = Note::generate(5).unwrap();
        assert!(matches!(db.register_unconfirmed(&note), Err(DbError::Malformed(_))));
    }

    #[test]
    fn save_note_requires_confirmation() {
        let (_tmp, db, kp) = open();
        let mut note = submitted_note(1_000_000);
        assert!(matches!(db.save_note(&note), Err(DbError::Malformed(_))));

        note.leaf_index = 3;
        db.save_note(&note).unwrap();
        let saved = db.confirmed_note(3).unwrap();
        assert_eq!(saved.commitment, hv_mimc::commitment(&note));
        assert_eq!(saved.txn_id, "TXID");
        assert_eq!(
            decrypt(&saved.nullifier, &kp.secret).unwrap(),
            hv_mimc::nullifier(&note).to_vec()
        );
        assert_eq!(db.encrypted_nullifiers().unwrap().len(), 1);
        assert!(matches!(db.confirmed_note(4), Err(DbError::NotFound)));
    }

    #[test]
    fn pool_state_and_stats() {
        let (_tmp, db, _kp) = open();
        assert!(matches!(db.current_root(), Err(DbError::NotFound)));
        assert!(matches!(
            db.leaf_index_by_commitment(&[1u8; 32]),
            Err(DbError::NotFound)
        ));

        db.record_txn(&TxnRecord {
            leaf_index: 0,
            commitment: [1u8; 32],
            txn_id: "A".into(),
            txn_type: TxnType::Deposit,
            amount: 5_000_000,
            fee: 0,
            from_nullifier: None,
        })
        .unwrap();
        db.record_txn(&TxnRecord {
            leaf_index: 1,
            commitment: [2u8; 32],
            txn_id: "B".into(),
            txn_type: TxnType::Withdrawal,
            amount: 1_000_000,
            fee: 75_300,
            from_nullifier: Some(vec![9u8; 32]),
        })
        .unwrap();
        db.set_root(&[7u8; 32], 2).unwrap();

        assert_eq!(db.leaf_index_by_commitment(&[2u8; 32]).unwrap(), 1);
        assert_eq!(db.all_commitments().unwrap(), vec![[1u8; 32], [2u8; 32]]);
        assert_eq!(db.current_root().unwrap(), ([7u8; 32], 2));

        let stats = db.stats().unwrap();
        assert_eq!(stats.deposit_total.units, 5_000_000);
        assert_eq!(stats.withdrawal_total.units, 1_000_000);
        assert_eq!(stats.fee_total.units, 75_300);
        assert_eq!(stats.deposit_count, 1);
        assert_eq!(stats.note_count, 2);
        assert_eq!(stats.spent_note_count(), 1);
        assert_eq!(stats.tvl().units, 3_924_700);
    }

    #[test]
    fn empty_stats_are_zero() {
        let (_tmp, db, _kp) = open();
        let stats = db.stats().unwrap();
        assert_eq!(stats.note_count, 0);
        assert_eq!(stats.tvl().units, 0);
    }

    #[test]
    fn promote_and_batch_delete() {
        let (_tmp, db, _kp) = open();
        let ids: Vec<i64> = (0..3)
            .map(|_| db.register_unconfirmed(&submitted_note(1_000_000)).unwrap())
            .collect();
        let batch = db.unconfirmed_batch(0, 10).unwrap();

        db.promote_unconfirmed(&batch[0], 11).unwrap();
        // promoting twice keeps the first row
        db.promote_unconfirmed(&batch[0], 11).unwrap();
        assert_eq!(db.confirmed_note(11).unwrap().commitment, batch[0].commitment);
        assert_eq!(db.unconfirmed_count().unwrap(), 2);

        assert_eq!(db.delete_unconfirmed_batch(&ids[1..]).unwrap(), 2);
        assert_eq!(db.unconfirmed_count().unwrap(), 0);
        assert_eq!(db.delete_unconfirmed_batch(&[]).unwrap(), 0);

        let after = db.unconfirmed_batch(ids[0], 10).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn record_txn_rejects_amounts_beyond_sqlite_range() {
        let (_tmp, db, _kp) = open();
        let mut txn = TxnRecord {
            leaf_index: 0,
            commitment: [1u8; 32],
            txn_id: "A".into(),
            txn_type: TxnType::Deposit,
            amount: u64::MAX,
            fee: 0,
            from_nullifier: None,
        };
        assert!(matches!(db.record_txn(&txn), Err(DbError::Malformed(_))));
        txn.amount = 1;
        txn.fee = i64::MAX as u64 + 1;
        assert!(matches!(db.record_txn(&txn), Err(DbError::Malformed(_))));

        assert!(db.all_commitments().unwrap().is_empty());
        assert_eq!(db.stats().unwrap().deposit_total.units, 0);
    }

    #[test]
    fn read_only_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dump.db");
        let kp = VaultKeypair::generate().unwrap();
        let mut note = submitted_note(2_000_000);
        note.leaf_index = 0;
        {
            let db = Db::open(&path, Arc::new(kp.vault())).unwrap();
            db.save_note(&note).unwrap();
            db.record_txn(&TxnRecord {
                leaf_index: 0,
                commitment: hv_mimc::commitment(&note),
                txn_id: "D".into(),
                txn_type: TxnType::Deposit,
                amount: 2_000_000,
                fee: 0,
                from_nullifier: None,
            })
            .unwrap();
            db.record_txn(&TxnRecord {
                leaf_index: 1,
                commitment: [5u8; 32],
                txn_id: "W".into(),
                txn_type: TxnType::Withdrawal,
                amount: 1_000_000,
                fee: 75_300,
                from_nullifier: Some(hv_mimc::nullifier(&note).to_vec()),
            })
            .unwrap();
            let spender = db.spent_by(&hv_mimc::nullifier(&note)).unwrap().unwrap();
            assert_eq!(spender.leaf_index, 1);
        }

        let snapshot = Snapshot::open(&path).unwrap();
        let rows = snapshot.encrypted_nullifiers().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 0);

        let deposits = snapshot.deposits().unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].txn_id, "D");
        assert_eq!(deposits[0].amount, 2_000_000);

        let spender = snapshot
            .spent_by(&hv_mimc::nullifier(&note))
            .unwrap()
            .unwrap();
        assert_eq!(spender.txn_type, TxnType::Withdrawal);
        assert_eq!((spender.leaf_index, spender.amount, spender.fee), (1, 1_000_000, 75_300));
        assert!(snapshot.spent_by(&[0u8; 32]).unwrap().is_none());
    }
}
