use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::amount::Amount;
use crate::constants::{EMPTY_LEAF_INDEX, NONCE_SIZE};
use crate::fee::FeePolicy;

/// Hex length of [`Note::text`]: 8-byte amount plus both nonces.
pub const NOTE_TEXT_LEN: usize = 16 + 4 * NONCE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoteError {
    #[error("randomness source failed: {0}")]
    Randomness(String),
    #[error("overflow in deduction")]
    Overflow,
    #[error("note amount too small: need {required}, have {available}")]
    InsufficientNoteAmount { required: u64, available: u64 },
    #[error("malformed note: {0}")]
    Malformed(String),
}

/// Secret witness for one pool entry.
///
/// Only `amount`, `k` and `r` feed the derived values; `leaf_index` and
/// `txn_id` track where the note is in its on-chain life-cycle.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Note {
    pub amount: u64,
    pub k: [u8; NONCE_SIZE],
    pub r: [u8; NONCE_SIZE],
    pub leaf_index: u64,
    pub txn_id: Option<String>,
}

impl Note {
    pub fn new(amount: u64, k: [u8; NONCE_SIZE], r: [u8; NONCE_SIZE]) -> Self {
        Self {
            amount,
            k,
            r,
            leaf_index: EMPTY_LEAF_INDEX,
            txn_id: None,
        }
    }

    /// Sample fresh `k` and `r` from the OS CSPRNG.
    pub fn generate(amount: u64) -> Result<Self, NoteError> {
        let k = random_nonce()?;
        let r = random_nonce()?;
        Ok(Self::new(amount, k, r))
    }

    pub fn leaf_index(&self) -> Option<u64> {
        (self.leaf_index != EMPTY_LEAF_INDEX).then_some(self.leaf_index)
    }

    pub fn is_confirmed(&self) -> bool {
        self.leaf_index().is_some() && self.txn_id.is_some()
    }

    pub fn max_withdrawal_amount(&self, policy: &FeePolicy) -> Amount {
        Amount::new(self.amount.saturating_sub(policy.fee(self.amount)))
    }

    /// Portable bearer form: `{amount:016x}{k}{r}` in lowercase hex.
    pub fn text(&self) -> String {
        format!("{:016x}{}{}", self.amount, hex::encode(self.k), hex::encode(self.r))
    }

    pub fn from_text(text: &str) -> Result<Self, NoteError> {
        let text = text.trim();
        if text.len() != NOTE_TEXT_LEN {
            return Err(NoteError::Malformed(format!(
                "expected {NOTE_TEXT_LEN} hex chars, got {}",
                text.len()
            )));
        }
        let mut bytes = hex::decode(text).map_err(|e| NoteError::Malformed(e.to_string()))?;

        let mut amount_be = [0u8; 8];
        amount_be.copy_from_slice(&bytes[..8]);
        let mut k = [0u8; NONCE_SIZE];
        k.copy_from_slice(&bytes[8..8 + NONCE_SIZE]);
        let mut r = [0u8; NONCE_SIZE];
        r.copy_from_slice(&bytes[8 + NONCE_SIZE..]);
        bytes.zeroize();

        Ok(Self::new(u64::from_be_bytes(amount_be), k, r))
    }
}

impl std::fmt::Debug for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Note")
            .field("amount", &self.amount)
            .field("leaf_index", &self.leaf_index())
            .field("txn_id", &self.txn_id)
            .finish_non_exhaustive()
    }
}

/// New note for what is left of `from_note` after withdrawing
/// `withdrawal_amount` and paying its fee.
pub fn generate_change_note(
    withdrawal_amount: u64,
    from_note: &Note,
    policy: &FeePolicy,
) -> Result<Note, NoteError> {
    let deduction = withdrawal_amount
        .checked_add(policy.fee(withdrawal_amount))
        .ok_or(NoteError::Overflow)?;
    if from_note.amount < deduction {
        return Err(NoteError::InsufficientNoteAmount {
            required: deduction,
            available: from_note.amount,
        });
    }
    Note::generate(from_note.amount - deduction)
}

fn random_nonce() -> Result<[u8; NONCE_SIZE], NoteError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| NoteError::Randomness(e.to_string()))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_generation() {
        let n1 = Note::generate(1_000_000).unwrap();
        let n2 = Note::generate(1_000_000).unwrap();
        // Random nonces should differ
        assert_ne!(n1.k, n2.k);
        assert_ne!(n1.r, n2.r);
        assert_ne!(n1.k, n1.r);
        assert_eq!(n1.amount, 1_000_000);
        assert_eq!(n1.leaf_index(), None);
        assert!(!n1.is_confirmed());
    }

    #[test]
    fn text_roundtrip() {
        let mut note = Note::generate(42_000_000).unwrap();
        let text = note.text();
        assert_eq!(text.len(), NOTE_TEXT_LEN);
        assert!(text.starts_with("000000000280de80"));
        let parsed = Note::from_text(&text).unwrap();
        assert_eq!(parsed.amount, note.amount);
        assert_eq!(parsed.k, note.k);
        assert_eq!(parsed.r, note.r);
        // lifecycle fields are not part of the bearer text
        note.leaf_index = 7;
        assert_eq!(note.text(), text);
    }

    #[test]
    fn from_text_rejects_garbage() {
        assert!(matches!(Note::from_text("abc"), Err(NoteError::Malformed(_))));
        let not_hex = "z".repeat(NOTE_TEXT_LEN);
        assert!(matches!(Note::from_text(&not_hex), Err(NoteError::Malformed(_))));
    }

    #[test]
    fn change_note_scenario() {
        let policy = FeePolicy::new(0, 15_300);
        let from = Note::generate(600_000).unwrap();
        let change = generate_change_note(500_000, &from, &policy).unwrap();
        assert_eq!(change.amount, 84_700);
        assert_eq!(change.amount + 500_000 + policy.fee(500_000), from.amount);
    }

    #[test]
    fn change_note_exact_spend_gives_zero_change() {
        let policy = FeePolicy::new(0, 15_300);
        let from = Note::generate(515_300).unwrap();
        assert_eq!(generate_change_note(500_000, &from, &policy).unwrap().amount, 0);
    }

    #[test]
    fn change_note_insufficient() {
        let policy = FeePolicy::new(0, 15_300);
        let from = Note::generate(600_000).unwrap();
        let max = from.max_withdrawal_amount(&policy).units;
        assert_eq!(max, 584_700);
        let err = generate_change_note(max + 1, &from, &policy).unwrap_err();
        assert_eq!(
            err,
            NoteError::InsufficientNoteAmount {
                required: 600_001,
                available: 600_000
            }
        );
    }

    #[test]
    fn change_note_overflow() {
        let policy = FeePolicy::new(0, 10);
        let from = Note::generate(u64::MAX).unwrap();
        assert_eq!(
            generate_change_note(u64::MAX - 5, &from, &policy).unwrap_err(),
            NoteError::Overflow
        );
    }

    #[test]
    fn conservation_over_range() {
        let policy = FeePolicy::new(1_000, 2_000);
        let from = Note::generate(3_000_000).unwrap();
        for amount in (0..3_000_000u64).step_by(77_777) {
            let fee = policy.fee(amount);
            match generate_change_note(amount, &from, &policy) {
                Ok(change) => assert_eq!(change.amount + amount + fee, from.amount),
                Err(e) => {
                    assert!(amount + fee > from.amount);
                    assert!(matches!(e, NoteError::InsufficientNoteAmount { .. }));
                }
            }
        }
    }

    #[test]
    fn max_withdrawal_never_underflows() {
        let policy = FeePolicy::new(0, 15_300);
        let tiny = Note::generate(10_000).unwrap();
        assert_eq!(tiny.max_withdrawal_amount(&policy).units, 0);
    }

    #[test]
    fn debug_redacts_secrets() {
        let note = Note::generate(5).unwrap();
        let dbg = format!("{note:?}");
        assert!(!dbg.contains(&hex::encode(note.k)));
        assert!(dbg.contains("amount: 5"));
    }
}
