use crate::address::Address;
use crate::amount::Amount;
use crate::fee::FeePolicy;
use crate::note::{generate_change_note, Note, NoteError};

/// A prepared withdrawal: what leaves the pool, and the change note that
/// goes back in.
#[derive(Clone, Debug)]
pub struct WithdrawalData {
    pub amount: Amount,
    pub fee: Amount,
    pub address: Address,
    pub from_note: Note,
    pub change_note: Note,
}

impl WithdrawalData {
    pub fn new(
        amount: u64,
        address: Address,
        from_note: Note,
        policy: &FeePolicy,
    ) -> Result<Self, NoteError> {
        let change_note = generate_change_note(amount, &from_note, policy)?;
        Ok(Self {
            amount: Amount::new(amount),
            fee: Amount::new(policy.fee(amount)),
            address,
            from_note,
            change_note,
        })
    }

    /// Rebuild from a change note generated earlier, checking that the
    /// amounts still add up.
    pub fn with_change_note(
        amount: u64,
        address: Address,
        from_note: Note,
        change_note: Note,
        policy: &FeePolicy,
    ) -> Result<Self, NoteError> {
        let fee = policy.fee(amount);
        let spent = amount
            .checked_add(fee)
            .and_then(|d| d.checked_add(change_note.amount))
            .ok_or(NoteError::Overflow)?;
        if spent != from_note.amount {
            return Err(NoteError::Malformed(format!(
                "change note does not balance: {spent} != {}",
                from_note.amount
            )));
        }
        Ok(Self {
            amount: Amount::new(amount),
            fee: Amount::new(fee),
            address,
            from_note,
            change_note,
        })
    }
}
