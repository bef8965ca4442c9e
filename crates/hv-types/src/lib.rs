pub mod address;
pub mod amount;
pub mod constants;
pub mod fee;
pub mod note;
pub mod withdrawal;

pub use address::{Address, AddressError};
pub use amount::{Amount, AmountError};
pub use constants::*;
pub use fee::FeePolicy;
pub use note::{generate_change_note, Note, NoteError};
pub use withdrawal::WithdrawalData;
