//! Protocol constants shared with the on-chain pool program.
//!
//! Changing any of these breaks compatibility with notes already issued and
//! with the deployed verifier, so they are compile-time values.

/// Byte length of the secret nonces `k` and `r`.
pub const NONCE_SIZE: usize = 31;

/// Depth of the pool's commitment tree.
pub const MERKLE_TREE_LEVELS: usize = 32;

/// Sentinel for a note whose leaf index is not yet known.
pub const EMPTY_LEAF_INDEX: u64 = u64::MAX;

/// Smallest deposit the pool accepts, in base units.
pub const DEPOSIT_MINIMUM_AMOUNT: u64 = 1_000_000;

/// Base units per whole coin.
pub const UNITS_PER_COIN: u64 = 1_000_000;

/// Decimal places of the base unit.
pub const UNIT_DECIMALS: usize = 6;

/// Position of the depositor's payment inside the deposit group.
pub const USER_DEPOSIT_TXN_INDEX: usize = 1;

/// Top-level transactions needed for the verifier's opcode budget.
pub const VERIFIER_TOP_LEVEL_TXN_NEEDED: usize = 8;

/// Network minimum fee per transaction.
pub const MIN_TXN_FEE: u64 = 1_000;

/// Fee multiplier of the base fee required by a deposit group.
pub const DEPOSIT_MIN_FEE_MULTIPLIER: u64 = 56;

/// Fee multiplier of the base fee required by a withdrawal group.
pub const WITHDRAWAL_MIN_FEE_MULTIPLIER: u64 = 60;

/// Amount the pool program withholds to store a nullifier record.
pub const NULLIFIER_MBR: u64 = 15_300;

/// Smallest fee a withdrawal can carry.
pub const WITHDRAWAL_MIN_FEE: u64 = NULLIFIER_MBR + WITHDRAWAL_MIN_FEE_MULTIPLIER * MIN_TXN_FEE;

/// Default number of rounds to wait for a group to be confirmed.
pub const WAIT_ROUNDS: u64 = 30;

/// ARC-4 signatures of the pool program's methods. The first four bytes of
/// their SHA-512/256 digest select the method.
///
/// `deposit(proof, [amount, commitment], depositor)` returns the new leaf
/// index and tree root.
pub const DEPOSIT_METHOD_SIGNATURE: &str = "deposit(byte[32][],byte[32][],address)(uint64,byte[32])";
/// `withdraw(proof, [recipient, amount, fee, commitment, nullifier, root],
/// fee_recipient, recipient, no_change)` returns the change leaf index and
/// tree root.
pub const WITHDRAWAL_METHOD_SIGNATURE: &str =
    "withdraw(byte[32][],byte[32][],account,account,bool)(uint64,byte[32])";
pub const NOOP_METHOD_SIGNATURE: &str = "noop()void";
