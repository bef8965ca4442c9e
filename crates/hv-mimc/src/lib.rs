//! MiMC over the BN254 scalar field, and the note derivations built on it.
//!
//! The construction is the Miyaguchi-Preneel MiMC hash used by gnark's
//! `hash.MIMC_BN254`, so every digest matches the pool's on-chain verifier:
//!
//! - 110 rounds of `x -> (x + key + c_i)^5`, then a final `+ key`;
//! - `c_0 = keccak256(keccak256("seed"))`, each later constant hashes the
//!   previous one;
//! - inputs are absorbed one 32-byte big-endian word at a time with
//!   `h = E_h(x) + h + x`, starting from `h = 0`.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{AdditiveGroup, BigInteger, Field, PrimeField};
use hv_types::{Note, NONCE_SIZE};
use sha3::{Digest, Keccak256};

const ROUNDS: usize = 110;
const SEED: &[u8] = b"seed";

/// Width of every hash input and output word.
pub const WORD_SIZE: usize = 32;

pub type Word = [u8; WORD_SIZE];

pub fn round_constants() -> &'static [Fr] {
    static CONSTANTS: OnceLock<Vec<Fr>> = OnceLock::new();
    CONSTANTS.get_or_init(|| {
        let mut digest = Keccak256::digest(SEED);
        (0..ROUNDS)
            .map(|_| {
                digest = Keccak256::digest(digest);
                Fr::from_be_bytes_mod_order(&digest)
            })
            .collect()
    })
}

fn encrypt(message: Fr, key: Fr) -> Fr {
    let mut m = message;
    for c in round_constants() {
        let t = m + key + c;
        m = t.square().square() * t;
    }
    m + key
}

pub fn mimc_hash(inputs: &[Fr]) -> Fr {
    inputs.iter().fold(Fr::ZERO, |h, x| encrypt(*x, h) + h + x)
}

pub fn hash2(a: Fr, b: Fr) -> Fr {
    mimc_hash(&[a, b])
}

/// Hash 32-byte big-endian words and return the digest as a word.
///
/// Every word this crate produces is already below the field modulus.
pub fn hash_words(words: &[Word]) -> Word {
    let inputs: Vec<Fr> = words.iter().map(word_to_fr).collect();
    fr_to_word(&mimc_hash(&inputs))
}

pub fn word_to_fr(word: &Word) -> Fr {
    Fr::from_be_bytes_mod_order(word)
}

pub fn fr_to_word(fr: &Fr) -> Word {
    let bytes = fr.into_bigint().to_bytes_be();
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - bytes.len()..].copy_from_slice(&bytes);
    word
}

/// Amount as a big-endian 256-bit integer.
pub fn amount_word(amount: u64) -> Word {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - 8..].copy_from_slice(&amount.to_be_bytes());
    word
}

/// Nonce zero-extended on the left to a full word.
pub fn nonce_word(nonce: &[u8; NONCE_SIZE]) -> Word {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - NONCE_SIZE..].copy_from_slice(nonce);
    word
}

/// `H(amount, k)`: revealed when the note is spent.
pub fn nullifier(note: &Note) -> Word {
    hash_words(&[amount_word(note.amount), nonce_word(&note.k)])
}

/// `H(amount, k, r)`
pub fn leaf_value(note: &Note) -> Word {
    hash_words(&[
        amount_word(note.amount),
        nonce_word(&note.k),
        nonce_word(&note.r),
    ])
}

/// `H(leaf_value)`: published as the pool's Merkle leaf.
pub fn commitment(note: &Note) -> Word {
    hash_words(&[leaf_value(note)])
}
