// Copyright 2026 abhirupbanerjee
// Licensed under the Apache License, Version 2.0

//! ARC-4 encoding of the pool program's method arguments and return value.

use hv_types::Address;
use sha2::{Digest, Sha512_256};

use crate::error::BuildError;

pub const SELECTOR_SIZE: usize = 4;
pub const WORD_SIZE: usize = 32;

/// Prefix the program puts on the log that carries its return value.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

/// Encoded `(uint64,byte[32])` return value, prefix included.
pub const RETURN_SIZE: usize = SELECTOR_SIZE + 8 + WORD_SIZE;

pub type Word = [u8; WORD_SIZE];

pub fn selector(signature: &str) -> [u8; SELECTOR_SIZE] {
    let digest = Sha512_256::digest(signature.as_bytes());
    let mut out = [0u8; SELECTOR_SIZE];
    out.copy_from_slice(&digest[..SELECTOR_SIZE]);
    out
}

/// `byte[32][]`: a big-endian u16 length, then the words.
pub fn word_array(words: &[Word]) -> Result<Vec<u8>, BuildError> {
    let len = u16::try_from(words.len())
        .map_err(|_| BuildError::Encoding(format!("{} words overflow byte[32][]", words.len())))?;
    let mut out = Vec::with_capacity(2 + words.len() * WORD_SIZE);
    out.extend_from_slice(&len.to_be_bytes());
    for w in words {
        out.extend_from_slice(w);
    }
    Ok(out)
}

/// Split opaque proof bytes into the words of a `byte[32][]`.
pub fn proof_words(proof: &[u8]) -> Result<Vec<Word>, BuildError> {
    if proof.len() % WORD_SIZE != 0 {
        return Err(BuildError::MalformedProof(proof.len()));
    }
    Ok(proof
        .chunks_exact(WORD_SIZE)
        .map(|c| {
            let mut w = [0u8; WORD_SIZE];
            w.copy_from_slice(c);
            w
        })
        .collect())
}

pub fn address(a: &Address) -> Vec<u8> {
    a.public_key().to_vec()
}

/// `account`: index into the call's accounts, where 0 is the sender.
pub fn account(index: u8) -> Vec<u8> {
    vec![index]
}

pub fn boolean(v: bool) -> Vec<u8> {
    vec![if v { 0x80 } else { 0x00 }]
}

/// Decode a logged `(uint64,byte[32])` return value.
pub fn decode_return(log: &[u8]) -> Option<(u64, Word)> {
    if log.len() != RETURN_SIZE || !log.starts_with(&RETURN_PREFIX) {
        return None;
    }
    let index: [u8; 8] = log[SELECTOR_SIZE..SELECTOR_SIZE + 8].try_into().ok()?;
    let root: Word = log[SELECTOR_SIZE + 8..].try_into().ok()?;
    Some((u64::from_be_bytes(index), root))
}

pub fn encode_return(leaf_index: u64, root: &Word) -> Vec<u8> {
    let mut log = Vec::with_capacity(RETURN_SIZE);
    log.extend_from_slice(&RETURN_PREFIX);
    log.extend_from_slice(&leaf_index.to_be_bytes());
    log.extend_from_slice(root);
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_types::{DEPOSIT_METHOD_SIGNATURE, NOOP_METHOD_SIGNATURE, WITHDRAWAL_METHOD_SIGNATURE};

    #[test]
    fn method_selectors() {
        assert_eq!(hex::encode(selector(DEPOSIT_METHOD_SIGNATURE)), "a836913c");
        assert_eq!(hex::encode(selector(WITHDRAWAL_METHOD_SIGNATURE)), "64501675");
        assert_eq!(hex::encode(selector(NOOP_METHOD_SIGNATURE)), "e83a87ab");
    }

    #[test]
    fn word_arrays_are_length_prefixed() {
        assert_eq!(word_array(&[]).unwrap(), vec![0, 0]);
        let enc = word_array(&[[1u8; 32], [2u8; 32]]).unwrap();
        assert_eq!(enc.len(), 2 + 64);
        assert_eq!(&enc[..2], &[0, 2]);
        assert_eq!(enc[2], 1);
        assert_eq!(enc[34], 2);
    }

    #[test]
    fn proof_must_be_whole_words() {
        assert_eq!(proof_words(&[7u8; 64]).unwrap(), vec![[7u8; 32], [7u8; 32]]);
        assert!(proof_words(&[]).unwrap().is_empty());
        assert!(matches!(proof_words(b"proof"), Err(BuildError::MalformedProof(5))));
    }

    #[test]
    fn scalar_args() {
        assert_eq!(boolean(true), vec![0x80]);
        assert_eq!(boolean(false), vec![0x00]);
        assert_eq!(account(1), vec![1]);
        assert_eq!(address(&Address::from_public_key([9u8; 32])), vec![9u8; 32]);
    }

    #[test]
    fn return_value_roundtrip() {
        let log = encode_return(17, &[4u8; 32]);
        assert_eq!(log.len(), 44);
        assert_eq!(decode_return(&log), Some((17, [4u8; 32])));
        assert_eq!(decode_return(&log[..12]), None);
        assert_eq!(decode_return(&[0u8; 44]), None);
    }
}
