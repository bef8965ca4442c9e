use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

const ADDRESS_LEN: usize = 58;
const PUBLIC_KEY_LEN: usize = 32;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must be {ADDRESS_LEN} characters, got {0}")]
    Length(usize),
    #[error("address is not valid base32")]
    Encoding,
    #[error("address checksum does not match")]
    Checksum,
}

/// A ledger account address.
///
/// The text form is base32 (no padding) of the 32-byte public key followed
/// by the last four bytes of its SHA-512/256 digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; PUBLIC_KEY_LEN]);

impl Address {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let s = input.trim();
        if s.len() != ADDRESS_LEN {
            return Err(AddressError::Length(s.len()));
        }
        let raw = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|_| AddressError::Encoding)?;
        if raw.len() != PUBLIC_KEY_LEN + CHECKSUM_LEN {
            return Err(AddressError::Encoding);
        }
        let (key, checksum) = raw.split_at(PUBLIC_KEY_LEN);
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(key);
        if checksum != self::checksum(&public_key) {
            return Err(AddressError::Checksum);
        }
        Ok(Self(public_key))
    }

    pub fn from_public_key(public_key: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(public_key)
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn encode(&self) -> String {
        let mut raw = [0u8; PUBLIC_KEY_LEN + CHECKSUM_LEN];
        raw[..PUBLIC_KEY_LEN].copy_from_slice(&self.0);
        raw[PUBLIC_KEY_LEN..].copy_from_slice(&checksum(&self.0));
        BASE32_NOPAD.encode(&raw)
    }
}

fn checksum(public_key: &[u8; PUBLIC_KEY_LEN]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha512_256::digest(public_key);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
    out
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

    #[test]
    fn known_addresses() {
        let zero = Address::parse(ZERO).unwrap();
        assert_eq!(zero.public_key(), &[0u8; 32]);
        assert_eq!(zero.to_string(), ZERO);

        let ones = Address::from_public_key([1u8; 32]);
        assert_eq!(
            ones.to_string(),
            "AEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEA5RCDXMI"
        );
        assert_eq!(Address::parse(&ones.to_string()).unwrap(), ones);
    }

    #[test]
    fn rejects_bad_checksum() {
        // right length and alphabet, wrong checksum
        assert_eq!(
            Address::parse(&"A".repeat(58)),
            Err(AddressError::Checksum)
        );
        let mut typo = ZERO.to_string();
        typo.replace_range(0..1, "B");
        assert_eq!(Address::parse(&typo), Err(AddressError::Checksum));
    }

    #[test]
    fn rejects_wrong_length_and_alphabet() {
        assert_eq!(Address::parse("ABC"), Err(AddressError::Length(3)));
        assert_eq!(
            Address::parse(&"a".repeat(58)),
            Err(AddressError::Encoding)
        );
        let digit = format!("{}1", &ZERO[..57]);
        assert_eq!(Address::parse(&digit), Err(AddressError::Encoding));
    }

    #[test]
    fn serde_validates() {
        let bad: Result<Address, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
        let good: Address = serde_json::from_str(&format!("\"{ZERO}\"")).unwrap();
        assert_eq!(serde_json::to_string(&good).unwrap(), format!("\"{ZERO}\""));
    }
}
