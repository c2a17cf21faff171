//! Digest type
//!
//! Fixed-size SHA-256 digest used for the per-aggregate hash chain.
//! Serialized as lowercase hex so it survives the JSON boundary intact.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of a digest in bytes
pub const DIGEST_LEN: usize = 32;

/// SHA-256 digest
///
/// # Invariants
/// - Always exactly 32 bytes
/// - Hex form is 64 lowercase characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest([u8; DIGEST_LEN]);

/// Errors that can occur when parsing a Digest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("Digest must be {expected} hex characters (got {0})", expected = DIGEST_LEN * 2)]
    InvalidLength(usize),

    #[error("Invalid digest hex: {0}")]
    InvalidHex(String),
}

impl Digest {
    /// Prior hash of the first event of every aggregate
    pub const GENESIS: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hash an arbitrary sequence of byte slices
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }
}

/// Compute an event's own hash: `SHA-256(prior_hash ∥ payload ∥ sequence_number)`.
///
/// The payload is hashed in its compact serde_json form; object keys are
/// ordered, so equal values always produce the same bytes. The sequence
/// number is appended big-endian.
pub fn chain_hash(prior_hash: &Digest, payload: &Value, sequence_number: u64) -> Digest {
    let payload_bytes = payload.to_string();
    Digest::of_parts(&[
        prior_hash.as_bytes(),
        payload_bytes.as_bytes(),
        &sequence_number.to_be_bytes(),
    ])
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(DigestError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| DigestError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_genesis_is_all_zero() {
        assert_eq!(Digest::GENESIS.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_chain_hash_is_deterministic() {
        let payload = json!({ "total": 10, "currency": "EUR" });
        let a = chain_hash(&Digest::GENESIS, &payload, 1);
        let b = chain_hash(&Digest::GENESIS, &payload, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_chain_hash_depends_on_every_input() {
        let payload = json!({ "total": 10 });
        let base = chain_hash(&Digest::GENESIS, &payload, 1);

        assert_ne!(base, chain_hash(&Digest::GENESIS, &payload, 2));
        assert_ne!(base, chain_hash(&Digest::GENESIS, &json!({ "total": 11 }), 1));
        assert_ne!(base, chain_hash(&base, &payload, 1));
    }

    #[test]
    fn test_key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            chain_hash(&Digest::GENESIS, &a, 1),
            chain_hash(&Digest::GENESIS, &b, 1)
        );
    }

    #[test]
    fn test_hex_serde() {
        let digest = chain_hash(&Digest::GENESIS, &json!({}), 1);
        let encoded = serde_json::to_value(digest).unwrap();
        assert_eq!(encoded, Value::String(digest.to_hex()));

        let decoded: Digest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, digest);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("abc".parse::<Digest>(), Err(DigestError::InvalidLength(3)));
        assert!(matches!(
            "z".repeat(64).parse::<Digest>(),
            Err(DigestError::InvalidHex(_))
        ));
    }
}
