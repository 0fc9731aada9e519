//! Content-addressed identifiers.
//!
//! A short identifier is the uppercase hex of a BLAKE3 digest of the logical
//! name, truncated (via extendable output) to the configured length.

use facet::Facet;
use tabby_sql::ShortName;

use crate::{Error, Result};

/// Digest length used when nothing is configured, in bytes.
pub const DEFAULT_HASH_LENGTH: u32 = 22;

/// Accepted digest lengths, in bytes. Hex doubles them, and the longest must
/// stay under Postgres' 63-byte identifier limit.
pub const HASH_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 8..=31;

/// A digest configuration.
///
/// Variants can be built directly; [`validate`](Self::validate) checks the
/// length, and [`NameRegistry`](crate::NameRegistry) refuses invalid ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashAlgorithm {
    Blake3 { length: u32 },
    Blake3Keyed { length: u32, key: [u8; 32] },
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Blake3 {
            length: DEFAULT_HASH_LENGTH,
        }
    }
}

fn check_length(length: u32) -> Result<()> {
    if HASH_LENGTH_RANGE.contains(&length) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "hash length {length} is outside {}..={}",
            HASH_LENGTH_RANGE.start(),
            HASH_LENGTH_RANGE.end()
        )))
    }
}

impl HashAlgorithm {
    /// Build an algorithm from its configured parts.
    pub fn from_parts(name: &str, length: Option<u32>, key: Option<&[u8]>) -> Result<Self> {
        let length = length.unwrap_or(DEFAULT_HASH_LENGTH);
        check_length(length)?;

        match (name, key) {
            ("", _) => Err(Error::configuration("no hash algorithm selected")),
            ("blake3", None) => Ok(HashAlgorithm::Blake3 { length }),
            ("blake3", Some(_)) => Err(Error::configuration(
                "hash algorithm 'blake3' takes no key (use 'blake3-keyed')",
            )),
            ("blake3-keyed", Some(key)) => {
                let key: [u8; 32] = key.try_into().map_err(|_| {
                    Error::configuration(format!("hash key must be 32 bytes, got {}", key.len()))
                })?;
                Ok(HashAlgorithm::Blake3Keyed { length, key })
            }
            ("blake3-keyed", None) => Err(Error::configuration(
                "hash algorithm 'blake3-keyed' requires a key",
            )),
            (other, _) => Err(Error::configuration(format!(
                "unknown hash algorithm '{other}'"
            ))),
        }
    }

    /// Reject digest lengths outside [`HASH_LENGTH_RANGE`].
    pub fn validate(&self) -> Result<()> {
        check_length(self.length())
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Blake3 { .. } => "blake3",
            HashAlgorithm::Blake3Keyed { .. } => "blake3-keyed",
        }
    }

    pub fn length(&self) -> u32 {
        match self {
            HashAlgorithm::Blake3 { length } | HashAlgorithm::Blake3Keyed { length, .. } => *length,
        }
    }

    /// The persistable description of this algorithm. Keys are represented
    /// by a fingerprint, never stored.
    pub fn descriptor(&self) -> AlgorithmDescriptor {
        match self {
            HashAlgorithm::Blake3 { length } => AlgorithmDescriptor::Blake3 { length: *length },
            HashAlgorithm::Blake3Keyed { length, key } => AlgorithmDescriptor::Blake3Keyed {
                length: *length,
                key_id: key_fingerprint(key),
            },
        }
    }

    /// Short identifier for a logical name.
    pub fn short_name(&self, logical: &str) -> ShortName {
        ShortName::new(hex::encode_upper(digest(logical.as_bytes(), self)))
    }
}

/// Digest `input` with `algorithm`, producing `algorithm.length()` bytes.
pub fn digest(input: &[u8], algorithm: &HashAlgorithm) -> Vec<u8> {
    let mut hasher = match algorithm {
        HashAlgorithm::Blake3 { .. } => blake3::Hasher::new(),
        HashAlgorithm::Blake3Keyed { key, .. } => blake3::Hasher::new_keyed(key),
    };
    hasher.update(input);
    let mut out = vec![0u8; algorithm.length() as usize];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Fixed-width key a logical name is stored under in the lookup table
/// (64 uppercase hex characters, whatever the name's length).
pub fn name_key(logical: &str) -> String {
    hex::encode_upper(blake3::hash(logical.as_bytes()).as_bytes())
}

fn key_fingerprint(key: &[u8; 32]) -> String {
    let hash = blake3::hash(key);
    hex::encode_upper(&hash.as_bytes()[..8])
}

/// The algorithm that produced a stored short identifier, as persisted in
/// the name-lookup table (JSON, tagged by algorithm name).
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum AlgorithmDescriptor {
    #[facet(rename = "blake3")]
    Blake3 { length: u32 },
    #[facet(rename = "blake3-keyed")]
    Blake3Keyed { length: u32, key_id: String },
}

impl AlgorithmDescriptor {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmDescriptor::Blake3 { .. } => "blake3",
            AlgorithmDescriptor::Blake3Keyed { .. } => "blake3-keyed",
        }
    }

    pub fn length(&self) -> u32 {
        match self {
            AlgorithmDescriptor::Blake3 { length }
            | AlgorithmDescriptor::Blake3Keyed { length, .. } => *length,
        }
    }

    /// Fingerprint of the key, for keyed algorithms.
    pub fn key_id(&self) -> Option<&str> {
        match self {
            AlgorithmDescriptor::Blake3 { .. } => None,
            AlgorithmDescriptor::Blake3Keyed { key_id, .. } => Some(key_id),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        facet_json::to_string(self)
            .map_err(|e| Error::configuration(format!("cannot serialize hash algorithm: {e}")))
    }

    /// Parse a stored descriptor, rejecting unset or unknown algorithms.
    pub fn parse(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Err(Error::configuration("no hash algorithm selected"));
        }
        let descriptor: AlgorithmDescriptor = facet_json::from_str(json).map_err(|e| {
            Error::configuration(format!("unknown or unreadable hash algorithm '{json}': {e}"))
        })?;
        check_length(descriptor.length())?;
        Ok(descriptor)
    }
}
