use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 of a signal's canonical text, lowercase hex.
///
/// Used both as the record-store primary key and as the audit dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    pub fn of_text(canonical_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept a previously computed digest (e.g. read back from the ledger).
    pub fn parse(hex_digest: &str) -> Option<Self> {
        let valid = hex_digest.len() == Self::HEX_LEN
            && hex_digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex_digest.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines. Shorter values are returned whole.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
