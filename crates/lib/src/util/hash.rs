//! Fingerprints for resolved build layers.
//!
//! A fingerprint is a truncated SHA-256 of the JSON-serialized value. It lets an
//! operator confirm that two images carry exactly the same dependency set.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::FINGERPRINT_LEN;

pub type HashError = serde_json::Error;

/// Lowercase hexadecimal digest prefix, e.g. `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn fingerprint(&self) -> Result<Fingerprint, HashError> {
    let serialized = serde_json::to_string(self)?;
    let digest = hex::encode(Sha256::digest(serialized.as_bytes()));
    Ok(Fingerprint(digest[..FINGERPRINT_LEN].to_string()))
  }
}
