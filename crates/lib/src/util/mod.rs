//! Shared utilities.
//!
//! Fingerprinting of resolved layers and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
