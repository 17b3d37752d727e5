//! Cryptographically secure random generation.
//!
//! This module provides secure random generation for:
//! - Content-encryption keys and nonces
//! - Protocol message identifiers

use rand::Rng;

/// Generates a cryptographically secure random byte array.
///
/// Uses the thread-local random number generator which is cryptographically
/// secure by default.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a protocol message identifier.
///
/// XML IDs must be NCNames, so the UUID is prefixed with an underscore to
/// guarantee the identifier never starts with a digit.
#[must_use]
pub fn generate_id() -> String {
    format!("_{}", uuid::Uuid::new_v4())
}
