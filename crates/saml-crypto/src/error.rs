//! Error type for cryptographic operations.

use thiserror::Error;

/// Result alias for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Error type for cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid or unparseable certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// PEM armour could not be decoded.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature did not verify.
    #[error("signature verification failed")]
    Verification,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed. Deliberately carries no detail.
    #[error("decryption failed")]
    Decryption,

    /// Algorithm not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}
