//! # saml-crypto
//!
//! Cryptographic operations for the SAML toolkit using aws-lc-rs.
//!
//! ## Interoperability
//!
//! SAML counterparts still sign with RSA-SHA1 and wrap keys with
//! RSA-OAEP-MGF1P or RSA PKCS#1 v1.5. This crate accepts all of them on the
//! receiving side but only emits SHA-256 or stronger signatures.
//!
//! - [`algorithm`]: URI tables for digest, signature, key transport and block ciphers
//! - [`hash`]: message digests
//! - [`signature`]: RSA PKCS#1 v1.5 signing and verification
//! - [`keys`]: certificates, private keys and fingerprints loaded from PEM
//! - [`cipher`]: AES content encryption and RSA key transport
//! - [`random`]: key material and identifiers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{BlockCipher, DigestAlgorithm, KeyTransport, SignatureAlgorithm};
pub use error::{CryptoError, CryptoResult};
pub use hash::{hash, sha1, sha256};
pub use keys::{Certificate, Fingerprint, KeyPair, KeyUse, PrivateKey};
