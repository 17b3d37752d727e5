//! SAML error types.
//!
//! Two families live here. [`SamlError`] is raised for caller misuse and
//! unrecoverable encoding problems. [`ValidationError`] describes a fault in
//! a message's content; those are collected into a document's error list and
//! never raised.

use std::fmt;

use thiserror::Error;

use crate::types::{status_codes, sub_status_codes};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Hard SAML failures.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Binding payload carried neither `SAMLRequest` nor `SAMLResponse`.
    #[error("Missing SAMLRequest or SAMLResponse")]
    MissingMessage,

    /// Binding payload carried only one of `Signature` and `SigAlg`.
    #[error("Signature and SigAlg must be supplied together")]
    MissingSignatureAlgorithm,

    /// Unknown or unsupported binding.
    #[error("Unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Redirect-binding signature did not verify.
    #[error("Invalid Signature: {0}")]
    TransportSignature(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// XML encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// A binding URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl SamlError {
    /// Returns the SAML status code a responder would report for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::MissingMessage
            | Self::MissingSignatureAlgorithm
            | Self::TransportSignature(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::InvalidUrl(_) => status_codes::REQUESTER,
            Self::UnsupportedBinding(_) => sub_status_codes::REQUEST_UNSUPPORTED,
            _ => status_codes::RESPONDER,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MissingMessage
            | Self::MissingSignatureAlgorithm
            | Self::UnsupportedBinding(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::InvalidUrl(_)
            | Self::XmlParse(_) => 400,
            Self::TransportSignature(_) => 401,
            _ => 500,
        }
    }
}

impl From<crate::xml::XmlError> for SamlError {
    fn from(err: crate::xml::XmlError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<url::ParseError> for SamlError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}

impl From<saml_crypto::CryptoError> for SamlError {
    fn from(err: saml_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

/// Which part of a signature failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureFault {
    /// The referenced content no longer matches its digest.
    Digest,
    /// The signature over `SignedInfo` does not verify.
    Cryptographic,
    /// The signature element is incomplete or references the wrong node.
    Malformed,
}

/// Why a document is not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustFault {
    /// The issuer has no registered metadata.
    Unregistered,
    /// The signing certificate is not one the issuer registered.
    FingerprintMismatch,
}

/// Which time or audience condition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalFault {
    /// The validity window has not opened yet.
    NotYetValid,
    /// The validity window has closed.
    Expired,
    /// The verifier is not among the audiences.
    AudienceMismatch,
}

/// Classification of a content validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is empty or not well-formed XML.
    ParseFailure,
    /// The content does not conform to the schema.
    SchemaViolation,
    /// The root element is not the one the variant expects.
    UnexpectedDocumentType,
    /// The `Version` attribute is not 2.0.
    VersionMismatch,
    /// A signature was required but none was found.
    SignatureMissing,
    /// The embedded signature is invalid.
    SignatureInvalid(SignatureFault),
    /// No candidate key could decrypt the encrypted content.
    DecryptionFailure,
    /// The issuer or its certificate is not trusted.
    TrustViolation(TrustFault),
    /// A time window or audience restriction failed.
    TemporalViolation(TemporalFault),
    /// `InResponseTo` does not match the outstanding request.
    InResponseToMismatch,
    /// The status code is not Success.
    UnsuccessfulStatus,
    /// A required value is absent.
    Missing,
}

/// A single content validation failure, keyed by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field the failure is reported against, e.g. `digest_value`.
    pub field: &'static str,
    /// The failure classification.
    pub kind: ErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(field: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}
