//! XML Signature validation.
//!
//! Verification never fails hard: every problem becomes a
//! [`ValidationError`] so documents can report all of them at once.

use saml_crypto::signature::rsa_verify;
use saml_crypto::{hash, Certificate, SignatureAlgorithm};
use subtle::ConstantTimeEq;

use crate::error::{ErrorKind, SignatureFault, ValidationError};
use crate::xml::Element;

use super::{decode, malformed, reference_input, signed_info_input, Signature};

/// Verifies a signature read from `root`.
///
/// The reference must point at the element that envelops the signature, and
/// that element's ID must be unique in the document. The digest is
/// recomputed and compared, then the signature over `SignedInfo` is checked
/// with `certificate`, falling back to the embedded certificate.
pub fn verify(root: &Element, signature: &Signature, certificate: Option<&Certificate>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let owner_id = root.at(signature.owner_path()).and_then(Element::id);
    if owner_id != Some(signature.reference_id.as_str()) {
        errors.push(malformed("must reference the element that contains it."));
        return errors;
    }
    if root.count_ids(&signature.reference_id) != 1 {
        errors.push(malformed("references an ID that is not unique."));
        return errors;
    }

    let Some(canonical) = reference_input(root, signature.path(), &signature.reference_prefixes) else {
        errors.push(malformed("is missing."));
        return errors;
    };
    let computed = hash(signature.digest_method, canonical.as_bytes());
    let carried = decode(&signature.digest_value).unwrap_or_default();
    if !bool::from(computed.ct_eq(&carried)) {
        tracing::debug!("Digest mismatch for #{}", signature.reference_id);
        errors.push(ValidationError::new(
            "digest_value",
            ErrorKind::SignatureInvalid(SignatureFault::Digest),
            "is invalid.",
        ));
    }

    let Some(certificate) = certificate.or(signature.certificate.as_ref()) else {
        errors.push(malformed("carries no certificate."));
        return errors;
    };
    let verified = match (
        signed_info_input(root, signature.path(), &signature.signed_info_prefixes),
        decode(&signature.signature_value),
    ) {
        (Some(signed_info), Some(value)) => rsa_verify(
            certificate,
            signed_info.as_bytes(),
            &value,
            signature.signature_method,
        )
        .is_ok(),
        _ => false,
    };
    if !verified {
        tracing::debug!("Signature over SignedInfo for #{} does not verify", signature.reference_id);
        errors.push(ValidationError::new(
            "signature",
            ErrorKind::SignatureInvalid(SignatureFault::Cryptographic),
            "is invalid.",
        ));
    }

    errors
}

/// Builds the canonical HTTP-Redirect string that a transport signature
/// covers. Values are taken exactly as they appear URL-encoded on the wire.
pub fn signed_query(message_key: &str, message: &str, relay_state: Option<&str>, sig_alg: Option<&str>) -> String {
    let mut query = format!("{message_key}={message}");
    if let Some(relay_state) = relay_state {
        query.push_str("&RelayState=");
        query.push_str(relay_state);
    }
    if let Some(sig_alg) = sig_alg {
        query.push_str("&SigAlg=");
        query.push_str(sig_alg);
    }
    query
}

/// Verifies an HTTP-Redirect transport signature.
///
/// `sig_alg` is the decoded `SigAlg` URI and `signature` the decoded base64
/// value.
pub fn verify_query(certificate: &Certificate, query: &str, sig_alg: &str, signature: &str) -> bool {
    let Some(value) = decode(signature) else {
        return false;
    };
    rsa_verify(
        certificate,
        query.as_bytes(),
        &value,
        SignatureAlgorithm::from_uri(sig_alg),
    )
    .is_ok()
}
