//! RSA PKCS#1 v1.5 signatures.
//!
//! SHA-1 is accepted when verifying, since many deployed identity providers
//! still sign with it, but is refused when signing.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{self, UnparsedPublicKey, VerificationAlgorithm};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{Certificate, PrivateKey};

/// Signs data with an RSA private key.
///
/// # Arguments
///
/// * `key` - RSA private key
/// * `data` - Data to sign
/// * `algorithm` - Signature algorithm
///
/// # Errors
///
/// Returns an error if the key is unusable or the algorithm is SHA-1.
pub fn rsa_sign(key: &PrivateKey, data: &[u8], algorithm: SignatureAlgorithm) -> CryptoResult<Vec<u8>> {
    let padding: &'static dyn signature::RsaEncoding = match algorithm {
        SignatureAlgorithm::RsaSha1 => {
            return Err(CryptoError::UnsupportedAlgorithm(
                "RSA-SHA1 is not used for new signatures".to_string(),
            ))
        }
        SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
        SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
        SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
    };

    let key_pair = key.signing_key()?;
    let rng = SystemRandom::new();
    let mut sig = vec![0u8; key_pair.public_modulus_len()];

    key_pair
        .sign(padding, &rng, data, &mut sig)
        .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;

    Ok(sig)
}

/// Verifies an RSA signature against a certificate's public key.
///
/// # Arguments
///
/// * `certificate` - Certificate carrying the RSA public key
/// * `data` - Original data that was signed
/// * `sig` - Signature to verify
/// * `algorithm` - Signature algorithm
///
/// # Errors
///
/// Returns [`CryptoError::Verification`] if the signature does not match, or
/// an error if the certificate key cannot be read.
pub fn rsa_verify(
    certificate: &Certificate,
    data: &[u8],
    sig: &[u8],
    algorithm: SignatureAlgorithm,
) -> CryptoResult<()> {
    let verification_alg: &'static dyn VerificationAlgorithm = match algorithm {
        SignatureAlgorithm::RsaSha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
    };

    let public_key_der = certificate.rsa_public_key()?;
    UnparsedPublicKey::new(verification_alg, &public_key_der)
        .verify(data, sig)
        .map_err(|_| CryptoError::Verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyUse;
    use crate::KeyPair;

    fn idp() -> KeyPair {
        KeyPair::from_pem(
            include_str!("../../../testdata/idp.crt.pem"),
            include_str!("../../../testdata/idp.key.pem"),
            KeyUse::Signing,
        )
        .unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let pair = idp();
        for algorithm in [
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
        ] {
            let sig = rsa_sign(&pair.private_key, b"payload", algorithm).unwrap();
            assert_eq!(sig.len(), 256);
            rsa_verify(&pair.certificate, b"payload", &sig, algorithm).unwrap();
        }
    }

    #[test]
    fn tampered_payload_fails() {
        let pair = idp();
        let sig = rsa_sign(&pair.private_key, b"payload", SignatureAlgorithm::RsaSha256).unwrap();
        assert!(matches!(
            rsa_verify(&pair.certificate, b"payloaD", &sig, SignatureAlgorithm::RsaSha256),
            Err(CryptoError::Verification)
        ));
    }

    #[test]
    fn algorithm_mismatch_fails() {
        let pair = idp();
        let sig = rsa_sign(&pair.private_key, b"payload", SignatureAlgorithm::RsaSha256).unwrap();
        assert!(rsa_verify(&pair.certificate, b"payload", &sig, SignatureAlgorithm::RsaSha512).is_err());
    }

    #[test]
    fn wrong_certificate_fails() {
        let pair = idp();
        let other = Certificate::from_pem(include_str!("../../../testdata/sp.crt.pem")).unwrap();
        let sig = rsa_sign(&pair.private_key, b"payload", SignatureAlgorithm::RsaSha256).unwrap();
        assert!(rsa_verify(&other, b"payload", &sig, SignatureAlgorithm::RsaSha256).is_err());
    }

    #[test]
    fn refuses_to_sign_with_sha1() {
        let pair = idp();
        assert!(matches!(
            rsa_sign(&pair.private_key, b"payload", SignatureAlgorithm::RsaSha1),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }
}
