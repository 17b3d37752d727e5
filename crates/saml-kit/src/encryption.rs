//! XML Encryption of assertions.
//!
//! Content is encrypted under a fresh AES key, which is itself wrapped for
//! the recipient's RSA certificate. Decryption walks the candidate private
//! keys in order and accepts the first one for which both the key unwrap
//! and the content decryption succeed. Which of the two steps failed is
//! never reported.

use base64::Engine;
use saml_crypto::cipher::{decrypt_content, encrypt_content, generate_key, unwrap_key, wrap_key};
use saml_crypto::{BlockCipher, Certificate, DigestAlgorithm, KeyTransport, PrivateKey};
use thiserror::Error;

use crate::error::{SamlError, SamlResult};
use crate::types::{XMLDSIG_NS, XMLENC_ELEMENT, XMLENC_NS};
use crate::xml::{canonicalize, Element, NamespaceDecl};

/// Decryption failures.
#[derive(Debug, Error)]
pub enum DecryptionError {
    /// Required encryption markup is missing or unreadable.
    #[error("encrypted element is malformed: {0}")]
    Malformed(String),

    /// The content cipher is not supported.
    #[error("unsupported algorithm: {0}")]
    Unsupported(String),

    /// Every candidate key failed.
    #[error("no candidate key could decrypt the content")]
    NoMatchingKey,
}

/// Algorithms used when encrypting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncryptionOptions {
    /// Content cipher.
    pub cipher: BlockCipher,
    /// Key transport for the content key.
    pub key_transport: KeyTransport,
}

/// Encrypts `fragment` for `recipient`, returning an `xenc:EncryptedData`.
///
/// `scope` holds namespace declarations inherited from the fragment's
/// ancestors, so the plaintext is self-contained.
pub fn encrypt(
    fragment: &Element,
    scope: &[NamespaceDecl],
    recipient: &Certificate,
    options: EncryptionOptions,
) -> SamlResult<Element> {
    let plaintext = canonicalize(fragment, scope, &[], None);
    let key = generate_key(options.cipher);
    let ciphertext = encrypt_content(options.cipher, &key, plaintext.as_bytes())
        .map_err(|e| SamlError::Encryption(e.to_string()))?;
    let wrapped = wrap_key(options.key_transport, recipient, &key)
        .map_err(|e| SamlError::Encryption(e.to_string()))?;

    let mut key_method = xenc("EncryptionMethod").with_attr("Algorithm", options.key_transport.uri());
    if options.key_transport == KeyTransport::RsaOaepMgf1p {
        key_method.push(
            Element::new("ds:DigestMethod", XMLDSIG_NS)
                .with_attr("Algorithm", DigestAlgorithm::Sha1.uri()),
        );
    }

    Ok(xenc("EncryptedData")
        .declare("xenc", XMLENC_NS)
        .with_attr("Type", XMLENC_ELEMENT)
        .with_child(xenc("EncryptionMethod").with_attr("Algorithm", options.cipher.uri()))
        .with_child(
            Element::new("ds:KeyInfo", XMLDSIG_NS)
                .declare("ds", XMLDSIG_NS)
                .with_child(
                    xenc("EncryptedKey")
                        .with_child(key_method)
                        .with_child(cipher_data(&wrapped)),
                ),
        )
        .with_child(cipher_data(&ciphertext)))
}

/// Decrypts an `xenc:EncryptedData`, or a container such as
/// `saml:EncryptedAssertion` holding one.
///
/// The `EncryptedKey` may sit inside `EncryptedData/KeyInfo` or next to
/// `EncryptedData` in the container. `scope` is the namespace scope of
/// `encrypted` in its document; the plaintext is parsed against it.
pub fn decrypt<'a>(
    encrypted: &Element,
    scope: &[NamespaceDecl],
    keys: impl IntoIterator<Item = &'a PrivateKey>,
) -> Result<Element, DecryptionError> {
    let data = if encrypted.is(XMLENC_NS, "EncryptedData") {
        encrypted
    } else {
        encrypted
            .child(XMLENC_NS, "EncryptedData")
            .ok_or_else(|| DecryptionError::Malformed("no EncryptedData".to_string()))?
    };

    let cipher_uri = data
        .child(XMLENC_NS, "EncryptionMethod")
        .and_then(|method| method.attr("Algorithm"))
        .ok_or_else(|| DecryptionError::Malformed("no content EncryptionMethod".to_string()))?;
    let cipher =
        BlockCipher::from_uri(cipher_uri).map_err(|_| DecryptionError::Unsupported(cipher_uri.to_string()))?;
    let ciphertext = cipher_value(data)
        .ok_or_else(|| DecryptionError::Malformed("no content CipherValue".to_string()))?;

    let encrypted_keys: Vec<(KeyTransport, Vec<u8>)> = data
        .child(XMLDSIG_NS, "KeyInfo")
        .into_iter()
        .flat_map(|info| info.children_named(XMLENC_NS, "EncryptedKey"))
        .chain(encrypted.children_named(XMLENC_NS, "EncryptedKey"))
        .filter_map(read_encrypted_key)
        .collect();
    if encrypted_keys.is_empty() {
        return Err(DecryptionError::Malformed("no usable EncryptedKey".to_string()));
    }

    for (index, private_key) in keys.into_iter().enumerate() {
        for (transport, wrapped) in &encrypted_keys {
            let plaintext = unwrap_key(*transport, private_key, wrapped, cipher.key_len())
                .and_then(|key| decrypt_content(cipher, &key, &ciphertext));
            let Ok(plaintext) = plaintext else {
                continue;
            };
            let parsed = std::str::from_utf8(&plaintext)
                .ok()
                .and_then(|xml| Element::parse_fragment(xml, scope).ok());
            if let Some(element) = parsed {
                tracing::debug!("Decrypted {} with candidate key {}", element.name, index);
                return Ok(element);
            }
        }
        tracing::debug!("Candidate key {} could not decrypt", index);
    }

    tracing::warn!("No candidate key could decrypt the encrypted element");
    Err(DecryptionError::NoMatchingKey)
}

fn read_encrypted_key(encrypted_key: &Element) -> Option<(KeyTransport, Vec<u8>)> {
    let method = encrypted_key.child(XMLENC_NS, "EncryptionMethod")?;
    let transport = KeyTransport::from_uri(method.attr("Algorithm")?).ok()?;
    if let Some(digest) = method
        .child(XMLDSIG_NS, "DigestMethod")
        .and_then(|digest| digest.attr("Algorithm"))
    {
        if digest != DigestAlgorithm::Sha1.uri() {
            tracing::debug!("Skipping EncryptedKey with OAEP digest {}", digest);
            return None;
        }
    }
    Some((transport, cipher_value(encrypted_key)?))
}

fn cipher_value(element: &Element) -> Option<Vec<u8>> {
    let text = element
        .descend(&[(XMLENC_NS, "CipherData"), (XMLENC_NS, "CipherValue")])?
        .text();
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}

fn cipher_data(bytes: &[u8]) -> Element {
    xenc("CipherData").with_child(
        xenc("CipherValue").with_text(base64::engine::general_purpose::STANDARD.encode(bytes)),
    )
}

fn xenc(name: &str) -> Element {
    Element::new(&format!("xenc:{name}"), XMLENC_NS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SAML_NS;

    fn certificate(pem: &str) -> Certificate {
        Certificate::from_pem(pem).unwrap()
    }

    fn key(pem: &str) -> PrivateKey {
        PrivateKey::from_pem(pem).unwrap()
    }

    fn assertion() -> Element {
        Element::new("saml:Assertion", SAML_NS)
            .declare("saml", SAML_NS)
            .with_attr("ID", "_a")
            .with_child(Element::new("saml:Issuer", SAML_NS).with_text("idp.test"))
    }

    #[test]
    fn round_trip_with_every_cipher() {
        let sp_cert = certificate(include_str!("../../../testdata/sp.crt.pem"));
        let sp_key = key(include_str!("../../../testdata/sp.key.pem"));

        for cipher in [
            BlockCipher::Aes128Cbc,
            BlockCipher::Aes192Cbc,
            BlockCipher::Aes256Cbc,
            BlockCipher::Aes128Gcm,
            BlockCipher::Aes256Gcm,
        ] {
            for key_transport in [KeyTransport::RsaOaepMgf1p, KeyTransport::Rsa15] {
                let options = EncryptionOptions {
                    cipher,
                    key_transport,
                };
                let encrypted = encrypt(&assertion(), &[], &sp_cert, options).unwrap();
                let decrypted = decrypt(&encrypted, &[], [&sp_key]).unwrap();
                assert_eq!(decrypted, assertion());
            }
        }
    }

    #[test]
    fn finds_key_anywhere_in_candidate_list() {
        let sp_cert = certificate(include_str!("../../../testdata/sp.crt.pem"));
        let sp_key = key(include_str!("../../../testdata/sp.key.pem"));
        let rotated = key(include_str!("../../../testdata/rotated.key.pem"));
        let idp = key(include_str!("../../../testdata/idp.key.pem"));

        let encrypted = encrypt(&assertion(), &[], &sp_cert, EncryptionOptions::default()).unwrap();
        assert!(decrypt(&encrypted, &[], [&rotated, &idp, &sp_key]).is_ok());
        assert!(decrypt(&encrypted, &[], [&sp_key, &rotated]).is_ok());
        assert!(matches!(
            decrypt(&encrypted, &[], [&rotated, &idp]),
            Err(DecryptionError::NoMatchingKey)
        ));
        assert!(matches!(
            decrypt(&encrypted, &[], std::iter::empty::<&PrivateKey>()),
            Err(DecryptionError::NoMatchingKey)
        ));
    }

    #[test]
    fn accepts_sibling_encrypted_key() {
        let sp_cert = certificate(include_str!("../../../testdata/sp.crt.pem"));
        let sp_key = key(include_str!("../../../testdata/sp.key.pem"));

        let mut data = encrypt(&assertion(), &[], &sp_cert, EncryptionOptions::default()).unwrap();
        let key_info_index = data
            .children
            .iter()
            .position(|node| matches!(node, crate::xml::Node::Element(e) if e.is(XMLDSIG_NS, "KeyInfo")))
            .unwrap();
        let crate::xml::Node::Element(key_info) = data.children.remove(key_info_index) else {
            unreachable!()
        };
        let encrypted_key = key_info.child(XMLENC_NS, "EncryptedKey").unwrap().clone();

        let container = Element::new("saml:EncryptedAssertion", SAML_NS)
            .declare("saml", SAML_NS)
            .with_child(data)
            .with_child(encrypted_key);
        assert_eq!(decrypt(&container, &[], [&sp_key]).unwrap(), assertion());
    }

    #[test]
    fn decrypted_fragment_uses_enclosing_scope() {
        let sp_cert = certificate(include_str!("../../../testdata/sp.crt.pem"));
        let sp_key = key(include_str!("../../../testdata/sp.key.pem"));
        let scope = vec![NamespaceDecl::new("saml", SAML_NS)];

        let bare = Element::new("saml:Assertion", SAML_NS).with_attr("ID", "_a");
        let encrypted = encrypt(&bare, &scope, &sp_cert, EncryptionOptions::default()).unwrap();
        let decrypted = decrypt(&encrypted, &scope, [&sp_key]).unwrap();
        assert!(decrypted.is(SAML_NS, "Assertion"));
    }

    #[test]
    fn rejects_unknown_cipher() {
        let sp_key = key(include_str!("../../../testdata/sp.key.pem"));
        let data = xenc("EncryptedData")
            .declare("xenc", XMLENC_NS)
            .with_child(xenc("EncryptionMethod").with_attr("Algorithm", "urn:rot13"));
        assert!(matches!(
            decrypt(&data, &[], [&sp_key]),
            Err(DecryptionError::Unsupported(_))
        ));
    }
}
