//! XML Signature creation.
//!
//! Signing is two-phase. Builders embed a template with [`XmlSigner::embed`]
//! while assembling a message, then [`XmlSigner::finalize`] computes every
//! digest and signature value once the tree is complete.

use saml_crypto::signature::rsa_sign;
use saml_crypto::{hash, KeyPair, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::{Element, Node};

use super::{encode, reference_input, signed_info_input, Signature};

/// XML document signer.
///
/// Signs with a single key pair, normally the most recent signing pair of
/// the local [`Configuration`](crate::Configuration).
#[derive(Debug, Clone)]
pub struct XmlSigner {
    key_pair: KeyPair,
    algorithm: SignatureAlgorithm,
}

impl XmlSigner {
    /// Creates a signer.
    pub fn new(key_pair: KeyPair, algorithm: SignatureAlgorithm) -> Self {
        Self {
            key_pair,
            algorithm,
        }
    }

    /// Returns the signature algorithm.
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Builds an unfilled `ds:Signature` for the element with `reference_id`.
    pub fn template(&self, reference_id: &str) -> Element {
        let ds = |name: &str| Element::new(&format!("ds:{name}"), XMLDSIG_NS);
        let algorithm = |name: &str, uri: &str| ds(name).with_attr("Algorithm", uri);

        ds("Signature")
            .declare("ds", XMLDSIG_NS)
            .with_child(
                ds("SignedInfo")
                    .with_child(algorithm(
                        "CanonicalizationMethod",
                        canonicalization_algorithms::EXCLUSIVE_C14N,
                    ))
                    .with_child(algorithm("SignatureMethod", self.algorithm.uri()))
                    .with_child(
                        ds("Reference")
                            .with_attr("URI", format!("#{reference_id}"))
                            .with_child(
                                ds("Transforms")
                                    .with_child(algorithm(
                                        "Transform",
                                        transforms::ENVELOPED_SIGNATURE,
                                    ))
                                    .with_child(algorithm(
                                        "Transform",
                                        canonicalization_algorithms::EXCLUSIVE_C14N,
                                    )),
                            )
                            .with_child(algorithm("DigestMethod", self.algorithm.digest().uri()))
                            .with_child(ds("DigestValue")),
                    ),
            )
            .with_child(ds("SignatureValue"))
            .with_child(
                ds("KeyInfo").with_child(
                    ds("X509Data").with_child(
                        ds("X509Certificate").with_text(self.key_pair.certificate.to_base64()),
                    ),
                ),
            )
    }

    /// Places a template for `element`'s own ID right after its `Issuer`.
    pub fn embed(&self, element: &mut Element) -> SamlResult<()> {
        let id = element
            .id()
            .ok_or_else(|| SamlError::SignatureCreation(format!("{} has no ID", element.name)))?
            .to_string();
        let position = element
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(child) if child.is(SAML_NS, "Issuer")))
            .map_or(0, |index| index + 1);
        element.insert(position, self.template(&id));
        Ok(())
    }

    /// Fills in every unsigned template in the tree, innermost first.
    pub fn finalize(&self, root: &mut Element) -> SamlResult<()> {
        let mut templates = root.find_paths(|element| {
            element.is(XMLDSIG_NS, "Signature")
                && element
                    .child_text(XMLDSIG_NS, "SignatureValue")
                    .is_some_and(|value| value.is_empty())
        });
        templates.sort_by_key(|path| std::cmp::Reverse(path.len()));

        for path in templates {
            let signature =
                Signature::read(root, path.clone()).map_err(|e| SamlError::SignatureCreation(e.to_string()))?;

            let owner_id = root.at(signature.owner_path()).and_then(Element::id);
            if owner_id != Some(signature.reference_id.as_str()) {
                return Err(SamlError::SignatureCreation(format!(
                    "template references #{} but is not enveloped by it",
                    signature.reference_id
                )));
            }

            let canonical = reference_input(root, &path, &signature.reference_prefixes)
                .ok_or_else(|| SamlError::SignatureCreation("signed element vanished".to_string()))?;
            let digest = encode(&hash(signature.digest_method, canonical.as_bytes()));
            set_signature_text(root, &path, &["SignedInfo", "Reference", "DigestValue"], digest)?;

            let signed_info = signed_info_input(root, &path, &signature.signed_info_prefixes)
                .ok_or_else(|| SamlError::SignatureCreation("SignedInfo vanished".to_string()))?;
            let value = rsa_sign(
                &self.key_pair.private_key,
                signed_info.as_bytes(),
                signature.signature_method,
            )?;
            set_signature_text(root, &path, &["SignatureValue"], encode(&value))?;

            tracing::debug!("Signed element #{}", signature.reference_id);
        }
        Ok(())
    }

    /// Parses, finalizes and reserializes a document.
    pub fn finalize_xml(&self, xml: &str) -> SamlResult<String> {
        let mut root = Element::parse(xml)?;
        self.finalize(&mut root)?;
        Ok(root.to_xml())
    }

    /// Signs a canonical HTTP-Redirect query string and returns the base64
    /// signature value.
    pub fn sign_query(&self, query: &str) -> SamlResult<String> {
        let value = rsa_sign(&self.key_pair.private_key, query.as_bytes(), self.algorithm)?;
        Ok(encode(&value))
    }
}

fn set_signature_text(
    root: &mut Element,
    signature_path: &[usize],
    steps: &[&str],
    text: String,
) -> SamlResult<()> {
    let mut element = root
        .at_mut(signature_path)
        .ok_or_else(|| SamlError::SignatureCreation("signature vanished".to_string()))?;
    for step in steps {
        element = element
            .children
            .iter_mut()
            .find_map(|node| match node {
                Node::Element(child) if child.is(XMLDSIG_NS, step) => Some(child),
                _ => None,
            })
            .ok_or_else(|| SamlError::SignatureCreation(format!("template has no {step}")))?;
    }
    element.set_text(text);
    Ok(())
}
