//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over exclusive canonicalization, as used
//! by every SAML profile:
//!
//! - [`XmlSigner`] produces `ds:Signature` templates and fills them in
//! - [`verify`] checks a parsed [`Signature`] against its document
//! - [`XmlSigner::sign_query`] and [`verify_query`] handle HTTP-Redirect
//!   transport signatures, which cover the query string instead of the XML
//!
//! Algorithms are resolved from the trailing `shaNNN` of their URI, so
//! counterparts that still sign with RSA-SHA1 verify.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use base64::Engine;
use saml_crypto::{Certificate, DigestAlgorithm, SignatureAlgorithm};

use crate::error::{ErrorKind, SignatureFault, ValidationError};
use crate::types::{canonicalization_algorithms, XMLDSIG_NS};
use crate::xml::{canonicalize, Element, Path};

/// A `ds:Signature` element read from a document.
#[derive(Debug, Clone)]
pub struct Signature {
    /// `Reference/@URI` without the leading `#`.
    pub reference_id: String,
    /// Digest algorithm of the reference.
    pub digest_method: DigestAlgorithm,
    /// Base64 digest value as carried.
    pub digest_value: String,
    /// Signature algorithm over `SignedInfo`.
    pub signature_method: SignatureAlgorithm,
    /// Base64 signature value as carried.
    pub signature_value: String,
    /// Embedded signing certificate.
    pub certificate: Option<Certificate>,
    reference_prefixes: Vec<String>,
    signed_info_prefixes: Vec<String>,
    path: Path,
}

impl Signature {
    /// Reads the signature that is a direct child of the element at `owner`.
    ///
    /// Returns `None` when the element is unsigned.
    pub fn find(root: &Element, owner: &[usize]) -> Option<Result<Self, ValidationError>> {
        let element = root.at(owner)?;
        let index = element.children.iter().position(|node| {
            matches!(node, crate::xml::Node::Element(child) if child.is(XMLDSIG_NS, "Signature"))
        })?;
        let mut path = owner.to_vec();
        path.push(index);
        Some(Self::read(root, path))
    }

    /// Reads the signature located at `path`.
    pub fn read(root: &Element, path: Path) -> Result<Self, ValidationError> {
        let element = root.at(&path).ok_or_else(|| malformed("is missing."))?;
        let signed_info = element
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| malformed("has no SignedInfo."))?;
        let reference = signed_info
            .child(XMLDSIG_NS, "Reference")
            .ok_or_else(|| malformed("has no Reference."))?;

        let reference_id = reference
            .attr("URI")
            .and_then(|uri| uri.strip_prefix('#'))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed("must reference an element by ID."))?
            .to_string();

        let digest_method = reference
            .child(XMLDSIG_NS, "DigestMethod")
            .and_then(|method| method.attr("Algorithm"))
            .map_or(DigestAlgorithm::Sha1, DigestAlgorithm::from_uri_suffix);
        let signature_method = signed_info
            .child(XMLDSIG_NS, "SignatureMethod")
            .and_then(|method| method.attr("Algorithm"))
            .map_or(SignatureAlgorithm::RsaSha1, SignatureAlgorithm::from_uri);

        let reference_prefixes = reference
            .child(XMLDSIG_NS, "Transforms")
            .into_iter()
            .flat_map(|transforms| transforms.children_named(XMLDSIG_NS, "Transform"))
            .find(|transform| is_exclusive_c14n(transform.attr("Algorithm")))
            .map(inclusive_prefixes)
            .unwrap_or_default();
        let signed_info_prefixes = signed_info
            .child(XMLDSIG_NS, "CanonicalizationMethod")
            .map(inclusive_prefixes)
            .unwrap_or_default();

        let certificate = element
            .descend(&[
                (XMLDSIG_NS, "KeyInfo"),
                (XMLDSIG_NS, "X509Data"),
                (XMLDSIG_NS, "X509Certificate"),
            ])
            .map(|node| Certificate::from_base64(&node.text()))
            .transpose()
            .map_err(|_| malformed("carries an unreadable certificate."))?;

        Ok(Self {
            reference_id,
            digest_method,
            digest_value: reference.child_text(XMLDSIG_NS, "DigestValue").unwrap_or_default(),
            signature_method,
            signature_value: element.child_text(XMLDSIG_NS, "SignatureValue").unwrap_or_default(),
            certificate,
            reference_prefixes,
            signed_info_prefixes,
            path,
        })
    }

    /// Location of the `ds:Signature` element.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Location of the signed element.
    pub fn owner_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }
}

/// Canonical bytes of the signed element with its enveloped signature removed.
fn reference_input(root: &Element, signature_path: &[usize], prefixes: &[String]) -> Option<String> {
    let owner_path = &signature_path[..signature_path.len().checked_sub(1)?];
    let owner = root.at(owner_path)?;
    let signature = root.at(signature_path)?;
    let scope = root.scope_at(owner_path);
    Some(canonicalize(owner, &scope, prefixes, Some(signature)))
}

/// Canonical bytes of `SignedInfo`.
fn signed_info_input(root: &Element, signature_path: &[usize], prefixes: &[String]) -> Option<String> {
    let signature = root.at(signature_path)?;
    let index = signature.children.iter().position(|node| {
        matches!(node, crate::xml::Node::Element(child) if child.is(XMLDSIG_NS, "SignedInfo"))
    })?;
    let mut path = signature_path.to_vec();
    path.push(index);
    let signed_info = root.at(&path)?;
    let scope = root.scope_at(&path);
    Some(canonicalize(signed_info, &scope, prefixes, None))
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .elements()
        .find(|child| {
            child.name == "InclusiveNamespaces"
                && child.namespace.as_deref() == Some(canonicalization_algorithms::EXCLUSIVE_C14N)
        })
        .and_then(|child| child.attr("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn is_exclusive_c14n(algorithm: Option<&str>) -> bool {
    matches!(
        algorithm,
        Some(canonicalization_algorithms::EXCLUSIVE_C14N | canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS)
    )
}

fn malformed(message: &str) -> ValidationError {
    ValidationError::new(
        "signature",
        ErrorKind::SignatureInvalid(SignatureFault::Malformed),
        message,
    )
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn decode(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}
