//! `samlp:Response`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::encryption;
use crate::error::{ErrorKind, TrustFault, ValidationError};
use crate::types::{status_codes, SAMLP_NS, SAML_NS};
use crate::xml::{Element, Node, Path};

use super::validation::Rules;
use super::{
    check_trust_with, parse_root, structural_rules, verify_signature, Assertion, Document, ProtocolMessage,
    ValidationContext,
};

#[derive(Debug)]
enum AssertionState {
    Absent,
    Plain(Path),
    Decrypted(Path),
    Undecryptable,
}

/// A SAML response carrying the outcome of authentication.
///
/// An `EncryptedAssertion` is decrypted when the response is parsed, trying
/// the configured encryption keys newest first. The decrypted assertion is
/// placed in a copy of the tree; the received tree is kept as is so the
/// response signature still verifies.
#[derive(Debug)]
pub struct Response {
    pub(super) document: Document,
    decrypted: Option<Element>,
    assertion: AssertionState,
    assertion_signature: OnceLock<Option<Vec<ValidationError>>>,
}

impl Response {
    /// Parses a response.
    pub fn parse(xml: &str, context: ValidationContext) -> Self {
        Self::from_root(xml, parse_root(xml), context)
    }

    pub(crate) fn from_root(xml: &str, root: Result<Element, String>, context: ValidationContext) -> Self {
        let (decrypted, assertion) = match &root {
            Ok(root) if root.is(SAMLP_NS, "Response") => locate_assertion(root, &context),
            _ => (None, AssertionState::Absent),
        };
        Self {
            document: Document::new("Response", xml, root, context),
            decrypted,
            assertion,
            assertion_signature: OnceLock::new(),
        }
    }

    /// The assertion, decrypted if it arrived encrypted.
    pub fn assertion(&self) -> Option<Assertion<'_>> {
        match &self.assertion {
            AssertionState::Plain(path) => Assertion::new(self.document.root()?, path, false),
            AssertionState::Decrypted(path) => Assertion::new(self.decrypted.as_ref()?, path, true),
            AssertionState::Absent | AssertionState::Undecryptable => None,
        }
    }

    /// Returns true if the response carried an `EncryptedAssertion`.
    pub fn is_encrypted(&self) -> bool {
        matches!(
            self.assertion,
            AssertionState::Decrypted(_) | AssertionState::Undecryptable
        )
    }

    /// Returns true if an encrypted assertion could not be decrypted.
    pub fn is_undecryptable(&self) -> bool {
        matches!(self.assertion, AssertionState::Undecryptable)
    }

    /// `Status/StatusCode/@Value`.
    pub fn status_code(&self) -> Option<&str> {
        status_code(&self.document)
    }

    /// `Status/StatusMessage`.
    pub fn status_message(&self) -> Option<String> {
        status_message(&self.document)
    }

    /// Returns true if the status is Success.
    pub fn is_success(&self) -> bool {
        self.status_code() == Some(status_codes::SUCCESS)
    }

    /// The `InResponseTo` attribute.
    pub fn in_response_to(&self) -> Option<&str> {
        self.document.root()?.attr("InResponseTo")
    }

    /// The subject `NameID` of the assertion.
    pub fn name_id(&self) -> Option<String> {
        self.assertion()?.name_id()
    }

    /// Attributes of the assertion.
    pub fn attributes(&self) -> BTreeMap<String, Option<String>> {
        self.assertion()
            .map(|assertion| assertion.attributes())
            .unwrap_or_default()
    }

    fn rules() -> Rules<Self> {
        structural_rules::<Self>()
            .when_sound("status", |response, errors| check_status(&response.document, errors))
            .when_sound("in_response_to", |response, errors| {
                check_in_response_to(&response.document, errors);
            })
            .when_sound("assertion", |response, errors| response.check_assertion(errors))
            .when_sound("trust", |response, errors| {
                check_trust_with(response, response.has_trusted_assertion_signature(), errors);
            })
    }

    /// Verification result of the assertion's own signature, or `None` when
    /// the assertion is unsigned.
    ///
    /// The assertion issuer must be registered; an embedded certificate is
    /// only accepted when that issuer published it.
    fn assertion_signature_errors(&self) -> Option<&[ValidationError]> {
        self.assertion_signature
            .get_or_init(|| {
                let assertion = self.assertion()?;
                let signature = match assertion.signature()? {
                    Ok(signature) => signature,
                    Err(error) => return Some(vec![error]),
                };
                let registry = &self.document.context().configuration().registry;
                let Some(metadata) = assertion.issuer().and_then(|issuer| registry.lookup(&issuer)) else {
                    tracing::warn!(
                        "Assertion issuer {} is not registered",
                        assertion.issuer().unwrap_or_default()
                    );
                    return Some(vec![ValidationError::new(
                        "assertion_issuer",
                        ErrorKind::TrustViolation(TrustFault::Unregistered),
                        "is not registered.",
                    )]);
                };
                Some(verify_signature(assertion.root(), &signature, Some(&*metadata)))
            })
            .as_deref()
    }

    fn has_trusted_assertion_signature(&self) -> bool {
        self.assertion_signature_errors().is_some_and(<[ValidationError]>::is_empty)
    }

    fn check_assertion(&self, errors: &mut Vec<ValidationError>) {
        match &self.assertion {
            AssertionState::Undecryptable => {
                errors.push(ValidationError::new(
                    "assertion",
                    ErrorKind::DecryptionFailure,
                    "cannot be decrypted.",
                ));
                return;
            }
            AssertionState::Absent => {
                if self.is_success() {
                    errors.push(ValidationError::new("assertion", ErrorKind::Missing, "is missing."));
                }
                return;
            }
            AssertionState::Plain(_) | AssertionState::Decrypted(_) => {}
        }
        let Some(assertion) = self.assertion() else { return };

        let context = self.document.context();
        let configuration = context.configuration();
        assertion.check_conditions(
            &configuration.entity_id,
            context.now(),
            configuration.clock_drift,
            configuration.session_timeout,
            errors,
        );

        if let Some(signature_errors) = self.assertion_signature_errors() {
            errors.extend_from_slice(signature_errors);
        }
    }
}

impl ProtocolMessage for Response {
    fn document(&self) -> &Document {
        &self.document
    }

    fn errors(&self) -> &[ValidationError] {
        self.document.errors_with(self, Self::rules)
    }
}

fn locate_assertion(root: &Element, context: &ValidationContext) -> (Option<Element>, AssertionState) {
    let position = |name: &str| {
        root.children
            .iter()
            .position(|node| matches!(node, Node::Element(child) if child.is(SAML_NS, name)))
    };

    if let Some(index) = position("Assertion") {
        return (None, AssertionState::Plain(vec![index]));
    }
    let Some(index) = position("EncryptedAssertion") else {
        return (None, AssertionState::Absent);
    };
    let Some(encrypted) = root.at(&[index]) else {
        return (None, AssertionState::Absent);
    };

    let scope = root.scope_at(&[index]);
    match encryption::decrypt(encrypted, &scope, context.configuration().decryption_keys()) {
        Ok(assertion) => {
            let mut tree = root.clone();
            tree.children[index] = Node::Element(assertion);
            (Some(tree), AssertionState::Decrypted(vec![index]))
        }
        Err(e) => {
            tracing::warn!("Unable to decrypt assertion: {}", e);
            (None, AssertionState::Undecryptable)
        }
    }
}

pub(super) fn status_code(document: &Document) -> Option<&str> {
    document
        .root()?
        .descend(&[(SAMLP_NS, "Status"), (SAMLP_NS, "StatusCode")])?
        .attr("Value")
}

pub(super) fn status_message(document: &Document) -> Option<String> {
    document
        .root()?
        .child(SAMLP_NS, "Status")?
        .child_text(SAMLP_NS, "StatusMessage")
}

pub(super) fn check_status(document: &Document, errors: &mut Vec<ValidationError>) {
    if status_code(document) != Some(status_codes::SUCCESS) {
        tracing::debug!("{} status is {:?}", document.name(), status_code(document));
        errors.push(ValidationError::new(
            "status_code",
            ErrorKind::UnsuccessfulStatus,
            "must be Success.",
        ));
    }
}

pub(super) fn check_in_response_to(document: &Document, errors: &mut Vec<ValidationError>) {
    let Some(request_id) = document.context().request_id() else {
        return;
    };
    let in_response_to = document.root().and_then(|root| root.attr("InResponseTo"));
    if in_response_to != Some(request_id) {
        errors.push(ValidationError::new(
            "in_response_to",
            ErrorKind::InResponseToMismatch,
            "must match request ID.",
        ));
    }
}
