//! `samlp:AuthnRequest`.

use crate::error::{ErrorKind, ValidationError};
use crate::types::{SamlBinding, SAMLP_NS};
use crate::xml::Element;

use super::validation::Rules;
use super::{check_trust, parse_root, structural_rules, Document, ProtocolMessage, ValidationContext};

/// An authentication request from a service provider.
#[derive(Debug)]
pub struct AuthnRequest {
    pub(super) document: Document,
}

impl AuthnRequest {
    /// Parses an authentication request.
    pub fn parse(xml: &str, context: ValidationContext) -> Self {
        Self::from_root(xml, parse_root(xml), context)
    }

    pub(crate) fn from_root(xml: &str, root: Result<Element, String>, context: ValidationContext) -> Self {
        Self {
            document: Document::new("AuthnRequest", xml, root, context),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.document.root()?.attr(name)
    }

    /// Where the response should be sent.
    ///
    /// The `AssertionConsumerServiceURL` attribute wins; otherwise the
    /// issuer's registered SP metadata is consulted, preferring an endpoint
    /// with the requested `ProtocolBinding` and honouring
    /// `AssertionConsumerServiceIndex`.
    pub fn assertion_consumer_service_url(&self) -> Option<String> {
        if let Some(url) = self.attr("AssertionConsumerServiceURL") {
            return Some(url.to_string());
        }

        let issuer = self.issuer()?;
        let metadata = self.document.context().configuration().registry.lookup(&issuer)?;
        let sp = metadata.service_provider()?;
        let endpoint = match self.assertion_consumer_service_index() {
            Some(index) => sp.assertion_consumer_service_at(index),
            None => sp.assertion_consumer_service_for(self.protocol_binding()),
        };
        endpoint.map(|endpoint| endpoint.location.clone())
    }

    /// `AssertionConsumerServiceIndex`.
    pub fn assertion_consumer_service_index(&self) -> Option<u16> {
        self.attr("AssertionConsumerServiceIndex")?.parse().ok()
    }

    /// `ProtocolBinding`, if it names a known binding.
    pub fn protocol_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(self.attr("ProtocolBinding")?)
    }

    /// `NameIDPolicy/@Format`.
    pub fn name_id_format(&self) -> Option<&str> {
        self.document
            .root()?
            .child(SAMLP_NS, "NameIDPolicy")?
            .attr("Format")
    }

    /// `ForceAuthn`.
    pub fn force_authn(&self) -> bool {
        self.attr("ForceAuthn") == Some("true")
    }

    /// `IsPassive`.
    pub fn is_passive(&self) -> bool {
        self.attr("IsPassive") == Some("true")
    }

    fn rules() -> Rules<Self> {
        structural_rules::<Self>()
            .when_sound("assertion_consumer_service", |request, errors| {
                if request.assertion_consumer_service_url().is_none() {
                    errors.push(ValidationError::new(
                        "assertion_consumer_service_url",
                        ErrorKind::Missing,
                        "is missing.",
                    ));
                }
            })
            .when_sound("trust", check_trust)
    }
}

impl ProtocolMessage for AuthnRequest {
    fn document(&self) -> &Document {
        &self.document
    }

    fn errors(&self) -> &[ValidationError] {
        self.document.errors_with(self, Self::rules)
    }
}
