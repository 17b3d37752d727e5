//! Response builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use saml_crypto::random::generate_id;
use saml_crypto::Certificate;

use crate::config::Configuration;
use crate::document::{AuthnRequest, ProtocolMessage, Response, ValidationContext};
use crate::encryption::{encrypt, EncryptionOptions};
use crate::error::SamlResult;
use crate::types::{
    format_instant, status_codes, AuthnContextClass, NameIdFormat, ATTRNAME_FORMAT_URI, BEARER,
    CONSENT_UNSPECIFIED, SAML_NS, SAML_VERSION,
};
use crate::xml::Element;

use super::{protocol_root, sign, signer_for, status, MessageBuilder, UserClaims};

/// Builds a `samlp:Response` answering an [`AuthnRequest`].
///
/// Defaults come from the request and from the requester's registered
/// metadata: the response goes to the request's ACS URL, the assertion is
/// restricted to the requester, and it is encrypted for the first encryption
/// certificate the requester publishes.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    configuration: Arc<Configuration>,
    /// Response ID.
    pub id: String,
    /// Assertion ID.
    pub assertion_id: String,
    /// Issue instant of both the response and the assertion.
    pub now: DateTime<Utc>,
    /// Where the response is delivered; also the bearer `Recipient`.
    pub destination: Option<String>,
    /// ID of the request being answered.
    pub in_response_to: Option<String>,
    /// Entity the assertion is restricted to.
    pub audience: Option<String>,
    /// Top-level status code.
    pub status_code: String,
    /// Optional status message.
    pub status_message: Option<String>,
    /// The subject's name identifier.
    pub name_id: String,
    /// Format of `name_id`.
    pub name_id_format: NameIdFormat,
    /// Released attributes.
    pub attributes: BTreeMap<String, String>,
    /// `AuthnStatement/@SessionIndex`.
    pub session_index: String,
    /// Authentication context class.
    pub authn_context_class: AuthnContextClass,
    /// Sign the response element.
    pub embed_signature: bool,
    /// Sign the assertion element.
    pub sign_assertion: bool,
    /// Encrypt the assertion for this certificate.
    pub encryption_certificate: Option<Certificate>,
    /// Algorithms for assertion encryption.
    pub encryption: EncryptionOptions,
}

impl ResponseBuilder {
    /// Starts a successful response to `request` for `user`.
    pub fn new(configuration: Arc<Configuration>, user: &dyn UserClaims, request: &AuthnRequest) -> Self {
        let audience = request.issuer();
        let recipient = audience
            .as_deref()
            .and_then(|issuer| configuration.metadata_for(issuer));
        let name_id_format = request
            .name_id_format()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default();
        let sign_assertion = configuration.sign_outgoing
            && recipient
                .as_ref()
                .is_none_or(|metadata| metadata.want_assertions_signed());
        let encryption_certificate = recipient
            .as_ref()
            .and_then(|metadata| metadata.encryption_certificates().first().map(|&cert| cert.clone()));

        Self {
            id: generate_id(),
            assertion_id: generate_id(),
            now: Utc::now(),
            destination: request.assertion_consumer_service_url(),
            in_response_to: request.id().map(ToString::to_string),
            audience,
            status_code: status_codes::SUCCESS.to_string(),
            status_message: None,
            name_id: user.name_id_for(name_id_format.uri()),
            name_id_format,
            attributes: user.assertion_attributes(),
            session_index: generate_id(),
            authn_context_class: AuthnContextClass::default(),
            embed_signature: configuration.sign_outgoing,
            sign_assertion,
            encryption_certificate,
            encryption: EncryptionOptions::default(),
            configuration,
        }
    }

    /// Replaces the status, e.g. to report a failed authentication.
    #[must_use]
    pub fn status(mut self, code: &str, message: Option<&str>) -> Self {
        self.status_code = code.to_string();
        self.status_message = message.map(ToString::to_string);
        self
    }

    /// Sets or clears the encryption certificate.
    #[must_use]
    pub fn encryption_certificate(mut self, certificate: Option<Certificate>) -> Self {
        self.encryption_certificate = certificate;
        self
    }

    fn assertion(&self) -> Element {
        let saml = |name: &str| Element::new(&format!("saml:{name}"), SAML_NS);
        let expires = format_instant(self.now + self.configuration.session_timeout);

        let subject = saml("Subject")
            .with_child(
                saml("NameID")
                    .with_attr("Format", self.name_id_format.uri())
                    .with_text(self.name_id.as_str()),
            )
            .with_child(
                saml("SubjectConfirmation").with_attr("Method", BEARER).with_child(
                    saml("SubjectConfirmationData")
                        .with_optional_attr("InResponseTo", self.in_response_to.as_deref())
                        .with_attr("NotOnOrAfter", expires.as_str())
                        .with_optional_attr("Recipient", self.destination.as_deref()),
                ),
            );

        let conditions = saml("Conditions")
            .with_attr("NotBefore", format_instant(self.now))
            .with_attr("NotOnOrAfter", expires.as_str())
            .with_optional_child(self.audience.as_deref().map(|audience| {
                saml("AudienceRestriction").with_child(saml("Audience").with_text(audience))
            }));

        let authn_statement = saml("AuthnStatement")
            .with_attr("AuthnInstant", format_instant(self.now))
            .with_attr("SessionIndex", self.session_index.as_str())
            .with_child(
                saml("AuthnContext").with_child(
                    saml("AuthnContextClassRef").with_text(self.authn_context_class.uri()),
                ),
            );

        let attribute_statement = (!self.attributes.is_empty()).then(|| {
            saml("AttributeStatement").with_children(self.attributes.iter().map(|(name, value)| {
                saml("Attribute")
                    .with_attr("Name", name.as_str())
                    .with_attr("NameFormat", ATTRNAME_FORMAT_URI)
                    .with_child(saml("AttributeValue").with_text(value.as_str()))
            }))
        });

        saml("Assertion")
            .declare("saml", SAML_NS)
            .with_attr("ID", self.assertion_id.as_str())
            .with_attr("IssueInstant", format_instant(self.now))
            .with_attr("Version", SAML_VERSION)
            .with_child(saml("Issuer").with_text(self.configuration.entity_id.as_str()))
            .with_child(subject)
            .with_child(conditions)
            .with_child(authn_statement)
            .with_optional_child(attribute_statement)
    }

    /// Signs the assertion on its own, then encrypts it if requested.
    fn sealed_assertion(&self) -> SamlResult<Element> {
        let signer = signer_for(&self.configuration, self.sign_assertion && self.embed_signature);
        let assertion = sign(self.assertion(), signer.as_ref())?;

        let Some(certificate) = &self.encryption_certificate else {
            return Ok(assertion);
        };
        tracing::debug!("Encrypting assertion {} for {:?}", self.assertion_id, self.audience);
        let encrypted = encrypt(&assertion, &[], certificate, self.encryption)?;
        Ok(Element::new("saml:EncryptedAssertion", SAML_NS).with_child(encrypted))
    }

    fn render(&self) -> SamlResult<Element> {
        let mut root = protocol_root(
            "Response",
            &self.id,
            self.now,
            self.destination.as_deref(),
            &self.configuration.entity_id,
        )
        .with_attr("Consent", CONSENT_UNSPECIFIED)
        .with_optional_attr("InResponseTo", self.in_response_to.as_deref())
        .with_child(status(&self.status_code, self.status_message.as_deref()));

        if self.status_code == status_codes::SUCCESS {
            root.push(self.sealed_assertion()?);
        }
        Ok(root)
    }

    /// Renders and parses the response.
    ///
    /// The parsed response is checked as the local entity would check it, so
    /// an encrypted assertion is only readable when the local configuration
    /// holds the recipient's key.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing or encryption fails.
    pub fn build(&self) -> SamlResult<Response> {
        let xml = self.to_xml()?;
        Ok(Response::parse(&xml, ValidationContext::new(Arc::clone(&self.configuration))))
    }
}

impl MessageBuilder for ResponseBuilder {
    fn message_key(&self) -> &'static str {
        "SAMLResponse"
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn set_destination(&mut self, destination: &str) {
        self.destination = Some(destination.to_string());
    }

    fn set_embedded_signature(&mut self, sign: bool) {
        self.embed_signature = sign;
    }

    fn to_xml(&self) -> SamlResult<String> {
        let signer = signer_for(&self.configuration, self.embed_signature);
        Ok(sign(self.render()?, signer.as_ref())?.to_xml())
    }
}
