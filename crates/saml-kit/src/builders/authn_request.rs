//! AuthnRequest builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use saml_crypto::random::generate_id;

use crate::config::Configuration;
use crate::document::{AuthnRequest, ValidationContext};
use crate::error::SamlResult;
use crate::types::{NameIdFormat, SamlBinding, SAMLP_NS};
use crate::xml::Element;

use super::{protocol_root, sign, signer_for, MessageBuilder};

/// Builds a `samlp:AuthnRequest` on behalf of a service provider.
#[derive(Debug, Clone)]
pub struct AuthnRequestBuilder {
    configuration: Arc<Configuration>,
    /// Request ID.
    pub id: String,
    /// Issue instant.
    pub now: DateTime<Utc>,
    /// Where the request is sent.
    pub destination: Option<String>,
    /// Where the response should be delivered.
    pub assertion_consumer_service_url: Option<String>,
    /// Binding the response should use.
    pub protocol_binding: Option<SamlBinding>,
    /// Requested `NameIDPolicy` format.
    pub name_id_format: NameIdFormat,
    /// Ask the IdP to reauthenticate.
    pub force_authn: bool,
    /// Ask the IdP not to interact with the user.
    pub is_passive: bool,
    /// Embed an XML signature.
    pub embed_signature: bool,
}

impl AuthnRequestBuilder {
    /// Creates a builder with a fresh ID and the current time.
    pub fn new(configuration: Arc<Configuration>) -> Self {
        let embed_signature = configuration.sign_outgoing;
        Self {
            configuration,
            id: generate_id(),
            now: Utc::now(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: Some(SamlBinding::HttpPost),
            name_id_format: NameIdFormat::default(),
            force_authn: false,
            is_passive: false,
            embed_signature,
        }
    }

    /// Sets the ACS URL.
    #[must_use]
    pub fn assertion_consumer_service_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the requested name ID format.
    #[must_use]
    pub const fn name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_format = format;
        self
    }

    /// Requests reauthentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    fn render(&self) -> Element {
        let mut root = protocol_root(
            "AuthnRequest",
            &self.id,
            self.now,
            self.destination.as_deref(),
            &self.configuration.entity_id,
        )
        .with_optional_attr("AssertionConsumerServiceURL", self.assertion_consumer_service_url.as_deref())
        .with_optional_attr("ProtocolBinding", self.protocol_binding.map(|binding| binding.uri()))
        .with_child(
            Element::new("samlp:NameIDPolicy", SAMLP_NS)
                .with_attr("Format", self.name_id_format.uri())
                .with_attr("AllowCreate", "true"),
        );
        if self.force_authn {
            root.set_attr("ForceAuthn", "true");
        }
        if self.is_passive {
            root.set_attr("IsPassive", "true");
        }
        root
    }

    /// Renders and parses the request.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    pub fn build(&self) -> SamlResult<AuthnRequest> {
        let xml = self.to_xml()?;
        Ok(AuthnRequest::parse(&xml, ValidationContext::new(Arc::clone(&self.configuration))))
    }
}

impl MessageBuilder for AuthnRequestBuilder {
    fn message_key(&self) -> &'static str {
        "SAMLRequest"
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
        Ok(sign(self.render(), signer.as_ref())?.to_xml())
    }
}
