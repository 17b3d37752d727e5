//! LogoutRequest builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use saml_crypto::random::generate_id;

use crate::config::Configuration;
use crate::document::{LogoutRequest, ValidationContext};
use crate::error::SamlResult;
use crate::types::{NameIdFormat, SAMLP_NS, SAML_NS};
use crate::xml::Element;

use super::{protocol_root, sign, signer_for, MessageBuilder, UserClaims};

/// Builds a `samlp:LogoutRequest` for a user's session.
#[derive(Debug, Clone)]
pub struct LogoutRequestBuilder {
    configuration: Arc<Configuration>,
    /// Request ID.
    pub id: String,
    /// Issue instant.
    pub now: DateTime<Utc>,
    /// Where the request is sent.
    pub destination: Option<String>,
    /// The principal being logged out.
    pub name_id: String,
    /// Format of `name_id`.
    pub name_id_format: NameIdFormat,
    /// Sessions to terminate.
    pub session_index: Option<String>,
    /// Logout reason URI.
    pub reason: Option<String>,
    /// Embed an XML signature.
    pub embed_signature: bool,
}

impl LogoutRequestBuilder {
    /// Starts a logout request for `user`.
    pub fn new(configuration: Arc<Configuration>, user: &dyn UserClaims) -> Self {
        let name_id_format = NameIdFormat::Persistent;
        let embed_signature = configuration.sign_outgoing;
        Self {
            configuration,
            id: generate_id(),
            now: Utc::now(),
            destination: None,
            name_id: user.name_id_for(name_id_format.uri()),
            name_id_format,
            session_index: None,
            reason: None,
            embed_signature,
        }
    }

    /// Sets the session index to terminate.
    #[must_use]
    pub fn session_index(mut self, index: impl Into<String>) -> Self {
        self.session_index = Some(index.into());
        self
    }

    fn render(&self) -> Element {
        protocol_root(
            "LogoutRequest",
            &self.id,
            self.now,
            self.destination.as_deref(),
            &self.configuration.entity_id,
        )
        .with_optional_attr("Reason", self.reason.as_deref())
        .with_child(
            Element::new("saml:NameID", SAML_NS)
                .with_attr("Format", self.name_id_format.uri())
                .with_text(self.name_id.as_str()),
        )
        .with_optional_child(
            self.session_index
                .as_deref()
                .map(|index| Element::new("samlp:SessionIndex", SAMLP_NS).with_text(index)),
        )
    }

    /// Renders and parses the request.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    pub fn build(&self) -> SamlResult<LogoutRequest> {
        let xml = self.to_xml()?;
        Ok(LogoutRequest::parse(&xml, ValidationContext::new(Arc::clone(&self.configuration))))
    }
}

impl MessageBuilder for LogoutRequestBuilder {
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
