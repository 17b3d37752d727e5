//! LogoutResponse builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use saml_crypto::random::generate_id;

use crate::config::Configuration;
use crate::document::{LogoutRequest, LogoutResponse, ProtocolMessage, ValidationContext};
use crate::error::SamlResult;
use crate::types::{status_codes, SamlBinding};
use crate::xml::Element;

use super::{protocol_root, sign, signer_for, status, MessageBuilder};

/// Builds a `samlp:LogoutResponse` answering a [`LogoutRequest`].
#[derive(Debug, Clone)]
pub struct LogoutResponseBuilder {
    configuration: Arc<Configuration>,
    /// Response ID.
    pub id: String,
    /// Issue instant.
    pub now: DateTime<Utc>,
    /// Where the response is sent.
    pub destination: Option<String>,
    /// ID of the request being answered.
    pub in_response_to: Option<String>,
    /// Status code.
    pub status_code: String,
    /// Optional status message.
    pub status_message: Option<String>,
    /// Embed an XML signature.
    pub embed_signature: bool,
}

impl LogoutResponseBuilder {
    /// Starts a successful response to `request`.
    ///
    /// The destination defaults to the requester's registered POST
    /// `SingleLogoutService`.
    pub fn new(configuration: Arc<Configuration>, request: &LogoutRequest) -> Self {
        let destination = request
            .issuer()
            .and_then(|issuer| configuration.metadata_for(&issuer))
            .and_then(|metadata| {
                metadata
                    .single_logout_service_for(SamlBinding::HttpPost)
                    .map(|endpoint| endpoint.location.clone())
            });
        let embed_signature = configuration.sign_outgoing;
        Self {
            configuration,
            id: generate_id(),
            now: Utc::now(),
            destination,
            in_response_to: request.id().map(ToString::to_string),
            status_code: status_codes::SUCCESS.to_string(),
            status_message: None,
            embed_signature,
        }
    }

    /// Replaces the status.
    #[must_use]
    pub fn status(mut self, code: &str, message: Option<&str>) -> Self {
        self.status_code = code.to_string();
        self.status_message = message.map(ToString::to_string);
        self
    }

    fn render(&self) -> Element {
        protocol_root(
            "LogoutResponse",
            &self.id,
            self.now,
            self.destination.as_deref(),
            &self.configuration.entity_id,
        )
        .with_optional_attr("InResponseTo", self.in_response_to.as_deref())
        .with_child(status(&self.status_code, self.status_message.as_deref()))
    }

    /// Renders and parses the response.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    pub fn build(&self) -> SamlResult<LogoutResponse> {
        let xml = self.to_xml()?;
        Ok(LogoutResponse::parse(&xml, ValidationContext::new(Arc::clone(&self.configuration))))
    }
}

impl MessageBuilder for LogoutResponseBuilder {
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
        Ok(sign(self.render(), signer.as_ref())?.to_xml())
    }
}
