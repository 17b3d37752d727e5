//! `samlp:LogoutRequest` and `samlp:LogoutResponse`.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::types::{parse_instant, status_codes, SAMLP_NS, SAML_NS};
use crate::xml::Element;

use super::response::{check_in_response_to, check_status, status_code, status_message};
use super::validation::Rules;
use super::{check_trust, parse_root, structural_rules, Document, ProtocolMessage, ValidationContext};

/// A single logout request.
#[derive(Debug)]
pub struct LogoutRequest {
    pub(super) document: Document,
}

impl LogoutRequest {
    /// Parses a logout request.
    pub fn parse(xml: &str, context: ValidationContext) -> Self {
        Self::from_root(xml, parse_root(xml), context)
    }

    pub(crate) fn from_root(xml: &str, root: Result<Element, String>, context: ValidationContext) -> Self {
        Self {
            document: Document::new("LogoutRequest", xml, root, context),
        }
    }

    /// The `NameID` of the principal being logged out.
    pub fn name_id(&self) -> Option<String> {
        self.document.root()?.child_text(SAML_NS, "NameID")
    }

    /// The `Format` of the `NameID`.
    pub fn name_id_format(&self) -> Option<&str> {
        self.document.root()?.child(SAML_NS, "NameID")?.attr("Format")
    }

    /// Every `SessionIndex`.
    pub fn session_indexes(&self) -> Vec<String> {
        self.document
            .root()
            .into_iter()
            .flat_map(|root| root.children_named(SAMLP_NS, "SessionIndex"))
            .map(|index| index.text().trim().to_string())
            .collect()
    }

    /// `NotOnOrAfter`.
    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.document.root()?.attr("NotOnOrAfter").and_then(parse_instant)
    }

    /// `Reason`.
    pub fn reason(&self) -> Option<&str> {
        self.document.root()?.attr("Reason")
    }

    fn rules() -> Rules<Self> {
        structural_rules::<Self>().when_sound("trust", check_trust)
    }
}

impl ProtocolMessage for LogoutRequest {
    fn document(&self) -> &Document {
        &self.document
    }

    fn errors(&self) -> &[ValidationError] {
        self.document.errors_with(self, Self::rules)
    }
}

/// The answer to a logout request.
#[derive(Debug)]
pub struct LogoutResponse {
    pub(super) document: Document,
}

impl LogoutResponse {
    /// Parses a logout response.
    pub fn parse(xml: &str, context: ValidationContext) -> Self {
        Self::from_root(xml, parse_root(xml), context)
    }

    pub(crate) fn from_root(xml: &str, root: Result<Element, String>, context: ValidationContext) -> Self {
        Self {
            document: Document::new("LogoutResponse", xml, root, context),
        }
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

    fn rules() -> Rules<Self> {
        structural_rules::<Self>()
            .when_sound("status", |response, errors| check_status(&response.document, errors))
            .when_sound("in_response_to", |response, errors| {
                check_in_response_to(&response.document, errors);
            })
            .when_sound("trust", check_trust)
    }
}

impl ProtocolMessage for LogoutResponse {
    fn document(&self) -> &Document {
        &self.document
    }

    fn errors(&self) -> &[ValidationError] {
        self.document.errors_with(self, Self::rules)
    }
}
