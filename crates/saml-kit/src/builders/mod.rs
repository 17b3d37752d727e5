//! Builders for outgoing documents.
//!
//! A builder is a plain struct whose public fields start out with sensible
//! defaults taken from the [`Configuration`]. Identifiers and the issue
//! instant are fixed when the builder is created, so rendering the same
//! builder twice yields the same message. [`MessageBuilder::to_xml`] renders,
//! signs and encrypts; `build()` additionally parses the result back into the
//! matching document type.

mod authn_request;
mod logout_request;
mod logout_response;
mod metadata;
mod response;

pub use authn_request::*;
pub use logout_request::*;
pub use logout_response::*;
pub use metadata::*;
pub use response::*;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::Configuration;
use crate::error::SamlResult;
use crate::signature::XmlSigner;
use crate::types::{format_instant, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::xml::Element;

/// The subject of an assertion or logout request.
pub trait UserClaims {
    /// The name identifier to use for `format`.
    fn name_id_for(&self, format: &str) -> String;

    /// Attributes released in the assertion.
    fn assertion_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// A builder a binding can serialize.
pub trait MessageBuilder {
    /// `SAMLRequest` or `SAMLResponse`.
    fn message_key(&self) -> &'static str;

    /// The configuration the message is built with.
    fn configuration(&self) -> &Configuration;

    /// Sets the `Destination`.
    fn set_destination(&mut self, destination: &str);

    /// Enables or disables the embedded XML signature.
    fn set_embedded_signature(&mut self, sign: bool);

    /// Renders the finalized XML.
    fn to_xml(&self) -> SamlResult<String>;
}

/// Starts a protocol message root with the common attributes and `Issuer`.
fn protocol_root(name: &str, id: &str, now: DateTime<Utc>, destination: Option<&str>, issuer: &str) -> Element {
    Element::new(&format!("samlp:{name}"), SAMLP_NS)
        .declare("samlp", SAMLP_NS)
        .declare("saml", SAML_NS)
        .with_attr("ID", id)
        .with_attr("Version", SAML_VERSION)
        .with_attr("IssueInstant", format_instant(now))
        .with_optional_attr("Destination", destination)
        .with_child(Element::new("saml:Issuer", SAML_NS).with_text(issuer))
}

/// Embeds a signature template when signing and fills every template in.
fn sign(mut root: Element, signer: Option<&XmlSigner>) -> SamlResult<Element> {
    if let Some(signer) = signer {
        signer.embed(&mut root)?;
        signer.finalize(&mut root)?;
    }
    Ok(root)
}

/// The signer to use, honouring a per-builder opt-out.
fn signer_for(configuration: &Configuration, sign: bool) -> Option<XmlSigner> {
    if sign {
        configuration.signer()
    } else {
        None
    }
}

fn status(code: &str, message: Option<&str>) -> Element {
    Element::new("samlp:Status", SAMLP_NS)
        .with_child(Element::new("samlp:StatusCode", SAMLP_NS).with_attr("Value", code))
        .with_optional_child(message.map(|message| {
            Element::new("samlp:StatusMessage", SAMLP_NS).with_text(message)
        }))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use super::UserClaims;

    pub struct User;

    impl UserClaims for User {
        fn name_id_for(&self, format: &str) -> String {
            if format.ends_with("emailAddress") {
                "alice@example.com".to_string()
            } else {
                "alice".to_string()
            }
        }

        fn assertion_attributes(&self) -> BTreeMap<String, String> {
            BTreeMap::from([
                ("email".to_string(), "alice@example.com".to_string()),
                ("role".to_string(), "admin".to_string()),
            ])
        }
    }
}
