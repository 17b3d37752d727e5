//! SAML bindings.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded and
//!   URL-encoded, and signed at the transport level
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//!
//! # Usage
//!
//! ```rust,ignore
//! use saml_kit::bindings::{Binding, BindingParams};
//!
//! let binding = Binding::from_endpoint(idp.single_sign_on_service_for(SamlBinding::HttpRedirect)?);
//! let message = binding.serialize(&mut AuthnRequestBuilder::new(config), Some("state"))?;
//! // redirect the browser to message.location
//!
//! let document = binding.deserialize(&BindingParams::from_url(&url)?, ValidationContext::new(config))?;
//! ```

mod post;
mod redirect;

pub use redirect::MAX_INFLATED_SIZE;

use crate::builders::MessageBuilder;
use crate::document::{Endpoint, ProtocolDocument, ValidationContext};
use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// A transport endpoint of a counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// HTTP-Redirect binding.
    HttpRedirect {
        /// Endpoint URL.
        location: String,
    },
    /// HTTP-POST binding.
    HttpPost {
        /// Endpoint URL.
        location: String,
    },
    /// Any other binding; serializing or deserializing fails.
    Unsupported {
        /// Binding URI.
        binding: String,
        /// Endpoint URL.
        location: String,
    },
}

impl Binding {
    /// Creates a binding from its URI and location.
    pub fn new(binding: &str, location: impl Into<String>) -> Self {
        let location = location.into();
        match SamlBinding::from_uri(binding) {
            Some(SamlBinding::HttpRedirect) => Self::HttpRedirect { location },
            Some(SamlBinding::HttpPost) => Self::HttpPost { location },
            _ => Self::Unsupported {
                binding: binding.to_string(),
                location,
            },
        }
    }

    /// Creates the binding for a metadata endpoint.
    pub fn from_endpoint(endpoint: &Endpoint) -> Self {
        Self::new(&endpoint.binding, endpoint.location.clone())
    }

    /// Endpoint URL.
    pub fn location(&self) -> &str {
        match self {
            Self::HttpRedirect { location }
            | Self::HttpPost { location }
            | Self::Unsupported { location, .. } => location,
        }
    }

    /// Binding URI.
    pub fn binding_uri(&self) -> &str {
        match self {
            Self::HttpRedirect { .. } => SamlBinding::HttpRedirect.uri(),
            Self::HttpPost { .. } => SamlBinding::HttpPost.uri(),
            Self::Unsupported { binding, .. } => binding,
        }
    }

    /// Returns true if this is `binding`.
    pub fn is(&self, binding: SamlBinding) -> bool {
        self.binding_uri() == binding.uri()
    }

    /// Encodes the builder's message for this endpoint.
    ///
    /// The builder's destination is set to the endpoint location.
    ///
    /// ## Errors
    ///
    /// Fails for unsupported bindings and when rendering, signing or
    /// compressing the message fails.
    pub fn serialize(
        &self,
        builder: &mut dyn MessageBuilder,
        relay_state: Option<&str>,
    ) -> SamlResult<SerializedMessage> {
        match self {
            Self::HttpRedirect { location } => redirect::serialize(location, builder, relay_state),
            Self::HttpPost { location } => post::serialize(location, builder, relay_state),
            Self::Unsupported { binding, .. } => Err(SamlError::UnsupportedBinding(binding.clone())),
        }
    }

    /// Decodes and parses a received message.
    ///
    /// ## Errors
    ///
    /// Fails when the parameters carry no message, when the payload cannot
    /// be decoded, when a redirect transport signature is incomplete or does
    /// not verify, and for unsupported bindings.
    pub fn deserialize(&self, params: &BindingParams, context: ValidationContext) -> SamlResult<ProtocolDocument> {
        match self {
            Self::HttpRedirect { .. } => redirect::deserialize(params, context),
            Self::HttpPost { .. } => post::deserialize(params, context),
            Self::Unsupported { binding, .. } => Err(SamlError::UnsupportedBinding(binding.clone())),
        }
    }
}

/// An encoded outgoing message.
///
/// For HTTP-Redirect the `location` carries the whole message and `params`
/// is empty; for HTTP-POST the parameters are the form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedMessage {
    /// Target URL.
    pub location: String,
    /// Form fields, in order.
    pub params: Vec<(String, String)>,
}

impl SerializedMessage {
    /// Returns the value of a form field.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Renders an HTML page that posts the fields to `location` on load.
    pub fn to_html_form(&self) -> String {
        post::html_form(&self.location, &self.params)
    }
}

#[derive(Debug, Clone)]
struct Param {
    key: String,
    raw: String,
    value: String,
}

/// Parameters received on a binding endpoint.
///
/// Values are kept both decoded and in the URL-encoded form they arrived
/// in, since a redirect transport signature covers the encoded form.
#[derive(Debug, Clone, Default)]
pub struct BindingParams {
    params: Vec<Param>,
}

impl BindingParams {
    /// Parses a raw query string, with or without a leading `?`.
    pub fn from_query(query: &str) -> Self {
        let params = query
            .trim_start_matches('?')
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter_map(|segment| {
                let (key, value) = url::form_urlencoded::parse(segment.as_bytes()).next()?;
                let raw = segment.split_once('=').map_or("", |(_, raw)| raw);
                Some(Param {
                    key: key.into_owned(),
                    raw: raw.to_string(),
                    value: value.into_owned(),
                })
            })
            .collect();
        Self { params }
    }

    /// Parses the query string of a full URL.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::InvalidUrl`] if `url` does not parse.
    pub fn from_url(url: &str) -> SamlResult<Self> {
        let parsed = url::Url::parse(url)?;
        Ok(Self::from_query(parsed.query().unwrap_or_default()))
    }

    /// Builds parameters from already decoded form fields.
    pub fn from_form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let params = fields
            .into_iter()
            .map(|(key, value)| {
                let value = value.into();
                Param {
                    key: key.into(),
                    raw: urlencoding::encode(&value).into_owned(),
                    value,
                }
            })
            .collect();
        Self { params }
    }

    fn find(&self, key: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.key == key)
    }

    /// Decoded value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.find(key).map(|param| param.value.as_str())
    }

    /// Value of `key` as received on the wire.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.find(key).map(|param| param.raw.as_str())
    }

    /// `RelayState`.
    pub fn relay_state(&self) -> Option<&str> {
        self.get("RelayState")
    }

    /// `SAMLRequest` or `SAMLResponse`, whichever is present and not blank.
    pub fn message_key(&self) -> Option<&'static str> {
        ["SAMLRequest", "SAMLResponse"]
            .into_iter()
            .find(|key| self.get(key).is_some_and(|value| !value.trim().is_empty()))
    }

    fn message(&self) -> SamlResult<(&'static str, &str)> {
        let key = self.message_key().ok_or(SamlError::MissingMessage)?;
        let value = self.get(key).ok_or(SamlError::MissingMessage)?;
        Ok((key, value))
    }
}
