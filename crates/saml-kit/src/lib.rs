//! SAML 2.0 web single sign-on toolkit.
//!
//! This crate builds, parses, validates, signs, encrypts and transports the
//! messages exchanged between an identity provider and a service provider:
//!
//! - **Protocol documents** - AuthnRequest, Response, LogoutRequest,
//!   LogoutResponse and entity metadata, each with an ordered validation chain
//! - **XML signature** - Enveloped XML-DSig with exclusive canonicalization
//! - **XML encryption** - RSA key transport with AES content encryption, and
//!   decryption across rotated keys
//! - **Trust registry** - Counterpart metadata looked up by entity ID
//! - **POST and Redirect bindings** - Including Redirect transport signatures
//!
//! # Architecture
//!
//! - [`config`] - The local entity: keys, clock tolerances, signing policy
//! - [`registry`] - Registered counterparts
//! - [`xml`] - Element tree, canonicalization and the schema seam
//! - [`signature`] - XML signature signing and validation
//! - [`encryption`] - Assertion encryption and decryption
//! - [`document`] - Received documents and their validation
//! - [`builders`] - Outgoing documents
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use saml_kit::bindings::{Binding, BindingParams};
//! use saml_kit::builders::AuthnRequestBuilder;
//! use saml_kit::{ProtocolDocument, ValidationContext};
//!
//! let mut request = AuthnRequestBuilder::new(sp_config.clone());
//! let message = Binding::new(SamlBinding::HttpPost.uri(), sso_url).serialize(&mut request, None)?;
//!
//! let document = binding.deserialize(&BindingParams::from_form(form), ValidationContext::new(idp_config))?;
//! if !document.is_valid() {
//!     tracing::warn!("Rejected {}: {:?}", document.name(), document.errors());
//! }
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod builders;
pub mod config;
pub mod document;
pub mod encryption;
pub mod error;
pub mod registry;
pub mod signature;
pub mod types;
pub mod xml;

pub use config::{Configuration, ConfigurationBuilder, Settings};
pub use document::{Metadata, ProtocolDocument, ProtocolMessage, ValidationContext};
pub use error::{ErrorKind, SamlError, SamlResult, ValidationError};
pub use registry::{DefaultRegistry, TrustRegistry};
pub use types::*;
