//! Protocol documents.
//!
//! Every received message is parsed into a [`ProtocolDocument`]. Parsing
//! never fails: malformed input becomes [`InvalidDocument`], and everything
//! wrong with a well-formed message is reported by
//! [`ProtocolMessage::errors`]. Validation runs once, in a fixed order:
//!
//! 1. content is present and well-formed
//! 2. the schema accepts it
//! 3. the root element is the expected one
//! 4. `Version` is 2.0
//! 5. message specific rules (status, `InResponseTo`, assertion, ACS)
//! 6. trust: the issuer is registered and its signature verifies
//!
//! Steps 5 and 6 only run when steps 1 through 4 reported nothing.

mod assertion;
mod authn_request;
mod invalid;
mod logout;
mod metadata;
mod response;
pub(crate) mod validation;

pub use assertion::*;
pub use authn_request::*;
pub use invalid::*;
pub use logout::*;
pub use metadata::*;
pub use response::*;

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use saml_crypto::Certificate;

use crate::config::Configuration;
use crate::error::{ErrorKind, TrustFault, ValidationError};
use crate::signature::{self, Signature};
use crate::types::{parse_instant, SAMLP_NS, SAML_NS, SAML_VERSION};
use crate::xml::Element;

use validation::Rules;

/// What a received document is checked against.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    configuration: Arc<Configuration>,
    now: DateTime<Utc>,
    request_id: Option<String>,
}

impl ValidationContext {
    /// Creates a context that validates at the current time.
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self {
            configuration,
            now: Utc::now(),
            request_id: None,
        }
    }

    /// Validates as if the current time were `now`.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Expects the document to answer the request with `request_id`.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The local configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The validation instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The outstanding request, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// The parsed content shared by every protocol message.
#[derive(Debug)]
pub struct Document {
    name: &'static str,
    content: String,
    root: Result<Element, String>,
    context: ValidationContext,
    transport_verified: bool,
    errors: OnceLock<Vec<ValidationError>>,
}

impl Document {
    pub(crate) fn new(
        name: &'static str,
        content: &str,
        root: Result<Element, String>,
        context: ValidationContext,
    ) -> Self {
        Self {
            name,
            content: content.to_string(),
            root,
            context,
            transport_verified: false,
            errors: OnceLock::new(),
        }
    }

    /// Local name of the expected root element.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The parsed tree, if the content was well-formed.
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref().ok()
    }

    /// The parser diagnostic, if the content was not well-formed.
    pub fn parse_error(&self) -> Option<&str> {
        self.root.as_ref().err().map(String::as_str)
    }

    /// The context the document is validated in.
    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// True once the binding verified a transport signature over the
    /// message.
    pub fn is_transport_verified(&self) -> bool {
        self.transport_verified
    }

    fn is_expected_type(&self) -> bool {
        self.root().is_some_and(|root| root.is(SAMLP_NS, self.name))
    }

    fn mark_transport_verified(&mut self) {
        self.transport_verified = true;
        self.errors = OnceLock::new();
    }

    fn errors_with<T>(&self, target: &T, rules: fn() -> Rules<T>) -> &[ValidationError] {
        self.errors.get_or_init(|| rules().run(target))
    }
}

/// Accessors and validation shared by every protocol message.
pub trait ProtocolMessage {
    /// The shared document content.
    fn document(&self) -> &Document;

    /// Validation errors, computed on first access.
    fn errors(&self) -> &[ValidationError];

    /// Returns true if validation found nothing wrong.
    fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// Local name of the root element, e.g. `Response`.
    fn name(&self) -> &'static str {
        self.document().name()
    }

    /// The `ID` attribute.
    fn id(&self) -> Option<&str> {
        self.document().root()?.id()
    }

    /// The `saml:Issuer` value.
    fn issuer(&self) -> Option<String> {
        self.document().root()?.child_text(SAML_NS, "Issuer")
    }

    /// The `Version` attribute.
    fn version(&self) -> Option<&str> {
        self.document().root()?.attr("Version")
    }

    /// The `Destination` attribute.
    fn destination(&self) -> Option<&str> {
        self.document().root()?.attr("Destination")
    }

    /// The `IssueInstant` attribute.
    fn issue_instant(&self) -> Option<DateTime<Utc>> {
        self.document().root()?.attr("IssueInstant").and_then(parse_instant)
    }

    /// The XML as received.
    fn content(&self) -> &str {
        &self.document().content
    }

    /// The XML as received.
    fn to_xml(&self) -> &str {
        self.content()
    }

    /// The enveloped signature of the root element.
    fn signature(&self) -> Option<Result<Signature, ValidationError>> {
        Signature::find(self.document().root()?, &[])
    }

    /// Returns true if the root element carries a signature.
    fn is_signed(&self) -> bool {
        self.signature().is_some()
    }
}

/// Any received protocol message.
#[derive(Debug)]
pub enum ProtocolDocument {
    /// `samlp:AuthnRequest`.
    AuthnRequest(AuthnRequest),
    /// `samlp:Response`.
    Response(Response),
    /// `samlp:LogoutRequest`.
    LogoutRequest(LogoutRequest),
    /// `samlp:LogoutResponse`.
    LogoutResponse(LogoutResponse),
    /// `md:EntityDescriptor`.
    Metadata(Metadata),
    /// Anything else.
    Invalid(InvalidDocument),
}

impl ProtocolDocument {
    /// Parses a message, choosing the variant from its root element.
    pub fn parse(xml: &str, context: ValidationContext) -> Self {
        let root = match Element::parse(xml) {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!("Unable to parse SAML document: {}", e);
                return Self::Invalid(InvalidDocument::new(xml, Some(e.to_string()), context));
            }
        };

        tracing::debug!("Parsed SAML document with root {}", root.name);
        match root.name.as_str() {
            "AuthnRequest" => Self::AuthnRequest(AuthnRequest::from_root(xml, Ok(root), context)),
            "Response" => Self::Response(Response::from_root(xml, Ok(root), context)),
            "LogoutRequest" => Self::LogoutRequest(LogoutRequest::from_root(xml, Ok(root), context)),
            "LogoutResponse" => Self::LogoutResponse(LogoutResponse::from_root(xml, Ok(root), context)),
            "EntityDescriptor" => {
                Self::Metadata(Metadata::parse_with_schema(xml, Arc::clone(&context.configuration.schema)))
            }
            other => {
                tracing::warn!("Unrecognized SAML document root {}", other);
                Self::Invalid(InvalidDocument::new(xml, None, context))
            }
        }
    }

    /// Marks the message as covered by a verified transport signature, so
    /// the embedded signature is not required to validate it.
    #[must_use]
    pub fn with_transport_signature_verified(mut self) -> Self {
        let document = match &mut self {
            Self::AuthnRequest(request) => &mut request.document,
            Self::Response(response) => &mut response.document,
            Self::LogoutRequest(request) => &mut request.document,
            Self::LogoutResponse(response) => &mut response.document,
            Self::Invalid(invalid) => &mut invalid.document,
            Self::Metadata(_) => return self,
        };
        document.mark_transport_verified();
        self
    }

    fn message(&self) -> Option<&dyn ProtocolMessage> {
        match self {
            Self::AuthnRequest(request) => Some(request),
            Self::Response(response) => Some(response),
            Self::LogoutRequest(request) => Some(request),
            Self::LogoutResponse(response) => Some(response),
            Self::Invalid(invalid) => Some(invalid),
            Self::Metadata(_) => None,
        }
    }

    /// Local name of the document type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Metadata(_) => "EntityDescriptor",
            _ => self.message().map_or("InvalidDocument", ProtocolMessage::name),
        }
    }

    /// The `ID` attribute.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Metadata(metadata) => metadata.id(),
            _ => self.message()?.id(),
        }
    }

    /// The issuer; for metadata, its entity ID.
    pub fn issuer(&self) -> Option<String> {
        match self {
            Self::Metadata(metadata) => metadata.entity_id().map(str::to_string),
            _ => self.message()?.issuer(),
        }
    }

    /// The `Version` attribute; metadata has none.
    pub fn version(&self) -> Option<&str> {
        self.message()?.version()
    }

    /// The `Destination` attribute; metadata has none.
    pub fn destination(&self) -> Option<&str> {
        self.message()?.destination()
    }

    /// The `IssueInstant` attribute; metadata has none.
    pub fn issue_instant(&self) -> Option<DateTime<Utc>> {
        self.message()?.issue_instant()
    }

    /// The XML as received.
    pub fn content(&self) -> &str {
        match self {
            Self::Metadata(metadata) => metadata.content(),
            _ => self.message().map_or("", ProtocolMessage::content),
        }
    }

    /// The XML as received.
    pub fn to_xml(&self) -> &str {
        self.content()
    }

    /// Returns true if the root element carries a signature.
    pub fn is_signed(&self) -> bool {
        match self {
            Self::Metadata(metadata) => metadata.is_signed(),
            _ => self.message().is_some_and(ProtocolMessage::is_signed),
        }
    }

    /// Validation errors, computed on first access.
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Self::Metadata(metadata) => metadata.errors(),
            _ => self.message().map_or(&[] as &[ValidationError], |message| message.errors()),
        }
    }

    /// Returns true if validation found nothing wrong.
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    /// The document as an `AuthnRequest`.
    pub fn as_authn_request(&self) -> Option<&AuthnRequest> {
        match self {
            Self::AuthnRequest(request) => Some(request),
            _ => None,
        }
    }

    /// The document as a `Response`.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }

    /// The document as a `LogoutRequest`.
    pub fn as_logout_request(&self) -> Option<&LogoutRequest> {
        match self {
            Self::LogoutRequest(request) => Some(request),
            _ => None,
        }
    }

    /// The document as a `LogoutResponse`.
    pub fn as_logout_response(&self) -> Option<&LogoutResponse> {
        match self {
            Self::LogoutResponse(response) => Some(response),
            _ => None,
        }
    }

    /// The document as metadata.
    pub fn as_metadata(&self) -> Option<&Metadata> {
        match self {
            Self::Metadata(metadata) => Some(metadata),
            _ => None,
        }
    }
}

/// Parses `xml`, keeping the diagnostic on failure.
pub(crate) fn parse_root(xml: &str) -> Result<Element, String> {
    Element::parse(xml).map_err(|e| {
        tracing::warn!("Unable to parse SAML document: {}", e);
        e.to_string()
    })
}

/// Content, schema, root element and version checks.
pub(crate) fn structural_rules<T: ProtocolMessage>() -> Rules<T> {
    Rules::<T>::new()
        .always("content", |message, errors| {
            let document = message.document();
            if document.content.trim().is_empty() {
                errors.push(ValidationError::new("content", ErrorKind::ParseFailure, "can't be blank."));
            } else if let Some(parse_error) = document.parse_error() {
                errors.push(ValidationError::new("content", ErrorKind::ParseFailure, parse_error));
            }
        })
        .when(
            "schema",
            |message, _| message.document().root().is_some(),
            |message, errors| {
                let document = message.document();
                let Some(root) = document.root() else { return };
                errors.extend(
                    document
                        .context
                        .configuration
                        .schema
                        .validate(root)
                        .into_iter()
                        .map(|violation| ValidationError::new("schema", ErrorKind::SchemaViolation, violation)),
                );
            },
        )
        .when(
            "expected_type",
            |message, _| message.document().root().is_some(),
            |message, errors| {
                let document = message.document();
                if !document.is_expected_type() {
                    errors.push(ValidationError::new(
                        "base",
                        ErrorKind::UnexpectedDocumentType,
                        format!("must contain {}.", document.name),
                    ));
                }
            },
        )
        .when(
            "version",
            |message, _| message.document().is_expected_type(),
            |message, errors| {
                if message.version() != Some(SAML_VERSION) {
                    errors.push(ValidationError::new("version", ErrorKind::VersionMismatch, "must be 2.0."));
                }
            },
        )
}

/// Issuer registration and signature trust.
pub(crate) fn check_trust<T: ProtocolMessage>(message: &T, errors: &mut Vec<ValidationError>) {
    check_trust_with(message, false, errors);
}

/// Like [`check_trust`]. `signed_within` is set when a trusted signature on
/// an inner element satisfies `require_signed_documents`.
pub(crate) fn check_trust_with<T: ProtocolMessage>(
    message: &T,
    signed_within: bool,
    errors: &mut Vec<ValidationError>,
) {
    let document = message.document();
    let Some(root) = document.root() else { return };
    let configuration = document.context.configuration();

    let metadata = message
        .issuer()
        .and_then(|issuer| configuration.registry.lookup(&issuer));
    if metadata.is_none() {
        tracing::warn!(
            "{} issuer {} is not registered",
            document.name,
            message.issuer().unwrap_or_default()
        );
        errors.push(ValidationError::new(
            "provider",
            ErrorKind::TrustViolation(TrustFault::Unregistered),
            "is not registered.",
        ));
    }

    match message.signature() {
        Some(Err(error)) => errors.push(error),
        Some(Ok(_)) if document.transport_verified => {}
        Some(Ok(signature)) => errors.extend(verify_signature(root, &signature, metadata.as_deref())),
        None if !document.transport_verified && !signed_within && configuration.require_signed_documents => {
            errors.push(ValidationError::new("signature", ErrorKind::SignatureMissing, "is required."));
        }
        None => {}
    }
}

/// Verifies a signature and checks that its certificate is one the signer
/// registered.
///
/// Without an embedded certificate each registered signing certificate is
/// tried in turn.
pub(crate) fn verify_signature(
    root: &Element,
    signature: &Signature,
    metadata: Option<&Metadata>,
) -> Vec<ValidationError> {
    if let Some(embedded) = &signature.certificate {
        let mut errors = signature::verify(root, signature, Some(embedded));
        if errors.is_empty() && metadata.is_some_and(|metadata| !is_registered(metadata, embedded)) {
            tracing::warn!("Signing certificate {} is not registered", embedded.fingerprint());
            errors.push(ValidationError::new(
                "fingerprint",
                ErrorKind::TrustViolation(TrustFault::FingerprintMismatch),
                "does not match.",
            ));
        }
        return errors;
    }

    let candidates = metadata.map(Metadata::signing_certificates).unwrap_or_default();
    if candidates.is_empty() {
        return signature::verify(root, signature, None);
    }
    let mut errors = Vec::new();
    for certificate in candidates {
        errors = signature::verify(root, signature, Some(certificate));
        if errors.is_empty() {
            break;
        }
    }
    errors
}

fn is_registered(metadata: &Metadata, certificate: &Certificate) -> bool {
    metadata.matches(&certificate.fingerprint()).is_some()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use saml_crypto::{KeyPair, KeyUse};

    use crate::config::Configuration;
    use crate::document::Metadata;
    use crate::registry::{DefaultRegistry, TrustRegistry};

    pub const IDP_CERT: &str = include_str!("../../../../testdata/idp.crt.pem");
    pub const IDP_KEY: &str = include_str!("../../../../testdata/idp.key.pem");
    pub const SP_CERT: &str = include_str!("../../../../testdata/sp.crt.pem");
    pub const SP_KEY: &str = include_str!("../../../../testdata/sp.key.pem");
    pub const ROTATED_CERT: &str = include_str!("../../../../testdata/rotated.crt.pem");
    pub const ROTATED_KEY: &str = include_str!("../../../../testdata/rotated.key.pem");

    pub fn pair(certificate: &str, key: &str, key_use: KeyUse) -> KeyPair {
        KeyPair::from_pem(certificate, key, key_use).unwrap()
    }

    fn certificate_b64(pem: &str) -> String {
        saml_crypto::Certificate::from_pem(pem).unwrap().to_base64()
    }

    pub fn idp_metadata() -> String {
        format!(
            r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="idp.test"><IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol" WantAuthnRequestsSigned="true"><KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></KeyDescriptor><SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp.test/logout"/><SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.test/sso"/></IDPSSODescriptor></EntityDescriptor>"#,
            certificate_b64(IDP_CERT)
        )
    }

    pub fn sp_metadata() -> String {
        format!(
            r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="sp.test"><SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol" WantAssertionsSigned="true"><KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></KeyDescriptor><KeyDescriptor use="encryption"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></KeyDescriptor><SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.test/logout"/><AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.test/acs" index="0" isDefault="true"/></SPSSODescriptor></EntityDescriptor>"#,
            certificate_b64(SP_CERT),
            certificate_b64(SP_CERT)
        )
    }

    /// IdP configuration that trusts `sp.test`.
    pub fn idp() -> Arc<Configuration> {
        let registry = DefaultRegistry::new();
        registry.register_metadata(Metadata::parse(&sp_metadata())).unwrap();
        Arc::new(
            Configuration::builder("idp.test")
                .signing_key_pair(pair(IDP_CERT, IDP_KEY, KeyUse::Signing))
                .registry(Arc::new(registry))
                .build()
                .unwrap(),
        )
    }

    /// SP configuration that trusts `idp.test`.
    pub fn sp() -> Arc<Configuration> {
        let registry = DefaultRegistry::new();
        registry.register_metadata(Metadata::parse(&idp_metadata())).unwrap();
        Arc::new(
            Configuration::builder("sp.test")
                .signing_key_pair(pair(SP_CERT, SP_KEY, KeyUse::Signing))
                .encryption_key_pair(pair(SP_CERT, SP_KEY, KeyUse::Encryption))
                .registry(Arc::new(registry))
                .build()
                .unwrap(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn context() -> ValidationContext {
        ValidationContext::new(fixtures::sp())
    }

    #[test]
    fn dispatches_on_root_name() {
        let request = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"/>"#;
        assert!(matches!(
            ProtocolDocument::parse(request, context()),
            ProtocolDocument::AuthnRequest(_)
        ));

        let metadata = ProtocolDocument::parse(&fixtures::idp_metadata(), context());
        assert_eq!(metadata.name(), "EntityDescriptor");
        assert_eq!(metadata.issuer().as_deref(), Some("idp.test"));
        assert!(metadata.is_valid(), "{:?}", metadata.errors());

        let other = ProtocolDocument::parse("<Unknown/>", context());
        assert!(matches!(other, ProtocolDocument::Invalid(_)));
        assert!(!other.is_valid());
    }

    #[test]
    fn malformed_content_is_invalid_not_an_error() {
        let document = ProtocolDocument::parse("<samlp:Response", context());
        assert_eq!(document.name(), "InvalidDocument");
        assert_eq!(document.errors()[0].kind, ErrorKind::ParseFailure);
        assert_eq!(document.id(), None);
    }

    #[test]
    fn unregistered_issuer_is_untrusted() {
        let xml = r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"><saml:Issuer>stranger.test</saml:Issuer><saml:NameID>alice</saml:NameID></samlp:LogoutRequest>"#;
        let document = ProtocolDocument::parse(xml, context());
        let error = &document.errors()[0];
        assert_eq!(error.kind, ErrorKind::TrustViolation(TrustFault::Unregistered));
        assert_eq!(error.to_string(), "provider is not registered.");
    }

    #[test]
    fn unsigned_documents_can_be_required_signed() {
        let strict = Arc::new(Configuration {
            require_signed_documents: true,
            ..(*fixtures::sp()).clone()
        });
        let xml = r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z"><saml:Issuer>idp.test</saml:Issuer><saml:NameID>alice</saml:NameID></samlp:LogoutRequest>"#;

        let document = ProtocolDocument::parse(xml, ValidationContext::new(Arc::clone(&strict)));
        assert_eq!(document.errors()[0].kind, ErrorKind::SignatureMissing);

        let verified = ProtocolDocument::parse(xml, ValidationContext::new(strict)).with_transport_signature_verified();
        assert!(verified.is_valid(), "{:?}", verified.errors());
    }

    #[test]
    fn wrong_version_stops_before_trust() {
        let xml = r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" Version="1.1" IssueInstant="2024-01-01T00:00:00Z"><saml:Issuer>stranger.test</saml:Issuer><saml:NameID>alice</saml:NameID></samlp:LogoutRequest>"#;
        let document = ProtocolDocument::parse(xml, context());
        let kinds: Vec<ErrorKind> = document.errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [ErrorKind::VersionMismatch]);
    }
}
