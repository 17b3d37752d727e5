//! Entity metadata.
//!
//! [`Metadata`] is the parsed form of an `md:EntityDescriptor`. It is what
//! the [`TrustRegistry`](crate::TrustRegistry) stores per counterpart: the
//! certificates a counterpart signs and encrypts with, its endpoints and its
//! signing preferences.

use std::sync::{Arc, OnceLock};

use saml_crypto::{Certificate, Fingerprint, KeyUse};

use crate::error::{ErrorKind, ValidationError};
use crate::signature::{self, Signature};
use crate::types::{SamlBinding, MD_NS, XMLDSIG_NS};
use crate::xml::{Element, SchemaValidator, StructuralSchema};

use super::validation::Rules;

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
    /// Position among indexed endpoints.
    pub index: Option<u16>,
    /// Marks the default indexed endpoint.
    pub is_default: bool,
}

impl Endpoint {
    fn read(element: &Element) -> Option<Self> {
        Some(Self {
            binding: element.attr("Binding")?.to_string(),
            location: element.attr("Location")?.to_string(),
            index: element.attr("index").and_then(|index| index.parse().ok()),
            is_default: element.attr("isDefault") == Some("true"),
        })
    }

    /// Returns true if the endpoint uses `binding`.
    pub fn uses(&self, binding: SamlBinding) -> bool {
        self.binding == binding.uri()
    }
}

/// A certificate published in a `KeyDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// The certificate.
    pub certificate: Certificate,
    /// Declared use; `None` means both signing and encryption.
    pub usage: Option<KeyUse>,
}

impl KeyDescriptor {
    /// Returns true if the key may be used for `key_use`.
    pub fn is_for(&self, key_use: KeyUse) -> bool {
        self.usage.is_none_or(|usage| usage == key_use)
    }
}

/// Role-independent descriptor content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDescriptor {
    /// Published keys.
    pub keys: Vec<KeyDescriptor>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<Endpoint>,
    /// Supported name identifier formats.
    pub name_id_formats: Vec<String>,
}

/// An `SPSSODescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceProviderDescriptor {
    /// Keys, logout endpoints and formats.
    pub role: RoleDescriptor,
    /// Assertion consumer service endpoints.
    pub assertion_consumer_services: Vec<Endpoint>,
    /// `AuthnRequestsSigned`.
    pub authn_requests_signed: bool,
    /// `WantAssertionsSigned`.
    pub want_assertions_signed: bool,
}

impl ServiceProviderDescriptor {
    /// Picks the ACS for a binding, or any binding when `None`.
    ///
    /// The endpoint flagged `isDefault` wins, then the lowest index, then
    /// document order.
    pub fn assertion_consumer_service_for(&self, binding: Option<SamlBinding>) -> Option<&Endpoint> {
        let candidates: Vec<&Endpoint> = self
            .assertion_consumer_services
            .iter()
            .filter(|endpoint| binding.is_none_or(|binding| endpoint.uses(binding)))
            .collect();
        candidates
            .iter()
            .find(|endpoint| endpoint.is_default)
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|endpoint| endpoint.index.is_some())
                    .min_by_key(|endpoint| endpoint.index)
            })
            .or_else(|| candidates.first())
            .copied()
    }

    /// Finds the ACS with the given index.
    pub fn assertion_consumer_service_at(&self, index: u16) -> Option<&Endpoint> {
        self.assertion_consumer_services
            .iter()
            .find(|endpoint| endpoint.index == Some(index))
    }
}

/// An `IDPSSODescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityProviderDescriptor {
    /// Keys, logout endpoints and formats.
    pub role: RoleDescriptor,
    /// Single sign-on endpoints.
    pub single_sign_on_services: Vec<Endpoint>,
    /// `WantAuthnRequestsSigned`.
    pub want_authn_requests_signed: bool,
    /// Names of the attributes the IdP releases.
    pub attributes: Vec<String>,
}

/// `md:Organization` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Organization {
    /// `OrganizationName`.
    pub name: String,
    /// `OrganizationDisplayName`.
    pub display_name: String,
    /// `OrganizationURL`.
    pub url: String,
}

/// `md:ContactPerson` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    /// `contactType`, e.g. `technical`.
    pub contact_type: String,
    /// `GivenName`.
    pub given_name: Option<String>,
    /// `EmailAddress`, including any `mailto:` scheme.
    pub email: Option<String>,
}

/// Parsed entity metadata.
///
/// Parsing never fails; problems are reported by [`Metadata::errors`].
#[derive(Debug)]
pub struct Metadata {
    content: String,
    root: Option<Element>,
    parse_error: Option<String>,
    entity_id: Option<String>,
    service_provider: Option<ServiceProviderDescriptor>,
    identity_provider: Option<IdentityProviderDescriptor>,
    organization: Option<Organization>,
    contacts: Vec<Contact>,
    schema: Arc<dyn SchemaValidator>,
    errors: OnceLock<Vec<ValidationError>>,
}

impl Metadata {
    /// Parses metadata, validating against the built-in schema.
    pub fn parse(xml: &str) -> Self {
        Self::parse_with_schema(xml, Arc::new(StructuralSchema))
    }

    /// Parses metadata, validating against `schema`.
    pub fn parse_with_schema(xml: &str, schema: Arc<dyn SchemaValidator>) -> Self {
        let (root, parse_error) = match Element::parse(xml) {
            Ok(root) => (Some(root), None),
            Err(e) => {
                tracing::warn!("Unable to parse metadata: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let descriptor = root
            .as_ref()
            .filter(|root| root.is(MD_NS, "EntityDescriptor"));

        Self {
            content: xml.to_string(),
            entity_id: descriptor.and_then(|root| root.attr("entityID")).map(str::to_string),
            service_provider: descriptor
                .and_then(|root| root.child(MD_NS, "SPSSODescriptor"))
                .map(read_service_provider),
            identity_provider: descriptor
                .and_then(|root| root.child(MD_NS, "IDPSSODescriptor"))
                .map(read_identity_provider),
            organization: descriptor
                .and_then(|root| root.child(MD_NS, "Organization"))
                .map(|org| Organization {
                    name: org.child_text(MD_NS, "OrganizationName").unwrap_or_default(),
                    display_name: org.child_text(MD_NS, "OrganizationDisplayName").unwrap_or_default(),
                    url: org.child_text(MD_NS, "OrganizationURL").unwrap_or_default(),
                }),
            contacts: descriptor
                .into_iter()
                .flat_map(|root| root.children_named(MD_NS, "ContactPerson"))
                .map(|contact| Contact {
                    contact_type: contact.attr("contactType").unwrap_or_default().to_string(),
                    given_name: contact.child_text(MD_NS, "GivenName"),
                    email: contact.child_text(MD_NS, "EmailAddress"),
                })
                .collect(),
            root,
            parse_error,
            schema,
            errors: OnceLock::new(),
        }
    }

    /// The `ID` attribute, if any.
    pub fn id(&self) -> Option<&str> {
        self.root.as_ref()?.id()
    }

    /// The `entityID`.
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// The SP role, if described.
    pub fn service_provider(&self) -> Option<&ServiceProviderDescriptor> {
        self.service_provider.as_ref()
    }

    /// The IdP role, if described.
    pub fn identity_provider(&self) -> Option<&IdentityProviderDescriptor> {
        self.identity_provider.as_ref()
    }

    /// Organization details.
    pub fn organization(&self) -> Option<&Organization> {
        self.organization.as_ref()
    }

    /// Contact people.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// All published keys across both roles.
    pub fn key_descriptors(&self) -> impl Iterator<Item = &KeyDescriptor> {
        self.service_provider
            .iter()
            .map(|sp| &sp.role)
            .chain(self.identity_provider.iter().map(|idp| &idp.role))
            .flat_map(|role| role.keys.iter())
    }

    /// Certificates usable for `key_use`, without duplicates.
    pub fn certificates(&self, key_use: KeyUse) -> Vec<&Certificate> {
        let mut certificates: Vec<&Certificate> = Vec::new();
        for key in self.key_descriptors().filter(|key| key.is_for(key_use)) {
            if !certificates.contains(&&key.certificate) {
                certificates.push(&key.certificate);
            }
        }
        certificates
    }

    /// Certificates the entity signs with.
    pub fn signing_certificates(&self) -> Vec<&Certificate> {
        self.certificates(KeyUse::Signing)
    }

    /// Certificates to encrypt for this entity with.
    pub fn encryption_certificates(&self) -> Vec<&Certificate> {
        self.certificates(KeyUse::Encryption)
    }

    /// Returns the signing certificate with `fingerprint`, if any.
    ///
    /// The fingerprint may use any supported digest.
    pub fn matches(&self, fingerprint: &Fingerprint) -> Option<&Certificate> {
        self.signing_certificates()
            .into_iter()
            .find(|certificate| certificate.fingerprint_with(fingerprint.algorithm()) == *fingerprint)
    }

    /// Single sign-on endpoint for a binding.
    pub fn single_sign_on_service_for(&self, binding: SamlBinding) -> Option<&Endpoint> {
        self.identity_provider
            .as_ref()?
            .single_sign_on_services
            .iter()
            .find(|endpoint| endpoint.uses(binding))
    }

    /// Single logout endpoint for a binding, from either role.
    pub fn single_logout_service_for(&self, binding: SamlBinding) -> Option<&Endpoint> {
        self.service_provider
            .iter()
            .map(|sp| &sp.role)
            .chain(self.identity_provider.iter().map(|idp| &idp.role))
            .flat_map(|role| role.single_logout_services.iter())
            .find(|endpoint| endpoint.uses(binding))
    }

    /// Assertion consumer service for a binding; see
    /// [`ServiceProviderDescriptor::assertion_consumer_service_for`].
    pub fn assertion_consumer_service_for(&self, binding: Option<SamlBinding>) -> Option<&Endpoint> {
        self.service_provider
            .as_ref()?
            .assertion_consumer_service_for(binding)
    }

    /// Name ID formats across both roles.
    pub fn name_id_formats(&self) -> Vec<&str> {
        self.service_provider
            .iter()
            .map(|sp| &sp.role)
            .chain(self.identity_provider.iter().map(|idp| &idp.role))
            .flat_map(|role| role.name_id_formats.iter().map(String::as_str))
            .collect()
    }

    /// `WantAssertionsSigned` of the SP role; false without one.
    pub fn want_assertions_signed(&self) -> bool {
        self.service_provider
            .as_ref()
            .is_some_and(|sp| sp.want_assertions_signed)
    }

    /// `WantAuthnRequestsSigned` of the IdP role; false without one.
    pub fn want_authn_requests_signed(&self) -> bool {
        self.identity_provider
            .as_ref()
            .is_some_and(|idp| idp.want_authn_requests_signed)
    }

    /// The embedded signature, if the descriptor is signed.
    pub fn signature(&self) -> Option<Result<Signature, ValidationError>> {
        Signature::find(self.root.as_ref()?, &[])
    }

    /// Returns true if the descriptor carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature().is_some()
    }

    /// The XML as received.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The XML as received.
    pub fn to_xml(&self) -> &str {
        &self.content
    }

    /// Validation errors, computed once.
    pub fn errors(&self) -> &[ValidationError] {
        self.errors.get_or_init(|| rules().run(self))
    }

    /// Returns true if validation found nothing wrong.
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

fn rules() -> Rules<Metadata> {
    Rules::<Metadata>::new()
        .always("content", |metadata, errors| {
            if metadata.content.trim().is_empty() {
                errors.push(ValidationError::new("content", ErrorKind::ParseFailure, "can't be blank."));
            } else if let Some(parse_error) = &metadata.parse_error {
                errors.push(ValidationError::new("content", ErrorKind::ParseFailure, parse_error.clone()));
            }
        })
        .when_clean("schema", |metadata, errors| {
            if let Some(root) = &metadata.root {
                errors.extend(
                    metadata
                        .schema
                        .validate(root)
                        .into_iter()
                        .map(|violation| ValidationError::new("schema", ErrorKind::SchemaViolation, violation)),
                );
            }
        })
        .when_clean("expected_type", |metadata, errors| {
            if !metadata.root.as_ref().is_some_and(|root| root.is(MD_NS, "EntityDescriptor")) {
                errors.push(ValidationError::new(
                    "base",
                    ErrorKind::UnexpectedDocumentType,
                    "must contain EntityDescriptor.",
                ));
            }
        })
        .when_sound("roles", |metadata, errors| {
            if metadata.service_provider.is_none() && metadata.identity_provider.is_none() {
                errors.push(ValidationError::new(
                    "metadata",
                    ErrorKind::Missing,
                    "must contain SPSSODescriptor or IDPSSODescriptor.",
                ));
            }
        })
        .when_sound("signature", |metadata, errors| {
            let Some(root) = &metadata.root else { return };
            match metadata.signature() {
                Some(Ok(signature)) => errors.extend(signature::verify(root, &signature, None)),
                Some(Err(error)) => errors.push(error),
                None => {}
            }
        })
}

fn read_role(element: &Element) -> RoleDescriptor {
    RoleDescriptor {
        keys: element
            .children_named(MD_NS, "KeyDescriptor")
            .filter_map(|key| {
                let text = key
                    .descend(&[
                        (XMLDSIG_NS, "KeyInfo"),
                        (XMLDSIG_NS, "X509Data"),
                        (XMLDSIG_NS, "X509Certificate"),
                    ])?
                    .text();
                let certificate = match Certificate::from_base64(&text) {
                    Ok(certificate) => certificate,
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable metadata certificate: {}", e);
                        return None;
                    }
                };
                Some(KeyDescriptor {
                    certificate,
                    usage: key.attr("use").and_then(|usage| usage.parse().ok()),
                })
            })
            .collect(),
        single_logout_services: element
            .children_named(MD_NS, "SingleLogoutService")
            .filter_map(Endpoint::read)
            .collect(),
        name_id_formats: element
            .children_named(MD_NS, "NameIDFormat")
            .map(|format| format.text().trim().to_string())
            .collect(),
    }
}

fn read_service_provider(element: &Element) -> ServiceProviderDescriptor {
    ServiceProviderDescriptor {
        role: read_role(element),
        assertion_consumer_services: element
            .children_named(MD_NS, "AssertionConsumerService")
            .filter_map(Endpoint::read)
            .collect(),
        authn_requests_signed: element.attr("AuthnRequestsSigned") == Some("true"),
        want_assertions_signed: element.attr("WantAssertionsSigned") == Some("true"),
    }
}

fn read_identity_provider(element: &Element) -> IdentityProviderDescriptor {
    IdentityProviderDescriptor {
        role: read_role(element),
        single_sign_on_services: element
            .children_named(MD_NS, "SingleSignOnService")
            .filter_map(Endpoint::read)
            .collect(),
        want_authn_requests_signed: element.attr("WantAuthnRequestsSigned") == Some("true"),
        attributes: element
            .children_named(crate::types::SAML_NS, "Attribute")
            .filter_map(|attribute| attribute.attr("Name"))
            .map(str::to_string)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate_b64(pem: &str) -> String {
        Certificate::from_pem(pem).unwrap().to_base64()
    }

    fn sp_metadata() -> String {
        let signing = certificate_b64(include_str!("../../../../testdata/sp.crt.pem"));
        let both = certificate_b64(include_str!("../../../../testdata/rotated.crt.pem"));
        format!(
            r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="sp.test">
  <SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol" AuthnRequestsSigned="true" WantAssertionsSigned="true">
    <KeyDescriptor use="signing"><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{signing}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></KeyDescriptor>
    <KeyDescriptor><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{both}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></KeyDescriptor>
    <SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.test/logout"/>
    <NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</NameIDFormat>
    <AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://sp.test/acs/redirect" index="0"/>
    <AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.test/acs" index="1" isDefault="true"/>
  </SPSSODescriptor>
  <Organization><OrganizationName>SP</OrganizationName><OrganizationDisplayName>Service</OrganizationDisplayName><OrganizationURL>https://sp.test</OrganizationURL></Organization>
  <ContactPerson contactType="technical"><EmailAddress>mailto:ops@sp.test</EmailAddress></ContactPerson>
</EntityDescriptor>"#
        )
    }

    #[test]
    fn reads_service_provider_metadata() {
        let metadata = Metadata::parse(&sp_metadata());
        assert!(metadata.is_valid(), "{:?}", metadata.errors());
        assert_eq!(metadata.entity_id(), Some("sp.test"));
        assert!(metadata.identity_provider().is_none());

        let sp = metadata.service_provider().unwrap();
        assert!(sp.authn_requests_signed);
        assert!(metadata.want_assertions_signed());
        assert_eq!(sp.assertion_consumer_services.len(), 2);
        assert_eq!(
            metadata.assertion_consumer_service_for(None).map(|e| e.location.as_str()),
            Some("https://sp.test/acs")
        );
        assert_eq!(
            metadata
                .assertion_consumer_service_for(Some(SamlBinding::HttpRedirect))
                .map(|e| e.location.as_str()),
            Some("https://sp.test/acs/redirect")
        );
        assert_eq!(sp.assertion_consumer_service_at(0).map(|e| e.index), Some(Some(0)));
        assert_eq!(
            metadata
                .single_logout_service_for(SamlBinding::HttpPost)
                .map(|e| e.location.as_str()),
            Some("https://sp.test/logout")
        );
        assert_eq!(
            metadata.name_id_formats(),
            ["urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"]
        );
        assert_eq!(metadata.organization().map(|o| o.display_name.as_str()), Some("Service"));
        assert_eq!(metadata.contacts()[0].email.as_deref(), Some("mailto:ops@sp.test"));
    }

    #[test]
    fn key_without_use_counts_for_both() {
        let metadata = Metadata::parse(&sp_metadata());
        assert_eq!(metadata.signing_certificates().len(), 2);
        assert_eq!(metadata.encryption_certificates().len(), 1);

        let rotated = Certificate::from_pem(include_str!("../../../../testdata/rotated.crt.pem")).unwrap();
        assert_eq!(metadata.encryption_certificates()[0], &rotated);
    }

    #[test]
    fn matches_fingerprints_of_signing_certificates() {
        let metadata = Metadata::parse(&sp_metadata());
        let sp = Certificate::from_pem(include_str!("../../../../testdata/sp.crt.pem")).unwrap();
        let idp = Certificate::from_pem(include_str!("../../../../testdata/idp.crt.pem")).unwrap();

        assert!(metadata.matches(&sp.fingerprint()).is_some());
        assert!(metadata
            .matches(&sp.fingerprint_with(saml_crypto::DigestAlgorithm::Sha1))
            .is_some());
        assert!(metadata.matches(&idp.fingerprint()).is_none());
    }

    #[test]
    fn sp_without_acs_fails_schema() {
        let xml = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="sp.test"><SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></EntityDescriptor>"#;
        let metadata = Metadata::parse(xml);
        assert!(!metadata.is_valid());
        assert_eq!(metadata.errors()[0].kind, ErrorKind::SchemaViolation);
    }

    #[test]
    fn garbage_is_reported_not_raised() {
        let metadata = Metadata::parse("<EntityDescriptor");
        assert_eq!(metadata.entity_id(), None);
        assert_eq!(metadata.errors()[0].kind, ErrorKind::ParseFailure);

        let blank = Metadata::parse("   ");
        assert_eq!(blank.errors()[0].to_string(), "content can't be blank.");
    }

    #[test]
    fn validation_is_memoized() {
        let metadata = Metadata::parse(&sp_metadata());
        let first = metadata.errors().as_ptr();
        assert_eq!(metadata.errors().as_ptr(), first);
    }
}
