//! Metadata builder.

use std::sync::Arc;

use saml_crypto::random::generate_id;
use saml_crypto::{KeyPair, KeyUse};

use crate::config::Configuration;
use crate::document::{Contact, Metadata, Organization};
use crate::error::SamlResult;
use crate::types::{NameIdFormat, SamlBinding, MD_NS, SAMLP_NS, SAML_NS, XMLDSIG_NS, XML_NS};
use crate::xml::Element;

use super::{sign, signer_for};

/// Contents of an `md:SPSSODescriptor`.
#[derive(Debug, Clone, Default)]
pub struct ServiceProviderMetadata {
    /// ACS endpoints; the first is the default.
    pub assertion_consumer_services: Vec<(SamlBinding, String)>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<(SamlBinding, String)>,
    /// Supported name ID formats.
    pub name_id_formats: Vec<NameIdFormat>,
    /// Ask the IdP to sign assertions.
    pub want_assertions_signed: bool,
}

/// Contents of an `md:IDPSSODescriptor`.
#[derive(Debug, Clone, Default)]
pub struct IdentityProviderMetadata {
    /// Single sign-on endpoints.
    pub single_sign_on_services: Vec<(SamlBinding, String)>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<(SamlBinding, String)>,
    /// Supported name ID formats.
    pub name_id_formats: Vec<NameIdFormat>,
    /// Require signed authentication requests.
    pub want_authn_requests_signed: bool,
    /// Names of attributes the IdP can release.
    pub attributes: Vec<String>,
}

/// Builds an `md:EntityDescriptor` for the local entity.
///
/// Every role descriptor publishes all configured signing and encryption
/// certificates, so counterparts can keep verifying during a key rollover.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    configuration: Arc<Configuration>,
    /// `ID` of the descriptor.
    pub id: String,
    /// Service provider role.
    pub service_provider: Option<ServiceProviderMetadata>,
    /// Identity provider role.
    pub identity_provider: Option<IdentityProviderMetadata>,
    /// Publishing organization.
    pub organization: Option<Organization>,
    /// Contacts.
    pub contacts: Vec<Contact>,
    /// Embed an XML signature.
    pub embed_signature: bool,
}

impl MetadataBuilder {
    /// Starts metadata for the configured entity.
    pub fn new(configuration: Arc<Configuration>) -> Self {
        let embed_signature = configuration.sign_outgoing;
        Self {
            configuration,
            id: generate_id(),
            service_provider: None,
            identity_provider: None,
            organization: None,
            contacts: Vec::new(),
            embed_signature,
        }
    }

    /// Adds the SP role.
    #[must_use]
    pub fn service_provider(mut self, descriptor: ServiceProviderMetadata) -> Self {
        self.service_provider = Some(descriptor);
        self
    }

    /// Adds the IdP role.
    #[must_use]
    pub fn identity_provider(mut self, descriptor: IdentityProviderMetadata) -> Self {
        self.identity_provider = Some(descriptor);
        self
    }

    /// Sets the organization.
    #[must_use]
    pub fn organization(mut self, organization: Organization) -> Self {
        self.organization = Some(organization);
        self
    }

    /// Adds a contact.
    #[must_use]
    pub fn contact(mut self, contact: Contact) -> Self {
        self.contacts.push(contact);
        self
    }

    fn key_descriptors(&self) -> Vec<Element> {
        let descriptor = |pair: &KeyPair, key_use: KeyUse| {
            md("KeyDescriptor").with_attr("use", key_use.as_str()).with_child(
                Element::new("ds:KeyInfo", XMLDSIG_NS).with_child(
                    Element::new("ds:X509Data", XMLDSIG_NS).with_child(
                        Element::new("ds:X509Certificate", XMLDSIG_NS)
                            .with_text(pair.certificate.to_base64()),
                    ),
                ),
            )
        };
        self.configuration
            .signing_key_pairs
            .iter()
            .map(|pair| descriptor(pair, KeyUse::Signing))
            .chain(
                self.configuration
                    .encryption_key_pairs
                    .iter()
                    .map(|pair| descriptor(pair, KeyUse::Encryption)),
            )
            .collect()
    }

    fn render_service_provider(&self, sp: &ServiceProviderMetadata) -> Element {
        md("SPSSODescriptor")
            .with_attr("AuthnRequestsSigned", self.configuration.sign_outgoing.to_string())
            .with_attr("WantAssertionsSigned", sp.want_assertions_signed.to_string())
            .with_attr("protocolSupportEnumeration", SAMLP_NS)
            .with_children(self.key_descriptors())
            .with_children(endpoints("SingleLogoutService", &sp.single_logout_services))
            .with_children(name_id_formats(&sp.name_id_formats))
            .with_children(
                sp.assertion_consumer_services
                    .iter()
                    .enumerate()
                    .map(|(index, (binding, location))| {
                        endpoint("AssertionConsumerService", *binding, location)
                            .with_attr("index", index.to_string())
                            .with_attr("isDefault", (index == 0).to_string())
                    }),
            )
    }

    fn render_identity_provider(&self, idp: &IdentityProviderMetadata) -> Element {
        md("IDPSSODescriptor")
            .with_attr("WantAuthnRequestsSigned", idp.want_authn_requests_signed.to_string())
            .with_attr("protocolSupportEnumeration", SAMLP_NS)
            .with_children(self.key_descriptors())
            .with_children(endpoints("SingleLogoutService", &idp.single_logout_services))
            .with_children(name_id_formats(&idp.name_id_formats))
            .with_children(endpoints("SingleSignOnService", &idp.single_sign_on_services))
            .with_children(idp.attributes.iter().map(|name| {
                Element::new("saml:Attribute", SAML_NS).with_attr("Name", name.as_str())
            }))
    }

    fn render(&self) -> Element {
        let organization = self.organization.as_ref().map(|org| {
            let localized = |name: &str, text: &str| {
                md(name).with_qualified_attr("xml:lang", XML_NS, "en").with_text(text)
            };
            md("Organization")
                .with_child(localized("OrganizationName", &org.name))
                .with_child(localized("OrganizationDisplayName", &org.display_name))
                .with_child(localized("OrganizationURL", &org.url))
        });

        md("EntityDescriptor")
            .declare("md", MD_NS)
            .declare("ds", XMLDSIG_NS)
            .declare("saml", SAML_NS)
            .with_attr("ID", self.id.as_str())
            .with_attr("entityID", self.configuration.entity_id.as_str())
            .with_optional_child(
                self.identity_provider
                    .as_ref()
                    .map(|idp| self.render_identity_provider(idp)),
            )
            .with_optional_child(
                self.service_provider
                    .as_ref()
                    .map(|sp| self.render_service_provider(sp)),
            )
            .with_optional_child(organization)
            .with_children(self.contacts.iter().map(|contact| {
                md("ContactPerson")
                    .with_attr("contactType", contact.contact_type.as_str())
                    .with_optional_child(
                        contact.given_name.as_deref().map(|name| md("GivenName").with_text(name)),
                    )
                    .with_optional_child(
                        contact.email.as_deref().map(|email| md("EmailAddress").with_text(email)),
                    )
            }))
    }

    /// Renders the finalized XML.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    pub fn to_xml(&self) -> SamlResult<String> {
        let signer = signer_for(&self.configuration, self.embed_signature);
        Ok(sign(self.render(), signer.as_ref())?.to_xml())
    }

    /// Renders and parses the metadata.
    ///
    /// ## Errors
    ///
    /// Returns an error if signing fails.
    pub fn build(&self) -> SamlResult<Metadata> {
        let xml = self.to_xml()?;
        Ok(Metadata::parse_with_schema(&xml, Arc::clone(&self.configuration.schema)))
    }
}

fn md(name: &str) -> Element {
    Element::new(&format!("md:{name}"), MD_NS)
}

fn endpoint(name: &str, binding: SamlBinding, location: &str) -> Element {
    md(name)
        .with_attr("Binding", binding.uri())
        .with_attr("Location", location)
}

fn endpoints<'a>(
    name: &'a str,
    services: &'a [(SamlBinding, String)],
) -> impl Iterator<Item = Element> + 'a {
    services
        .iter()
        .map(move |(binding, location)| endpoint(name, *binding, location))
}

fn name_id_formats(formats: &[NameIdFormat]) -> impl Iterator<Item = Element> + '_ {
    formats
        .iter()
        .map(|format| md("NameIDFormat").with_text(format.uri()))
}
