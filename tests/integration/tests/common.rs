//! Common test utilities and fixtures.

use std::collections::BTreeMap;
use std::sync::Arc;

use saml_crypto::{KeyPair, KeyUse};
use saml_kit::builders::{
    IdentityProviderMetadata, MetadataBuilder, ServiceProviderMetadata, UserClaims,
};
use saml_kit::{Configuration, DefaultRegistry, Metadata, NameIdFormat, SamlBinding, TrustRegistry};

pub const IDP_CERT: &str = include_str!("../../../testdata/idp.crt.pem");
pub const IDP_KEY: &str = include_str!("../../../testdata/idp.key.pem");
pub const SP_CERT: &str = include_str!("../../../testdata/sp.crt.pem");
pub const SP_KEY: &str = include_str!("../../../testdata/sp.key.pem");
pub const ROTATED_CERT: &str = include_str!("../../../testdata/rotated.crt.pem");
pub const ROTATED_KEY: &str = include_str!("../../../testdata/rotated.key.pem");

pub const IDP_SSO: &str = "https://idp.test/sso";
pub const IDP_SLO: &str = "https://idp.test/slo";
pub const SP_ACS: &str = "https://sp.test/acs";
pub const SP_SLO: &str = "https://sp.test/slo";

/// The signed-in user.
pub struct Alice;

impl UserClaims for Alice {
    fn name_id_for(&self, format: &str) -> String {
        if format == NameIdFormat::Email.uri() {
            "alice@example.com".to_string()
        } else {
            "8f1c2e0a-alice".to_string()
        }
    }

    fn assertion_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("email".to_string(), "alice@example.com".to_string()),
            ("groups".to_string(), "admins".to_string()),
        ])
    }
}

/// An identity provider and a service provider that trust each other
/// through exchanged metadata.
pub struct TestEnv {
    /// Identity provider configuration.
    pub idp: Arc<Configuration>,
    /// Service provider configuration.
    pub sp: Arc<Configuration>,
    /// The metadata the IdP published.
    pub idp_metadata: Arc<Metadata>,
    /// The metadata the SP published.
    pub sp_metadata: Arc<Metadata>,
}

impl TestEnv {
    /// Creates both entities and registers each with the other.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_sp_encryption_keys(&[(SP_CERT, SP_KEY)])
    }

    /// Like [`TestEnv::new`], with the given SP encryption key pairs,
    /// oldest first.
    pub fn with_sp_encryption_keys(keys: &[(&str, &str)]) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("saml_kit=debug")
            .with_test_writer()
            .try_init();

        let idp_registry = Arc::new(DefaultRegistry::new());
        let sp_registry = Arc::new(DefaultRegistry::new());

        let idp = Arc::new(
            Configuration::builder("https://idp.test/metadata")
                .signing_key_pair(KeyPair::from_pem(IDP_CERT, IDP_KEY, KeyUse::Signing)?)
                .registry(idp_registry.clone())
                .build()?,
        );

        let mut sp = Configuration::builder("https://sp.test/metadata")
            .signing_key_pair(KeyPair::from_pem(SP_CERT, SP_KEY, KeyUse::Signing)?)
            .registry(sp_registry.clone());
        for (certificate, key) in keys {
            sp = sp.encryption_key_pair(KeyPair::from_pem(certificate, key, KeyUse::Encryption)?);
        }
        let sp = Arc::new(sp.build()?);

        let idp_metadata = MetadataBuilder::new(idp.clone())
            .identity_provider(IdentityProviderMetadata {
                single_sign_on_services: vec![
                    (SamlBinding::HttpRedirect, IDP_SSO.to_string()),
                    (SamlBinding::HttpPost, IDP_SSO.to_string()),
                ],
                single_logout_services: vec![
                    (SamlBinding::HttpRedirect, IDP_SLO.to_string()),
                    (SamlBinding::HttpPost, IDP_SLO.to_string()),
                ],
                name_id_formats: vec![NameIdFormat::Persistent, NameIdFormat::Email],
                want_authn_requests_signed: true,
                attributes: vec!["email".to_string(), "groups".to_string()],
            })
            .build()?;
        let sp_metadata = MetadataBuilder::new(sp.clone())
            .service_provider(ServiceProviderMetadata {
                assertion_consumer_services: vec![(SamlBinding::HttpPost, SP_ACS.to_string())],
                single_logout_services: vec![
                    (SamlBinding::HttpRedirect, SP_SLO.to_string()),
                    (SamlBinding::HttpPost, SP_SLO.to_string()),
                ],
                name_id_formats: vec![NameIdFormat::Email],
                want_assertions_signed: true,
            })
            .build()?;
        anyhow::ensure!(idp_metadata.is_valid(), "IdP metadata: {:?}", idp_metadata.errors());
        anyhow::ensure!(sp_metadata.is_valid(), "SP metadata: {:?}", sp_metadata.errors());

        let idp_metadata = sp_registry.register_metadata(idp_metadata)?;
        let sp_metadata = idp_registry.register_metadata(sp_metadata)?;

        Ok(Self {
            idp,
            sp,
            idp_metadata,
            sp_metadata,
        })
    }
}
