//! Metadata and configuration integration tests.

use saml_crypto::Certificate;
use saml_kit::builders::{MetadataBuilder, ServiceProviderMetadata};
use saml_kit::document::{Contact, Organization};
use saml_kit::{Configuration, ErrorKind, SamlBinding};

use crate::common::{TestEnv, IDP_CERT, IDP_KEY, SP_CERT};

/// Tests that published metadata describes the entity.
#[test]
fn test_published_metadata() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    assert_eq!(env.sp_metadata.entity_id(), Some("https://sp.test/metadata"));
    assert!(env.sp_metadata.is_signed());
    assert!(env.sp_metadata.want_assertions_signed());
    assert!(env.idp_metadata.want_authn_requests_signed());

    let sp_cert = Certificate::from_pem(SP_CERT)?;
    let matched = env
        .sp_metadata
        .matches(&sp_cert.fingerprint())
        .ok_or_else(|| anyhow::anyhow!("SP certificate is not published"))?;
    assert_eq!(matched, &sp_cert);

    let registered = env
        .idp
        .registry
        .lookup("https://sp.test/metadata")
        .ok_or_else(|| anyhow::anyhow!("SP is not registered with the IdP"))?;
    assert_eq!(registered.id(), env.sp_metadata.id());

    Ok(())
}

/// Tests that SP metadata without an assertion consumer service fails schema validation.
#[test]
fn test_sp_metadata_without_acs() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let metadata = MetadataBuilder::new(env.sp.clone())
        .service_provider(ServiceProviderMetadata {
            single_logout_services: vec![(SamlBinding::HttpPost, "https://sp.test/slo".to_string())],
            ..ServiceProviderMetadata::default()
        })
        .organization(Organization {
            name: "Example".to_string(),
            display_name: "Example SP".to_string(),
            url: "https://sp.test".to_string(),
        })
        .contact(Contact {
            contact_type: "technical".to_string(),
            given_name: None,
            email: Some("mailto:ops@sp.test".to_string()),
        })
        .build()?;

    assert!(!metadata.is_valid());
    assert!(metadata
        .errors()
        .iter()
        .all(|error| error.kind == ErrorKind::SchemaViolation));
    assert!(metadata.errors()[0].message.contains("AssertionConsumerService"));

    Ok(())
}

/// Tests that a configuration loaded from TOML trusts its listed metadata.
#[test]
fn test_configuration_from_toml() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let settings = format!(
        r#"
entity_id = "https://sp2.test/metadata"
signature_algorithm = "rsa-sha512"
clock_drift_secs = 5
trusted_metadata = [{:?}]

[[signing_keys]]
certificate = {:?}
private_key = {:?}
"#,
        env.idp_metadata.to_xml(),
        IDP_CERT,
        IDP_KEY,
    );

    let config = Configuration::from_toml(&settings)?;
    assert_eq!(config.entity_id, "https://sp2.test/metadata");
    assert_eq!(config.clock_drift, chrono::Duration::seconds(5));
    assert!(config.metadata_for("https://idp.test/metadata").is_some());
    assert!(config.signer().is_some());

    Ok(())
}
