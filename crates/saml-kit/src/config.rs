//! Toolkit configuration.
//!
//! A [`Configuration`] describes the local entity: its ID, its key pairs,
//! clock tolerances and signing policy, plus the [`TrustRegistry`] and
//! [`SchemaValidator`] documents are checked against. It is passed
//! explicitly to builders and validation contexts.
//!
//! [`Settings`] is the serializable form, loadable from TOML.

use std::sync::Arc;

use chrono::Duration;
use saml_crypto::{KeyPair, KeyUse, PrivateKey, SignatureAlgorithm};
use serde::{Deserialize, Serialize};

use crate::document::Metadata;
use crate::error::{SamlError, SamlResult};
use crate::registry::{DefaultRegistry, TrustRegistry};
use crate::signature::XmlSigner;
use crate::xml::{SchemaValidator, StructuralSchema};

/// Default tolerance for clock differences between entities.
pub const DEFAULT_CLOCK_DRIFT_SECS: i64 = 30;

/// Default assertion lifetime.
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3 * 60 * 60;

/// Local entity configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Entity ID used as Issuer and expected as Audience.
    pub entity_id: String,
    /// Signing key pairs, oldest first. The last one signs.
    pub signing_key_pairs: Vec<KeyPair>,
    /// Encryption key pairs, oldest first.
    pub encryption_key_pairs: Vec<KeyPair>,
    /// Tolerated clock difference when checking validity windows.
    pub clock_drift: Duration,
    /// Lifetime of issued assertions.
    pub session_timeout: Duration,
    /// Sign outgoing documents.
    pub sign_outgoing: bool,
    /// Reject unsigned incoming documents.
    pub require_signed_documents: bool,
    /// Algorithm for outgoing signatures.
    pub signature_algorithm: SignatureAlgorithm,
    /// Registered counterparts.
    pub registry: Arc<dyn TrustRegistry>,
    /// Schema incoming documents are checked against.
    pub schema: Arc<dyn SchemaValidator>,
}

impl Configuration {
    /// Starts a configuration for `entity_id`.
    #[must_use]
    pub fn builder(entity_id: impl Into<String>) -> ConfigurationBuilder {
        ConfigurationBuilder::new(entity_id)
    }

    /// Builds a configuration from [`Settings`].
    pub fn from_settings(settings: &Settings) -> SamlResult<Self> {
        let registry = DefaultRegistry::new();
        for xml in &settings.trusted_metadata {
            let metadata = Metadata::parse(xml);
            if !metadata.is_valid() {
                let reasons: Vec<String> = metadata.errors().iter().map(ToString::to_string).collect();
                return Err(SamlError::Configuration(format!(
                    "trusted metadata is invalid: {}",
                    reasons.join(", ")
                )));
            }
            registry.register_metadata(metadata)?;
        }

        let mut builder = Self::builder(settings.entity_id.clone())
            .clock_drift(Duration::seconds(settings.clock_drift_secs))
            .session_timeout(Duration::seconds(settings.session_timeout_secs))
            .sign_outgoing(settings.sign_outgoing)
            .require_signed_documents(settings.require_signed_documents)
            .signature_algorithm(settings.signature_algorithm)
            .registry(Arc::new(registry));
        for pair in &settings.signing_keys {
            builder = builder.signing_key_pair(pair.load(KeyUse::Signing)?);
        }
        for pair in &settings.encryption_keys {
            builder = builder.encryption_key_pair(pair.load(KeyUse::Encryption)?);
        }
        builder.build()
    }

    /// Parses TOML [`Settings`] and builds a configuration from them.
    pub fn from_toml(text: &str) -> SamlResult<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| SamlError::Configuration(e.to_string()))?;
        Self::from_settings(&settings)
    }

    /// The key pair used for new signatures.
    pub fn signing_key_pair(&self) -> Option<&KeyPair> {
        self.signing_key_pairs.last()
    }

    /// Signer for outgoing documents, or `None` when signing is off or no
    /// signing key is configured.
    pub fn signer(&self) -> Option<XmlSigner> {
        if !self.sign_outgoing {
            return None;
        }
        self.signing_key_pair()
            .map(|pair| XmlSigner::new(pair.clone(), self.signature_algorithm))
    }

    /// Decryption candidates, most recent first.
    pub fn decryption_keys(&self) -> impl Iterator<Item = &PrivateKey> {
        self.encryption_key_pairs
            .iter()
            .rev()
            .map(|pair| &pair.private_key)
    }

    /// Looks up a counterpart in the registry.
    pub fn metadata_for(&self, entity_id: &str) -> Option<Arc<Metadata>> {
        self.registry.lookup(entity_id)
    }
}

/// Builder for [`Configuration`].
#[derive(Debug)]
pub struct ConfigurationBuilder {
    entity_id: String,
    signing_key_pairs: Vec<KeyPair>,
    encryption_key_pairs: Vec<KeyPair>,
    clock_drift: Duration,
    session_timeout: Duration,
    sign_outgoing: bool,
    require_signed_documents: bool,
    signature_algorithm: SignatureAlgorithm,
    registry: Option<Arc<dyn TrustRegistry>>,
    schema: Option<Arc<dyn SchemaValidator>>,
}

impl ConfigurationBuilder {
    /// Creates a builder with defaults.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            signing_key_pairs: Vec::new(),
            encryption_key_pairs: Vec::new(),
            clock_drift: Duration::seconds(DEFAULT_CLOCK_DRIFT_SECS),
            session_timeout: Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
            sign_outgoing: true,
            require_signed_documents: false,
            signature_algorithm: SignatureAlgorithm::default(),
            registry: None,
            schema: None,
        }
    }

    /// Adds a signing key pair; the last one added signs.
    #[must_use]
    pub fn signing_key_pair(mut self, pair: KeyPair) -> Self {
        self.signing_key_pairs.push(pair);
        self
    }

    /// Adds an encryption key pair; later pairs are tried first.
    #[must_use]
    pub fn encryption_key_pair(mut self, pair: KeyPair) -> Self {
        self.encryption_key_pairs.push(pair);
        self
    }

    /// Sets the clock drift tolerance.
    #[must_use]
    pub const fn clock_drift(mut self, drift: Duration) -> Self {
        self.clock_drift = drift;
        self
    }

    /// Sets the assertion lifetime.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Enables or disables signing of outgoing documents.
    #[must_use]
    pub const fn sign_outgoing(mut self, sign: bool) -> Self {
        self.sign_outgoing = sign;
        self
    }

    /// Requires incoming documents to be signed.
    #[must_use]
    pub const fn require_signed_documents(mut self, required: bool) -> Self {
        self.require_signed_documents = required;
        self
    }

    /// Sets the outgoing signature algorithm.
    #[must_use]
    pub const fn signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Uses `registry` instead of a fresh [`DefaultRegistry`].
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn TrustRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses `schema` instead of [`StructuralSchema`].
    #[must_use]
    pub fn schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Builds the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The entity ID is blank
    /// - A key pair is registered for the wrong use
    /// - Signing is enabled with SHA-1
    pub fn build(self) -> SamlResult<Configuration> {
        if self.entity_id.trim().is_empty() {
            return Err(SamlError::Configuration("entity_id is required".to_string()));
        }
        if self.signing_key_pairs.iter().any(|pair| !pair.is_for(KeyUse::Signing)) {
            return Err(SamlError::Configuration(
                "signing key pairs must be marked for signing".to_string(),
            ));
        }
        if self.encryption_key_pairs.iter().any(|pair| !pair.is_for(KeyUse::Encryption)) {
            return Err(SamlError::Configuration(
                "encryption key pairs must be marked for encryption".to_string(),
            ));
        }
        if self.signature_algorithm.is_deprecated() {
            return Err(SamlError::Configuration(format!(
                "{:?} may only be used for verification",
                self.signature_algorithm
            )));
        }

        Ok(Configuration {
            entity_id: self.entity_id,
            signing_key_pairs: self.signing_key_pairs,
            encryption_key_pairs: self.encryption_key_pairs,
            clock_drift: self.clock_drift,
            session_timeout: self.session_timeout,
            sign_outgoing: self.sign_outgoing,
            require_signed_documents: self.require_signed_documents,
            signature_algorithm: self.signature_algorithm,
            registry: self.registry.unwrap_or_else(|| Arc::new(DefaultRegistry::new())),
            schema: self.schema.unwrap_or_else(|| Arc::new(StructuralSchema)),
        })
    }
}

/// PEM encoded certificate and private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairSettings {
    /// PEM certificate.
    pub certificate: String,
    /// PEM PKCS#8 private key.
    pub private_key: String,
}

impl KeyPairSettings {
    fn load(&self, key_use: KeyUse) -> SamlResult<KeyPair> {
        Ok(KeyPair::from_pem(&self.certificate, &self.private_key, key_use)?)
    }
}

/// Serializable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local entity ID.
    pub entity_id: String,
    /// Signing key pairs, oldest first.
    pub signing_keys: Vec<KeyPairSettings>,
    /// Encryption key pairs, oldest first.
    pub encryption_keys: Vec<KeyPairSettings>,
    /// Clock drift tolerance in seconds.
    pub clock_drift_secs: i64,
    /// Assertion lifetime in seconds.
    pub session_timeout_secs: i64,
    /// Sign outgoing documents.
    pub sign_outgoing: bool,
    /// Reject unsigned incoming documents.
    pub require_signed_documents: bool,
    /// Outgoing signature algorithm, e.g. `rsa-sha256`.
    pub signature_algorithm: SignatureAlgorithm,
    /// Metadata XML of trusted counterparts.
    pub trusted_metadata: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            entity_id: String::new(),
            signing_keys: Vec::new(),
            encryption_keys: Vec::new(),
            clock_drift_secs: DEFAULT_CLOCK_DRIFT_SECS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            sign_outgoing: true,
            require_signed_documents: false,
            signature_algorithm: SignatureAlgorithm::default(),
            trusted_metadata: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDP_CERT: &str = include_str!("../../../testdata/idp.crt.pem");
    const IDP_KEY: &str = include_str!("../../../testdata/idp.key.pem");
    const ROTATED_CERT: &str = include_str!("../../../testdata/rotated.crt.pem");
    const ROTATED_KEY: &str = include_str!("../../../testdata/rotated.key.pem");

    #[test]
    fn builder_defaults() {
        let config = Configuration::builder("idp.test").build().unwrap();
        assert_eq!(config.clock_drift, Duration::seconds(30));
        assert_eq!(config.session_timeout, Duration::hours(3));
        assert!(config.sign_outgoing);
        assert!(!config.require_signed_documents);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha256);
        assert!(config.signer().is_none());
    }

    #[test]
    fn newest_signing_key_signs_and_newest_encryption_key_is_tried_first() {
        let config = Configuration::builder("idp.test")
            .signing_key_pair(KeyPair::from_pem(IDP_CERT, IDP_KEY, KeyUse::Signing).unwrap())
            .signing_key_pair(KeyPair::from_pem(ROTATED_CERT, ROTATED_KEY, KeyUse::Signing).unwrap())
            .encryption_key_pair(KeyPair::from_pem(IDP_CERT, IDP_KEY, KeyUse::Encryption).unwrap())
            .encryption_key_pair(KeyPair::from_pem(ROTATED_CERT, ROTATED_KEY, KeyUse::Encryption).unwrap())
            .build()
            .unwrap();

        let rotated = saml_crypto::Certificate::from_pem(ROTATED_CERT).unwrap();
        assert_eq!(config.signing_key_pair().unwrap().certificate, rotated);
        assert_eq!(config.decryption_keys().count(), 2);
        assert!(config.signer().is_some());
        assert!(Configuration { sign_outgoing: false, ..config }.signer().is_none());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(Configuration::builder(" ").build().is_err());
        assert!(Configuration::builder("idp.test")
            .signing_key_pair(KeyPair::from_pem(IDP_CERT, IDP_KEY, KeyUse::Encryption).unwrap())
            .build()
            .is_err());
        assert!(Configuration::builder("idp.test")
            .signature_algorithm(SignatureAlgorithm::RsaSha1)
            .build()
            .is_err());
    }

    #[test]
    fn loads_from_toml() {
        let text = format!(
            r#"
entity_id = "idp.test"
clock_drift_secs = 5
require_signed_documents = true
signature_algorithm = "rsa-sha512"
trusted_metadata = ['''<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="sp.test"><SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"><AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.test/acs" index="0"/></SPSSODescriptor></EntityDescriptor>''']

[[signing_keys]]
certificate = '''{IDP_CERT}'''
private_key = '''{IDP_KEY}'''
"#
        );
        let config = Configuration::from_toml(&text).unwrap();
        assert_eq!(config.entity_id, "idp.test");
        assert_eq!(config.clock_drift, Duration::seconds(5));
        assert_eq!(config.session_timeout, Duration::hours(3));
        assert!(config.require_signed_documents);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha512);
        assert_eq!(config.signing_key_pairs.len(), 1);
        assert!(config.metadata_for("sp.test").is_some());
    }

    #[test]
    fn settings_deserialize_from_json_with_defaults() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "entity_id": "sp.test",
            "sign_outgoing": false,
            "signature_algorithm": "rsa-sha384",
        }))
        .unwrap();
        assert_eq!(settings.clock_drift_secs, DEFAULT_CLOCK_DRIFT_SECS);

        let config = Configuration::from_settings(&settings).unwrap();
        assert!(!config.sign_outgoing);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha384);
        assert!(config.signer().is_none());
    }

    #[test]
    fn invalid_trusted_metadata_is_a_configuration_error() {
        let settings = Settings {
            entity_id: "idp.test".to_string(),
            trusted_metadata: vec!["<EntityDescriptor".to_string()],
            ..Settings::default()
        };
        assert!(matches!(
            Configuration::from_settings(&settings),
            Err(SamlError::Configuration(_))
        ));
    }
}
