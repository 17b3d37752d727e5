//! Web SSO integration tests.
//!
//! The SP sends an AuthnRequest to the IdP, the IdP answers with a signed
//! and encrypted Response delivered to the SP's assertion consumer service.

use chrono::{Duration, Utc};
use saml_kit::bindings::{Binding, BindingParams};
use saml_kit::builders::{AuthnRequestBuilder, ResponseBuilder};
use saml_kit::document::{AuthnRequest, Response};
use saml_kit::error::{SignatureFault, TemporalFault, TrustFault};
use saml_kit::{
    status_codes, ErrorKind, NameIdFormat, ProtocolDocument, ProtocolMessage, SamlBinding, ValidationContext,
};

use crate::common::{Alice, TestEnv, ROTATED_CERT, ROTATED_KEY, SP_ACS, SP_CERT, SP_KEY};

/// Sends an AuthnRequest from the SP to the IdP over `binding`.
fn send_authn_request(env: &TestEnv, binding: SamlBinding) -> anyhow::Result<AuthnRequest> {
    let endpoint = env
        .idp_metadata
        .single_sign_on_service_for(binding)
        .ok_or_else(|| anyhow::anyhow!("IdP has no {binding:?} SSO endpoint"))?;
    let binding = Binding::from_endpoint(endpoint);

    let mut builder = AuthnRequestBuilder::new(env.sp.clone()).name_id_format(NameIdFormat::Email);
    let message = binding.serialize(&mut builder, Some("/dashboard"))?;
    let params = if message.params.is_empty() {
        BindingParams::from_url(&message.location)?
    } else {
        BindingParams::from_form(message.params)
    };
    assert_eq!(params.relay_state(), Some("/dashboard"));

    match binding.deserialize(&params, ValidationContext::new(env.idp.clone()))? {
        ProtocolDocument::AuthnRequest(request) => Ok(request),
        other => anyhow::bail!("expected an AuthnRequest, got {}", other.name()),
    }
}

/// Delivers the IdP's answer to the SP's POST assertion consumer service.
fn deliver_response(
    env: &TestEnv,
    builder: &mut ResponseBuilder,
    context: ValidationContext,
) -> anyhow::Result<ProtocolDocument> {
    let acs = env
        .sp_metadata
        .assertion_consumer_service_for(Some(SamlBinding::HttpPost))
        .ok_or_else(|| anyhow::anyhow!("SP has no POST ACS"))?;
    let binding = Binding::from_endpoint(acs);
    let message = binding.serialize(builder, None)?;
    Ok(binding.deserialize(&BindingParams::from_form(message.params), context)?)
}

fn kinds(document: &ProtocolDocument) -> Vec<ErrorKind> {
    document.errors().iter().map(|error| error.kind).collect()
}

/// Tests a complete POST round trip with an encrypted assertion.
#[test]
fn test_post_sso_round_trip() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = send_authn_request(&env, SamlBinding::HttpPost)?;
    assert!(request.is_valid(), "{:?}", request.errors());
    assert!(request.is_signed());
    assert_eq!(request.issuer().as_deref(), Some("https://sp.test/metadata"));
    assert_eq!(request.assertion_consumer_service_url().as_deref(), Some(SP_ACS));

    let mut builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request);
    let request_id = request.id().unwrap_or_default().to_string();
    let document = deliver_response(&env, &mut builder, ValidationContext::new(env.sp.clone()).in_response_to(&request_id))?;

    assert!(document.is_valid(), "{:?}", document.errors());
    assert_eq!(document.id(), Some(builder.id.as_str()));
    assert_eq!(document.issuer().as_deref(), Some("https://idp.test/metadata"));

    let response = document.as_response().ok_or_else(|| anyhow::anyhow!("not a Response"))?;
    assert!(response.is_encrypted());
    assert_eq!(response.in_response_to(), Some(request_id.as_str()));
    assert_eq!(response.name_id().as_deref(), Some("alice@example.com"));
    assert_eq!(
        response.attributes().get("groups").cloned().flatten().as_deref(),
        Some("admins")
    );

    let assertion = response.assertion().ok_or_else(|| anyhow::anyhow!("no assertion"))?;
    assert!(assertion.is_signed());
    assert_eq!(assertion.audiences(), ["https://sp.test/metadata"]);
    assert!(assertion.is_active(Utc::now(), env.sp.clock_drift, env.sp.session_timeout));

    Ok(())
}

/// Tests that a redirect AuthnRequest is accepted on its transport signature.
#[test]
fn test_redirect_authn_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let request = send_authn_request(&env, SamlBinding::HttpRedirect)?;
    assert!(request.is_valid(), "{:?}", request.errors());
    assert!(!request.is_signed());
    assert!(request.document().is_transport_verified());
    assert_eq!(request.name_id_format(), Some(NameIdFormat::Email.uri()));

    Ok(())
}

/// Tests that a Requester status fails validation.
#[test]
fn test_requester_status_is_invalid() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let mut builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request)
        .status(status_codes::REQUESTER, Some("unknown user"));
    let document = deliver_response(&env, &mut builder, ValidationContext::new(env.sp.clone()))?;

    assert_eq!(kinds(&document), [ErrorKind::UnsuccessfulStatus]);
    assert_eq!(document.errors()[0].to_string(), "status_code must be Success.");

    Ok(())
}

/// Tests that editing a signed response breaks its digest.
#[test]
fn test_tampered_response_fails_digest() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request).encryption_certificate(None);
    let xml = saml_kit::builders::MessageBuilder::to_xml(&builder)?;
    let tampered = xml.replace("consent:unspecified", "consent:obtained");
    assert_ne!(xml, tampered);

    let response = Response::parse(&tampered, ValidationContext::new(env.sp.clone()));
    assert!(response
        .errors()
        .iter()
        .any(|error| error.kind == ErrorKind::SignatureInvalid(SignatureFault::Digest)));

    Ok(())
}

/// Tests that an assertion past NotOnOrAfter is expired despite a valid signature.
#[test]
fn test_expired_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let mut builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request);
    let later = Utc::now() + env.sp.session_timeout + Duration::minutes(5);
    let document = deliver_response(&env, &mut builder, ValidationContext::new(env.sp.clone()).at(later))?;

    assert_eq!(kinds(&document), [ErrorKind::TemporalViolation(TemporalFault::Expired)]);

    Ok(())
}

/// Tests decryption after the SP rotated its encryption key.
#[test]
fn test_decryption_with_rotated_keys() -> anyhow::Result<()> {
    let env = TestEnv::with_sp_encryption_keys(&[(SP_CERT, SP_KEY), (ROTATED_CERT, ROTATED_KEY)])?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let mut builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request);
    assert_eq!(env.sp_metadata.encryption_certificates().len(), 2);
    let document = deliver_response(&env, &mut builder, ValidationContext::new(env.sp.clone()))?;

    assert!(document.is_valid(), "{:?}", document.errors());
    let response = document.as_response().ok_or_else(|| anyhow::anyhow!("not a Response"))?;
    assert!(response.is_encrypted());
    assert_eq!(response.name_id().as_deref(), Some("alice@example.com"));

    Ok(())
}

/// Tests that an assertion encrypted for a retired key is reported, not raised.
#[test]
fn test_undecryptable_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let retired = saml_crypto::Certificate::from_pem(ROTATED_CERT)?;
    let mut builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request).encryption_certificate(Some(retired));
    let document = deliver_response(&env, &mut builder, ValidationContext::new(env.sp.clone()))?;

    let response = document.as_response().ok_or_else(|| anyhow::anyhow!("not a Response"))?;
    assert!(response.is_undecryptable());
    assert_eq!(kinds(&document), [ErrorKind::DecryptionFailure]);

    Ok(())
}

/// Tests that a response from an unknown IdP is untrusted.
#[test]
fn test_unregistered_issuer_is_untrusted() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let stranger = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let builder = ResponseBuilder::new(env.idp.clone(), &Alice, &request).encryption_certificate(None);
    let xml = saml_kit::builders::MessageBuilder::to_xml(&builder)?;
    let response = Response::parse(&xml, ValidationContext::new(stranger.idp.clone()));

    assert!(response
        .errors()
        .iter()
        .any(|error| error.kind == ErrorKind::TrustViolation(TrustFault::Unregistered)));

    Ok(())
}

/// Tests that validation results are memoized.
#[test]
fn test_validation_is_idempotent() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let request = send_authn_request(&env, SamlBinding::HttpPost)?;

    let first = request.errors().to_vec();
    assert_eq!(first, request.errors());
    assert_eq!(request.errors().as_ptr(), request.errors().as_ptr());

    Ok(())
}
