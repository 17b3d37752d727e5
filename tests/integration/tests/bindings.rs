//! Binding integration tests.
//!
//! Transport-level failures are hard errors, unlike content problems which
//! surface as validation errors on the parsed document.

use saml_kit::bindings::{Binding, BindingParams};
use saml_kit::builders::AuthnRequestBuilder;
use saml_kit::{SamlBinding, SamlError, ValidationContext};

use crate::common::{TestEnv, IDP_SSO, SP_ACS};

fn redirect_url(env: &TestEnv, relay_state: Option<&str>) -> anyhow::Result<String> {
    let mut builder = AuthnRequestBuilder::new(env.sp.clone()).assertion_consumer_service_url(SP_ACS);
    let binding = Binding::new(SamlBinding::HttpRedirect.uri(), IDP_SSO);
    Ok(binding.serialize(&mut builder, relay_state)?.location)
}

fn query_value<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(key)?.strip_prefix('='))
}

fn receive_redirect(env: &TestEnv, url: &str) -> Result<saml_kit::ProtocolDocument, SamlError> {
    let binding = Binding::new(SamlBinding::HttpRedirect.uri(), IDP_SSO);
    binding.deserialize(&BindingParams::from_url(url)?, ValidationContext::new(env.idp.clone()))
}

/// Tests that changing any signed redirect parameter breaks the transport signature.
#[test]
fn test_redirect_parameters_are_signed() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let url = redirect_url(&env, Some("first"))?;
    assert!(receive_redirect(&env, &url)?.is_valid());

    let other = redirect_url(&env, Some("first"))?;
    let message = query_value(&url, "SAMLRequest").ok_or_else(|| anyhow::anyhow!("no SAMLRequest"))?;
    let other_message = query_value(&other, "SAMLRequest").ok_or_else(|| anyhow::anyhow!("no SAMLRequest"))?;
    assert_ne!(message, other_message);

    let tampered = [
        url.replace(message, other_message),
        url.replace("RelayState=first", "RelayState=second"),
        url.replace("rsa-sha256", "rsa-sha384"),
    ];
    for url in tampered {
        let result = receive_redirect(&env, &url);
        assert!(matches!(result, Err(SamlError::TransportSignature(_))), "{url}: {result:?}");
    }

    Ok(())
}

/// Tests that Signature and SigAlg must be sent together.
#[test]
fn test_signature_requires_sig_alg() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let url = redirect_url(&env, None)?;
    let sig_alg = query_value(&url, "SigAlg").ok_or_else(|| anyhow::anyhow!("no SigAlg"))?;

    let without_sig_alg = url.replace(&format!("&SigAlg={sig_alg}"), "");
    assert!(matches!(
        receive_redirect(&env, &without_sig_alg),
        Err(SamlError::MissingSignatureAlgorithm)
    ));

    Ok(())
}

/// Tests that a request without SAMLRequest or SAMLResponse is rejected.
#[test]
fn test_missing_message() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    for binding in [SamlBinding::HttpRedirect, SamlBinding::HttpPost] {
        let result = Binding::new(binding.uri(), IDP_SSO).deserialize(
            &BindingParams::from_form([("RelayState", "state")]),
            ValidationContext::new(env.idp.clone()),
        );
        assert!(matches!(result, Err(SamlError::MissingMessage)));
    }

    Ok(())
}

/// Tests that unsupported bindings fail both ways.
#[test]
fn test_unsupported_binding() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let binding = Binding::new(SamlBinding::Soap.uri(), IDP_SSO);

    let mut builder = AuthnRequestBuilder::new(env.sp.clone());
    assert!(matches!(
        binding.serialize(&mut builder, None),
        Err(SamlError::UnsupportedBinding(_))
    ));
    assert!(matches!(
        binding.deserialize(
            &BindingParams::from_form([("SAMLRequest", "PHNhbWxwOkF1dGhuUmVxdWVzdC8+")]),
            ValidationContext::new(env.idp.clone()),
        ),
        Err(SamlError::UnsupportedBinding(_))
    ));

    Ok(())
}

/// Tests the auto-submitting form of the POST binding.
#[test]
fn test_post_form() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let mut builder = AuthnRequestBuilder::new(env.sp.clone());
    let message = Binding::new(SamlBinding::HttpPost.uri(), IDP_SSO).serialize(&mut builder, Some("a&b"))?;

    let html = message.to_html_form();
    assert!(html.contains(r#"<form method="post" action="https://idp.test/sso">"#));
    assert!(html.contains(r#"name="SAMLRequest""#));
    assert!(html.contains(r#"name="RelayState" value="a&amp;b""#));

    Ok(())
}
