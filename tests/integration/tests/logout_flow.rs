//! Single logout integration tests.

use saml_kit::bindings::{Binding, BindingParams};
use saml_kit::builders::{LogoutRequestBuilder, LogoutResponseBuilder};
use saml_kit::document::LogoutRequest;
use saml_kit::{ProtocolDocument, ProtocolMessage, SamlBinding, ValidationContext};

use crate::common::{Alice, TestEnv, SP_SLO};

fn receive(binding: &Binding, location: &str, params: Vec<(String, String)>, context: ValidationContext) -> anyhow::Result<ProtocolDocument> {
    let params = if params.is_empty() {
        BindingParams::from_url(location)?
    } else {
        BindingParams::from_form(params)
    };
    Ok(binding.deserialize(&params, context)?)
}

/// Tests SP-initiated logout: redirect request, POST response.
#[test]
fn test_sp_initiated_logout() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let slo = env
        .idp_metadata
        .single_logout_service_for(SamlBinding::HttpRedirect)
        .ok_or_else(|| anyhow::anyhow!("IdP has no redirect SLO"))?;
    let to_idp = Binding::from_endpoint(slo);
    let mut request_builder = LogoutRequestBuilder::new(env.sp.clone(), &Alice).session_index("_session-1");
    let message = to_idp.serialize(&mut request_builder, None)?;

    let received = receive(&to_idp, &message.location, message.params, ValidationContext::new(env.idp.clone()))?;
    assert!(received.is_valid(), "{:?}", received.errors());
    let request: &LogoutRequest = received
        .as_logout_request()
        .ok_or_else(|| anyhow::anyhow!("not a LogoutRequest"))?;
    assert!(request.document().is_transport_verified());
    assert_eq!(request.name_id().as_deref(), Some("8f1c2e0a-alice"));
    assert_eq!(request.session_indexes(), ["_session-1"]);

    let mut response_builder = LogoutResponseBuilder::new(env.idp.clone(), request);
    assert_eq!(response_builder.destination.as_deref(), Some(SP_SLO));
    let to_sp = Binding::new(SamlBinding::HttpPost.uri(), SP_SLO);
    let message = to_sp.serialize(&mut response_builder, Some("bye"))?;

    let context = ValidationContext::new(env.sp.clone()).in_response_to(request_builder.id.as_str());
    let answer = receive(&to_sp, &message.location, message.params, context)?;
    assert!(answer.is_valid(), "{:?}", answer.errors());
    let response = answer
        .as_logout_response()
        .ok_or_else(|| anyhow::anyhow!("not a LogoutResponse"))?;
    assert!(response.is_success());
    assert!(response.is_signed());
    assert_eq!(response.in_response_to(), Some(request_builder.id.as_str()));

    Ok(())
}

/// Tests that a logout response answering another request is rejected.
#[test]
fn test_logout_response_for_other_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let xml = LogoutRequestBuilder::new(env.sp.clone(), &Alice).build()?.content().to_string();
    let request = LogoutRequest::parse(&xml, ValidationContext::new(env.idp.clone()));
    let response = LogoutResponseBuilder::new(env.idp.clone(), &request).build()?;

    let received = saml_kit::document::LogoutResponse::parse(
        response.content(),
        ValidationContext::new(env.sp.clone()).in_response_to("_another"),
    );
    assert_eq!(received.errors().len(), 1);
    assert_eq!(received.errors()[0].to_string(), "in_response_to must match request ID.");

    Ok(())
}
