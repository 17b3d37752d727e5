//! HTTP-POST binding.
//!
//! The message is base64-encoded into a form field and keeps its embedded
//! XML signature.

use base64::Engine;

use crate::builders::MessageBuilder;
use crate::document::{ProtocolDocument, ValidationContext};
use crate::error::{SamlError, SamlResult};

use super::{BindingParams, SerializedMessage};

pub(super) fn serialize(
    location: &str,
    builder: &mut dyn MessageBuilder,
    relay_state: Option<&str>,
) -> SamlResult<SerializedMessage> {
    builder.set_destination(location);
    let xml = builder.to_xml()?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(xml);

    let mut params = vec![(builder.message_key().to_string(), encoded)];
    if let Some(relay_state) = relay_state {
        params.push(("RelayState".to_string(), relay_state.to_string()));
    }
    Ok(SerializedMessage {
        location: location.to_string(),
        params,
    })
}

pub(super) fn deserialize(params: &BindingParams, context: ValidationContext) -> SamlResult<ProtocolDocument> {
    let (_, message) = params.message()?;
    let compact: String = message.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
    let xml = String::from_utf8(decoded)
        .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8 in message: {e}")))?;
    Ok(ProtocolDocument::parse(&xml, context))
}

pub(super) fn html_form(location: &str, params: &[(String, String)]) -> String {
    let inputs: String = params
        .iter()
        .map(|(name, value)| {
            format!(
                r#"
        <input type="hidden" name="{}" value="{}"/>"#,
                html_escape(name),
                html_escape(value)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">{}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        html_escape(location),
        inputs
    )
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
