//! HTTP-Redirect binding.
//!
//! The message travels DEFLATE-compressed in the query string. The embedded
//! XML signature is replaced by a transport signature over
//! `SAMLRequest|SAMLResponse`, `RelayState` and `SigAlg` as they appear
//! URL-encoded on the wire.

use std::io::{Read, Write};
use std::sync::Arc;

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::builders::MessageBuilder;
use crate::document::{ProtocolDocument, ValidationContext};
use crate::error::{SamlError, SamlResult};
use crate::signature::{signed_query, verify_query};

use super::{BindingParams, SerializedMessage};

pub(super) fn serialize(
    location: &str,
    builder: &mut dyn MessageBuilder,
    relay_state: Option<&str>,
) -> SamlResult<SerializedMessage> {
    builder.set_destination(location);
    builder.set_embedded_signature(false);
    let xml = builder.to_xml()?;

    let compressed = deflate_compress(xml.as_bytes())?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);
    let message = urlencoding::encode(&encoded);
    let relay_state = relay_state.map(urlencoding::encode);

    let mut query = match builder.configuration().signer() {
        Some(signer) => {
            let sig_alg = urlencoding::encode(signer.algorithm().uri());
            let query = signed_query(builder.message_key(), &message, relay_state.as_deref(), Some(sig_alg.as_ref()));
            let signature = signer.sign_query(&query)?;
            format!("{query}&Signature={}", urlencoding::encode(&signature))
        }
        None => signed_query(builder.message_key(), &message, relay_state.as_deref(), None),
    };

    let separator = if location.contains('?') { '&' } else { '?' };
    query.insert(0, separator);
    Ok(SerializedMessage {
        location: format!("{location}{query}"),
        params: Vec::new(),
    })
}

pub(super) fn deserialize(params: &BindingParams, context: ValidationContext) -> SamlResult<ProtocolDocument> {
    let (key, message) = params.message()?;
    let signature = params.get("Signature");
    let sig_alg = params.get("SigAlg");
    if signature.is_some() != sig_alg.is_some() {
        return Err(SamlError::MissingSignatureAlgorithm);
    }

    let compressed = base64::engine::general_purpose::STANDARD.decode(message.trim())?;
    let xml = String::from_utf8(deflate_decompress(&compressed)?)
        .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8 in message: {e}")))?;

    let registry = Arc::clone(&context.configuration().registry);
    let document = ProtocolDocument::parse(&xml, context);

    let (Some(signature), Some(sig_alg)) = (signature, sig_alg) else {
        return Ok(document);
    };
    let Some(metadata) = document.issuer().and_then(|issuer| registry.lookup(&issuer)) else {
        tracing::debug!("Skipping transport signature check: issuer is not registered");
        return Ok(document);
    };

    let query = signed_query(key, params.raw(key).unwrap_or_default(), params.raw("RelayState"), params.raw("SigAlg"));
    let verified = metadata
        .signing_certificates()
        .into_iter()
        .any(|certificate| verify_query(certificate, &query, sig_alg, signature));
    if !verified {
        tracing::warn!("Redirect signature from {:?} does not verify", metadata.entity_id());
        return Err(SamlError::TransportSignature(format!(
            "no registered certificate of {} verifies the signature",
            metadata.entity_id().unwrap_or_default()
        )));
    }

    tracing::debug!("Verified redirect signature of {}", document.name());
    Ok(document.with_transport_signature_verified())
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Largest inflated message accepted from a query string, in bytes.
pub const MAX_INFLATED_SIZE: u64 = 1024 * 1024;

/// Decompresses raw DEFLATE data, refusing output above [`MAX_INFLATED_SIZE`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_INFLATED_SIZE + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() as u64 > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "Decompressed message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Binding;
    use crate::builders::{fixtures::User, AuthnRequestBuilder, LogoutRequestBuilder};
    use crate::document::{fixtures, ProtocolMessage};
    use crate::types::SamlBinding;

    fn redirect() -> Binding {
        Binding::new(SamlBinding::HttpRedirect.uri(), "https://idp.test/sso")
    }

    fn serialized(relay_state: Option<&str>) -> String {
        let mut builder = AuthnRequestBuilder::new(fixtures::sp()).assertion_consumer_service_url("https://sp.test/acs");
        redirect().serialize(&mut builder, relay_state).unwrap().location
    }

    fn received(url: &str) -> SamlResult<ProtocolDocument> {
        redirect().deserialize(&BindingParams::from_url(url)?, ValidationContext::new(fixtures::idp()))
    }

    #[test]
    fn deflate_round_trip() {
        let data = b"<samlp:AuthnRequest/>";
        assert_eq!(deflate_decompress(&deflate_compress(data).unwrap()).unwrap(), data);
    }

    #[test]
    fn oversized_inflation_is_refused() {
        let limit = usize::try_from(MAX_INFLATED_SIZE).unwrap();
        let at_limit = deflate_compress(&vec![b'a'; limit]).unwrap();
        assert_eq!(deflate_decompress(&at_limit).unwrap().len(), limit);

        let bomb = deflate_compress(&vec![b'a'; limit * 4]).unwrap();
        assert!(bomb.len() < 16 * 1024);
        assert!(matches!(deflate_decompress(&bomb), Err(SamlError::Deflate(_))));
    }

    #[test]
    fn signed_redirect_is_transport_verified() {
        let url = serialized(Some("state/1"));
        assert!(url.starts_with("https://idp.test/sso?SAMLRequest="));
        assert!(url.contains("&RelayState=state%2F1&SigAlg="));

        let document = received(&url).unwrap();
        let request = document.as_authn_request().unwrap();
        assert!(!request.is_signed());
        assert!(request.document().is_transport_verified());
        assert!(document.is_valid(), "{:?}", document.errors());
        assert_eq!(request.assertion_consumer_service_url().as_deref(), Some("https://sp.test/acs"));
    }

    #[test]
    fn tampering_with_signed_parameters_is_rejected() {
        let url = serialized(Some("state"));
        let tampered = [
            url.replace("RelayState=state", "RelayState=other"),
            url.replace("rsa-sha256", "rsa-sha512"),
        ];
        for url in tampered {
            assert!(matches!(received(&url), Err(SamlError::TransportSignature(_))), "{url}");
        }
    }

    #[test]
    fn signature_and_algorithm_go_together() {
        let url = serialized(None);
        let (without_signature, _) = url.split_once("&Signature=").unwrap();
        assert!(matches!(
            received(without_signature),
            Err(SamlError::MissingSignatureAlgorithm)
        ));
    }

    #[test]
    fn existing_query_is_extended() {
        let binding = Binding::new(SamlBinding::HttpRedirect.uri(), "https://idp.test/slo?tenant=a");
        let mut builder = LogoutRequestBuilder::new(fixtures::sp(), &User);
        let url = binding.serialize(&mut builder, None).unwrap().location;
        assert!(url.starts_with("https://idp.test/slo?tenant=a&SAMLRequest="));
        assert_eq!(builder.destination.as_deref(), Some("https://idp.test/slo?tenant=a"));
        assert!(!builder.embed_signature);
    }

    #[test]
    fn unsigned_redirect_from_unsigned_configuration() {
        let config = Arc::new(crate::config::Configuration {
            sign_outgoing: false,
            ..(*fixtures::sp()).clone()
        });
        let mut builder = AuthnRequestBuilder::new(config).assertion_consumer_service_url("https://sp.test/acs");
        let url = redirect().serialize(&mut builder, None).unwrap().location;
        assert!(!url.contains("Signature="));

        let document = received(&url).unwrap();
        assert!(document.is_valid(), "{:?}", document.errors());
        assert!(!document.as_authn_request().unwrap().document().is_transport_verified());
    }

    #[test]
    fn garbage_payloads_are_hard_errors() {
        assert!(matches!(
            received("https://idp.test/sso?SAMLRequest=%%%"),
            Err(SamlError::Base64Decode(_))
        ));
        assert!(matches!(
            received("https://idp.test/sso?RelayState=x"),
            Err(SamlError::MissingMessage)
        ));
    }
}
