//! Schema validation seam.
//!
//! [`StructuralSchema`] checks the constraints of the SAML protocol,
//! assertion and metadata schemas that the rest of the crate depends on.
//! Deployments that need full XSD validation can plug in their own
//! [`SchemaValidator`].

use std::fmt;

use crate::types::{parse_instant, MD_NS, SAMLP_NS, SAML_NS};

use super::Element;

/// Validates a parsed document against a schema.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// Returns one message per violation; empty when the document conforms.
    fn validate(&self, root: &Element) -> Vec<String>;
}

/// Built-in structural rules for protocol and metadata documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSchema;

const PROTOCOL_ROOTS: [&str; 4] = ["AuthnRequest", "Response", "LogoutRequest", "LogoutResponse"];

impl SchemaValidator for StructuralSchema {
    fn validate(&self, root: &Element) -> Vec<String> {
        let mut violations = Vec::new();

        let known_root = match root.namespace.as_deref() {
            Some(SAMLP_NS) => PROTOCOL_ROOTS.contains(&root.name.as_str()),
            Some(MD_NS) => root.name == "EntityDescriptor",
            _ => false,
        };
        if !known_root {
            violations.push(format!(
                "Element '{}': No matching global declaration available for the validation root.",
                expanded_name(root)
            ));
            return violations;
        }

        check(root, &mut violations);
        violations
    }
}

fn check(element: &Element, violations: &mut Vec<String>) {
    match (element.namespace.as_deref(), element.name.as_str()) {
        (Some(SAMLP_NS), name) if PROTOCOL_ROOTS.contains(&name) => {
            check_request_abstract(element, violations);
            match name {
                "Response" | "LogoutResponse" => check_status(element, violations),
                "LogoutRequest" => {
                    optional_instant(element, "NotOnOrAfter", violations);
                    let identified = ["NameID", "EncryptedID", "BaseID"]
                        .iter()
                        .any(|child| element.child(SAML_NS, child).is_some());
                    if !identified {
                        violations.push(missing_child(element, "NameID"));
                    }
                }
                _ => {}
            }
        }
        (Some(SAML_NS), "Assertion") => {
            check_request_abstract(element, violations);
            let first = element.elements().next();
            if !first.is_some_and(|child| child.is(SAML_NS, "Issuer")) {
                violations.push(missing_child(element, "Issuer"));
            }
        }
        (Some(SAML_NS), "Conditions") | (Some(SAML_NS), "SubjectConfirmationData") => {
            optional_instant(element, "NotBefore", violations);
            optional_instant(element, "NotOnOrAfter", violations);
        }
        (Some(SAML_NS), "SubjectConfirmation") => {
            required(element, "Method", violations);
        }
        (Some(SAML_NS), "AuthnStatement") => {
            if required(element, "AuthnInstant", violations) {
                optional_instant(element, "AuthnInstant", violations);
            }
        }
        (Some(SAML_NS), "Attribute") => {
            required(element, "Name", violations);
        }
        (Some(MD_NS), "EntityDescriptor") => {
            required(element, "entityID", violations);
            optional_ncname(element, violations);
            let has_role = element.elements().any(|child| {
                child.namespace.as_deref() == Some(MD_NS) && child.name.ends_with("Descriptor")
            });
            if !has_role {
                violations.push(missing_child(element, "SPSSODescriptor or IDPSSODescriptor"));
            }
        }
        (Some(MD_NS), "SPSSODescriptor") => {
            required(element, "protocolSupportEnumeration", violations);
            if element.child(MD_NS, "AssertionConsumerService").is_none() {
                violations.push(missing_child(element, "AssertionConsumerService"));
            }
        }
        (Some(MD_NS), "IDPSSODescriptor") => {
            required(element, "protocolSupportEnumeration", violations);
            if element.child(MD_NS, "SingleSignOnService").is_none() {
                violations.push(missing_child(element, "SingleSignOnService"));
            }
        }
        (Some(MD_NS), "AssertionConsumerService") => {
            check_endpoint(element, violations);
            if required(element, "index", violations)
                && element.attr("index").and_then(|v| v.parse::<u16>().ok()).is_none()
            {
                violations.push(invalid_value(element, "index"));
            }
        }
        (Some(MD_NS), "SingleLogoutService" | "SingleSignOnService") => {
            check_endpoint(element, violations);
        }
        (Some(MD_NS), "KeyDescriptor") => {
            if let Some(usage) = element.attr("use") {
                if usage != "signing" && usage != "encryption" {
                    violations.push(invalid_value(element, "use"));
                }
            }
        }
        _ => {}
    }

    for child in element.elements() {
        check(child, violations);
    }
}

fn check_request_abstract(element: &Element, violations: &mut Vec<String>) {
    if required(element, "ID", violations) {
        optional_ncname(element, violations);
    }
    required(element, "Version", violations);
    if required(element, "IssueInstant", violations) {
        optional_instant(element, "IssueInstant", violations);
    }
}

fn check_status(element: &Element, violations: &mut Vec<String>) {
    match element.child(SAMLP_NS, "Status") {
        Some(status) => match status.child(SAMLP_NS, "StatusCode") {
            Some(code) => {
                required(code, "Value", violations);
            }
            None => violations.push(missing_child(status, "StatusCode")),
        },
        None => violations.push(missing_child(element, "Status")),
    }
}

fn check_endpoint(element: &Element, violations: &mut Vec<String>) {
    required(element, "Binding", violations);
    required(element, "Location", violations);
}

fn required(element: &Element, attribute: &str, violations: &mut Vec<String>) -> bool {
    if element.attr(attribute).is_some() {
        return true;
    }
    violations.push(format!(
        "Element '{}': The attribute '{attribute}' is required but missing.",
        expanded_name(element)
    ));
    false
}

fn optional_instant(element: &Element, attribute: &str, violations: &mut Vec<String>) {
    if let Some(value) = element.attr(attribute) {
        if parse_instant(value).is_none() {
            violations.push(invalid_value(element, attribute));
        }
    }
}

fn optional_ncname(element: &Element, violations: &mut Vec<String>) {
    if let Some(id) = element.attr("ID") {
        if !is_ncname(id) {
            violations.push(invalid_value(element, "ID"));
        }
    }
}

fn invalid_value(element: &Element, attribute: &str) -> String {
    format!(
        "Element '{}', attribute '{attribute}': '{}' is not a valid value.",
        expanded_name(element),
        element.attr(attribute).unwrap_or_default()
    )
}

fn missing_child(element: &Element, child: &str) -> String {
    format!(
        "Element '{}': Missing child element(s). Expected is ( {child} ).",
        expanded_name(element)
    )
}

fn expanded_name(element: &Element) -> String {
    match &element.namespace {
        Some(namespace) => format!("{{{namespace}}}{}", element.name),
        None => element.name.clone(),
    }
}

fn is_ncname(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
