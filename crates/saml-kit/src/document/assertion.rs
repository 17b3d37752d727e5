//! The assertion carried by a `Response`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{ErrorKind, TemporalFault, ValidationError};
use crate::signature::Signature;
use crate::types::{parse_instant, SAML_NS};
use crate::xml::Element;

/// A read-only view of a `saml:Assertion` inside a response tree.
///
/// For encrypted assertions the view points into the decrypted tree.
#[derive(Debug, Clone, Copy)]
pub struct Assertion<'a> {
    root: &'a Element,
    path: &'a [usize],
    element: &'a Element,
    encrypted: bool,
}

impl<'a> Assertion<'a> {
    pub(crate) fn new(root: &'a Element, path: &'a [usize], encrypted: bool) -> Option<Self> {
        Some(Self {
            root,
            path,
            element: root.at(path)?,
            encrypted,
        })
    }

    /// The `saml:Assertion` element.
    pub fn element(&self) -> &'a Element {
        self.element
    }

    /// The `ID` attribute.
    pub fn id(&self) -> Option<&'a str> {
        self.element.id()
    }

    /// The `saml:Issuer` value.
    pub fn issuer(&self) -> Option<String> {
        self.element.child_text(SAML_NS, "Issuer")
    }

    /// The `IssueInstant` attribute.
    pub fn issue_instant(&self) -> Option<DateTime<Utc>> {
        self.element.attr("IssueInstant").and_then(parse_instant)
    }

    fn name_id_element(&self) -> Option<&'a Element> {
        self.element
            .descend(&[(SAML_NS, "Subject"), (SAML_NS, "NameID")])
    }

    /// The subject's `NameID`.
    pub fn name_id(&self) -> Option<String> {
        self.name_id_element().map(|name_id| name_id.text().trim().to_string())
    }

    /// The `Format` of the subject's `NameID`.
    pub fn name_id_format(&self) -> Option<&'a str> {
        self.name_id_element()?.attr("Format")
    }

    /// Attribute values by name. Only the first `AttributeValue` of each
    /// attribute is kept; an attribute without values maps to `None`.
    pub fn attributes(&self) -> BTreeMap<String, Option<String>> {
        self.element
            .children_named(SAML_NS, "AttributeStatement")
            .flat_map(|statement| statement.children_named(SAML_NS, "Attribute"))
            .filter_map(|attribute| {
                let name = attribute.attr("Name")?.to_string();
                let value = attribute.child_text(SAML_NS, "AttributeValue");
                Some((name, value))
            })
            .collect()
    }

    /// Audiences from every `AudienceRestriction`.
    pub fn audiences(&self) -> Vec<String> {
        self.element
            .child(SAML_NS, "Conditions")
            .into_iter()
            .flat_map(|conditions| conditions.children_named(SAML_NS, "AudienceRestriction"))
            .flat_map(|restriction| restriction.children_named(SAML_NS, "Audience"))
            .map(|audience| audience.text().trim().to_string())
            .collect()
    }

    fn condition(&self, name: &str) -> Option<DateTime<Utc>> {
        self.element
            .child(SAML_NS, "Conditions")?
            .attr(name)
            .and_then(parse_instant)
    }

    /// `Conditions/@NotBefore`.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.condition("NotBefore")
    }

    /// `Conditions/@NotOnOrAfter`.
    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.condition("NotOnOrAfter")
    }

    /// End of the validity window. Without `NotOnOrAfter`, the assertion
    /// lasts `session_timeout` from its issue instant.
    pub fn expires_at(&self, session_timeout: Duration) -> Option<DateTime<Utc>> {
        self.not_on_or_after()
            .or_else(|| self.issue_instant().map(|issued| issued + session_timeout))
    }

    /// Returns true if `now` is past the validity window.
    pub fn is_expired(&self, now: DateTime<Utc>, session_timeout: Duration) -> bool {
        self.expires_at(session_timeout).is_none_or(|expires| now >= expires)
    }

    /// Returns true if `now` lies in `[NotBefore - drift, NotOnOrAfter)`.
    pub fn is_active(&self, now: DateTime<Utc>, drift: Duration, session_timeout: Duration) -> bool {
        let started = self.started_at().is_none_or(|start| now >= start - drift);
        started && !self.is_expired(now, session_timeout)
    }

    /// `AuthnStatement/@SessionIndex`.
    pub fn session_index(&self) -> Option<&'a str> {
        self.element
            .child(SAML_NS, "AuthnStatement")?
            .attr("SessionIndex")
    }

    /// The authentication context class reference.
    pub fn authn_context_class(&self) -> Option<String> {
        self.element
            .descend(&[
                (SAML_NS, "AuthnStatement"),
                (SAML_NS, "AuthnContext"),
            ])?
            .child_text(SAML_NS, "AuthnContextClassRef")
    }

    /// Returns true if the assertion arrived encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The assertion's own signature.
    pub fn signature(&self) -> Option<Result<Signature, ValidationError>> {
        Signature::find(self.root, self.path)
    }

    /// Returns true if the assertion carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signature().is_some()
    }

    /// The tree the assertion lives in.
    pub(crate) fn root(&self) -> &'a Element {
        self.root
    }

    /// Audience and validity window checks.
    pub(crate) fn check_conditions(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
        drift: Duration,
        session_timeout: Duration,
        errors: &mut Vec<ValidationError>,
    ) {
        let audiences = self.audiences();
        if !audiences.is_empty() && !audiences.iter().any(|audience| audience == entity_id) {
            tracing::warn!("Assertion audiences {:?} exclude {}", audiences, entity_id);
            errors.push(ValidationError::new(
                "audience",
                ErrorKind::TemporalViolation(TemporalFault::AudienceMismatch),
                "must match entity_id.",
            ));
        }

        if self.started_at().is_some_and(|start| now < start - drift) {
            errors.push(ValidationError::new(
                "assertion",
                ErrorKind::TemporalViolation(TemporalFault::NotYetValid),
                "is not yet valid.",
            ));
        } else if self.is_expired(now, session_timeout) {
            errors.push(ValidationError::new(
                "assertion",
                ErrorKind::TemporalViolation(TemporalFault::Expired),
                "must not be expired.",
            ));
        }
    }
}
