//! `xs:dateTime` handling.
//!
//! SAML timestamps are UTC. Values without a zone designator are read as UTC,
//! and everything this crate writes carries a trailing `Z` with whole seconds.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Parses an `xs:dateTime` value.
#[must_use]
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Formats an instant the way SAML messages carry it.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
