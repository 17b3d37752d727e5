//! Documents that could not be recognized.

use crate::error::{ErrorKind, ValidationError};

use super::validation::Rules;
use super::{Document, ProtocolMessage, ValidationContext};

/// Content that is not well-formed XML or has an unknown root element.
///
/// Always invalid.
#[derive(Debug)]
pub struct InvalidDocument {
    pub(super) document: Document,
}

impl InvalidDocument {
    pub(crate) fn new(xml: &str, parse_error: Option<String>, context: ValidationContext) -> Self {
        let root = Err(parse_error.unwrap_or_else(|| "is not a recognized SAML document.".to_string()));
        Self {
            document: Document::new("InvalidDocument", xml, root, context),
        }
    }

    fn rules() -> Rules<Self> {
        Rules::<Self>::new().always("base", |invalid, errors| {
            let document = invalid.document();
            if document.content.trim().is_empty() {
                errors.push(ValidationError::new("content", ErrorKind::ParseFailure, "can't be blank."));
            } else {
                errors.push(ValidationError::new(
                    "base",
                    ErrorKind::ParseFailure,
                    document.parse_error().unwrap_or_default(),
                ));
            }
        })
    }
}

impl ProtocolMessage for InvalidDocument {
    fn document(&self) -> &Document {
        &self.document
    }

    fn errors(&self) -> &[ValidationError] {
        self.document.errors_with(self, Self::rules)
    }
}
