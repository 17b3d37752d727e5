//! Ordered, guarded validation rules.

use crate::error::{ErrorKind, ValidationError};

type Guard<T> = fn(&T, &[ValidationError]) -> bool;
type Check<T> = fn(&T, &mut Vec<ValidationError>);

struct Rule<T> {
    name: &'static str,
    guard: Guard<T>,
    check: Check<T>,
}

/// A list of checks run in declaration order.
///
/// Each check has a guard that sees the errors collected so far, which is
/// how later rules are skipped once an earlier stage has failed.
pub(crate) struct Rules<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Rules<T> {
    pub(crate) fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a check that always runs.
    pub(crate) fn always(self, name: &'static str, check: Check<T>) -> Self {
        self.when(name, |_, _| true, check)
    }

    /// Adds a check that runs only while no error has been recorded.
    pub(crate) fn when_clean(self, name: &'static str, check: Check<T>) -> Self {
        self.when(name, |_, errors| errors.is_empty(), check)
    }

    /// Adds a check that runs only while the document is structurally sound,
    /// i.e. it parsed, conforms to the schema, has the expected root and
    /// the supported version.
    pub(crate) fn when_sound(self, name: &'static str, check: Check<T>) -> Self {
        self.when(name, |_, errors| is_sound(errors), check)
    }

    /// Adds a check with a custom guard.
    pub(crate) fn when(mut self, name: &'static str, guard: Guard<T>, check: Check<T>) -> Self {
        self.rules.push(Rule { name, guard, check });
        self
    }

    /// Runs every rule whose guard passes.
    pub(crate) fn run(&self, target: &T) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            if (rule.guard)(target, &errors) {
                let before = errors.len();
                (rule.check)(target, &mut errors);
                if errors.len() > before {
                    tracing::debug!("Rule '{}' reported {} error(s)", rule.name, errors.len() - before);
                }
            }
        }
        errors
    }
}

/// True when none of the structural stages reported an error.
pub(crate) fn is_sound(errors: &[ValidationError]) -> bool {
    !errors.iter().any(|error| {
        matches!(
            error.kind,
            ErrorKind::ParseFailure
                | ErrorKind::SchemaViolation
                | ErrorKind::UnexpectedDocumentType
                | ErrorKind::VersionMismatch
        )
    })
}
