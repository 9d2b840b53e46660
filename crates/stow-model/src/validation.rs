//! Validation hooks.
//!
//! Rule evaluation belongs to callers: a model type only collects
//! [`Validator`]s and `before_validation` hooks and runs them when a record
//! is checked. Errors are plain messages.

use std::sync::Arc;

use stow_types::attributes::is_blank;

use crate::record::Record;

/// Callback run before validators, e.g. to normalise attributes.
pub type Hook = Arc<dyn Fn(&Record) + Send + Sync>;

/// A validation rule attached to a model type.
pub trait Validator: Send + Sync {
    /// Push one message onto `errors` for each problem found on `record`.
    fn validate(&self, record: &Record, errors: &mut Vec<String>);
}

impl<F> Validator for F
where
    F: Fn(&Record, &mut Vec<String>) + Send + Sync,
{
    fn validate(&self, record: &Record, errors: &mut Vec<String>) {
        self(record, errors)
    }
}

/// Requires the named attribute to be present and not blank.
#[derive(Clone, Debug)]
pub struct Presence(pub String);

impl Presence {
    pub fn of(field: impl Into<String>) -> Self {
        Self(field.into())
    }
}

impl Validator for Presence {
    fn validate(&self, record: &Record, errors: &mut Vec<String>) {
        if record.get(&self.0).map_or(true, |value| is_blank(&value)) {
            errors.push(format!("{} can't be blank", self.0));
        }
    }
}

/// Invalid when any child in the named embedded list is invalid.
#[derive(Clone, Debug)]
pub(crate) struct EmbeddedValid {
    list: String,
}

impl EmbeddedValid {
    pub(crate) fn new(list: &str) -> Self {
        Self {
            list: list.to_string(),
        }
    }
}

impl Validator for EmbeddedValid {
    fn validate(&self, record: &Record, errors: &mut Vec<String>) {
        let Ok(children) = record.embedded(&self.list) else {
            return;
        };
        // Every child is checked so each one carries its own errors.
        let invalid = children.iter().filter(|child| !child.is_valid()).count();
        if invalid > 0 {
            errors.push(format!("{} is invalid", self.list));
        }
    }
}
