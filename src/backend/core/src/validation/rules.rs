//! Reusable field rules.

use regex::Regex;
use std::sync::LazyLock;

use crate::validation::error::{FieldError, ValidationErrorKind};

/// `local@domain.tld`; a dotted domain is required.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email regex compiles")
});

/// A check applied to one field value. Returns the failure, if any.
pub trait ValidationRule<T: ?Sized> {
    fn validate(&self, value: &T) -> Option<FieldError>;
}

fn fail_if(failed: bool, kind: impl FnOnce() -> ValidationErrorKind) -> Option<FieldError> {
    failed.then(|| FieldError::new(kind()))
}

/// Not empty after trimming.
#[derive(Debug, Clone, Copy)]
pub struct Required;

impl ValidationRule<String> for Required {
    fn validate(&self, value: &String) -> Option<FieldError> {
        fail_if(value.trim().is_empty(), || ValidationErrorKind::Required)
    }
}

/// At least this many characters.
#[derive(Debug, Clone, Copy)]
pub struct MinLength(pub usize);

impl ValidationRule<String> for MinLength {
    fn validate(&self, value: &String) -> Option<FieldError> {
        let actual = value.chars().count();
        fail_if(actual < self.0, || ValidationErrorKind::MinLength {
            min: self.0,
            actual,
        })
    }
}

/// At most this many characters.
#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

impl ValidationRule<String> for MaxLength {
    fn validate(&self, value: &String) -> Option<FieldError> {
        let actual = value.chars().count();
        fail_if(actual > self.0, || ValidationErrorKind::MaxLength {
            max: self.0,
            actual,
        })
    }
}

/// Email shape. A blank value passes so that [`Required`] reports it.
#[derive(Debug, Clone, Copy)]
pub struct Email;

impl ValidationRule<String> for Email {
    fn validate(&self, value: &String) -> Option<FieldError> {
        let value = value.trim();
        fail_if(!value.is_empty() && !EMAIL_REGEX.is_match(value), || {
            ValidationErrorKind::InvalidEmail
        })
    }
}
