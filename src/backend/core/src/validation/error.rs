//! Per-field validation failures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CrawlError, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Required,
    MinLength { min: usize, actual: usize },
    MaxLength { max: usize, actual: usize },
    InvalidEmail,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("field is required"),
            Self::MinLength { min, actual } => {
                write!(f, "must be at least {} characters (got {})", min, actual)
            }
            Self::MaxLength { max, actual } => {
                write!(f, "must be at most {} characters (got {})", max, actual)
            }
            Self::InvalidEmail => f.write_str("must be a valid email address"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: ValidationErrorKind) -> Self {
        Self {
            message: kind.to_string(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Failures grouped by field name. Fields iterate in name order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<FieldError>>,
}

pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, error: FieldError) {
        self.fields.entry(field.into()).or_default().push(error);
    }

    pub fn add_error(&mut self, field: impl Into<String>, kind: ValidationErrorKind) {
        self.add(field, FieldError::new(kind));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field(&self, field: &str) -> Option<&[FieldError]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    fn messages(&self) -> impl Iterator<Item = String> + '_ {
        self.fields
            .iter()
            .flat_map(|(field, errors)| errors.iter().map(move |e| format!("{}: {}", field, e)))
    }

    /// The first failure as `field: message`, used as the error message.
    pub fn summary(&self) -> String {
        self.messages()
            .next()
            .unwrap_or_else(|| "Validation failed".to_string())
    }

    /// `{"field": ["message", ...]}` for the response details.
    pub fn to_field_messages(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .map(|(field, errors)| {
                let messages = errors.iter().map(|e| e.message.clone()).collect();
                (field.clone(), messages)
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().collect::<Vec<_>>().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for CrawlError {
    fn from(errors: ValidationErrors) -> Self {
        CrawlError::new(ErrorCode::ValidationError, errors.summary())
            .with_context("field_errors", errors.to_field_messages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_grouped_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add_error("name", ValidationErrorKind::Required);
        errors.add_error("email", ValidationErrorKind::Required);
        errors.add_error("email", ValidationErrorKind::InvalidEmail);

        assert_eq!(errors.error_count(), 3);
        assert_eq!(errors.field("email").map(<[_]>::len), Some(2));
        assert!(!errors.has_field("password"));
        assert_eq!(errors.summary(), "email: field is required");
        assert_eq!(
            errors.to_string(),
            "email: field is required; email: must be a valid email address; name: field is required"
        );
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(ValidationErrors::new().summary(), "Validation failed");
    }

    #[test]
    fn test_into_crawl_error() {
        let mut errors = ValidationErrors::new();
        errors.add_error("password", ValidationErrorKind::MinLength { min: 6, actual: 3 });

        let error: CrawlError = errors.into();
        assert_eq!(error.code(), ErrorCode::ValidationError);
        assert_eq!(error.http_status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error.details().context["field_errors"]["password"][0],
            "must be at least 6 characters (got 3)"
        );
    }
}
