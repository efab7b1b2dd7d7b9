//! Request validation.
//!
//! Request types implement [`Validate`] with [`validate_request`] and
//! [`validate_field`]. Failures convert into a 422 [`crate::error::CrawlError`]
//! carrying `field_errors` in its details.

pub mod error;
pub mod rules;
pub mod validator;

pub use error::{FieldError, ValidationErrorKind, ValidationErrors, ValidationResult};
pub use rules::{Email, MaxLength, MinLength, Required, ValidationRule};
pub use validator::{validate_field, validate_request, FieldValidator, RequestValidator, Validate};
