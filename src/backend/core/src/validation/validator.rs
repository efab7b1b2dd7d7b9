//! The `Validate` trait and the builders used to implement it.

use crate::validation::error::{FieldError, ValidationErrors, ValidationResult};
use crate::validation::rules::ValidationRule;

/// Synchronous validation of a request type.
///
/// ```rust,ignore
/// impl Validate for RegisterRequest {
///     fn validate(&self) -> ValidationResult<()> {
///         validate_request()
///             .field(validate_field("email", &self.email).rule(Required).rule(Email))
///             .result()
///     }
/// }
/// ```
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// Applies rules to a single field, collecting every failure.
pub struct FieldValidator<'a, T> {
    field_name: &'a str,
    value: &'a T,
    errors: Vec<FieldError>,
    stop_on_first: bool,
}

impl<'a, T> FieldValidator<'a, T> {
    pub fn new(field_name: &'a str, value: &'a T) -> Self {
        Self {
            field_name,
            value,
            errors: Vec::new(),
            stop_on_first: false,
        }
    }

    /// Skip remaining rules once one has failed.
    pub fn stop_on_first(mut self) -> Self {
        self.stop_on_first = true;
        self
    }

    pub fn rule<R: ValidationRule<T>>(mut self, rule: R) -> Self {
        if self.stop_on_first && !self.errors.is_empty() {
            return self;
        }
        if let Some(error) = rule.validate(self.value) {
            self.errors.push(error);
        }
        self
    }

    pub fn collect_into(self, errors: &mut ValidationErrors) {
        for error in self.errors {
            errors.add(self.field_name, error);
        }
    }
}

/// Validates several fields of one request.
#[derive(Default)]
pub struct RequestValidator {
    errors: ValidationErrors,
}

impl RequestValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T>(mut self, validator: FieldValidator<'_, T>) -> Self {
        validator.collect_into(&mut self.errors);
        self
    }

    pub fn result(self) -> ValidationResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

pub fn validate_field<'a, T>(field_name: &'a str, value: &'a T) -> FieldValidator<'a, T> {
    FieldValidator::new(field_name, value)
}

pub fn validate_request() -> RequestValidator {
    RequestValidator::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rules::{Email, MinLength, Required};

    struct Signup {
        email: String,
        password: String,
    }

    impl Validate for Signup {
        fn validate(&self) -> ValidationResult<()> {
            validate_request()
                .field(validate_field("email", &self.email).rule(Required).rule(Email))
                .field(validate_field("password", &self.password).rule(MinLength(6)))
                .result()
        }
    }

    #[test]
    fn test_valid_request() {
        let signup = Signup {
            email: "a@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(signup.validate().is_ok());
    }

    #[test]
    fn test_collects_all_fields() {
        let signup = Signup {
            email: "nope".to_string(),
            password: "123".to_string(),
        };
        let errors = signup.validate().unwrap_err();
        assert!(errors.has_field("email"));
        assert!(errors.has_field("password"));
    }

    #[test]
    fn test_stop_on_first() {
        let blank = String::new();
        let validator = validate_field("email", &blank)
            .stop_on_first()
            .rule(Required)
            .rule(MinLength(3));
        let mut errors = ValidationErrors::new();
        validator.collect_into(&mut errors);
        assert_eq!(errors.error_count(), 1);
    }
}
