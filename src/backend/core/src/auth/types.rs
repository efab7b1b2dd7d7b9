//! Request and response bodies for the auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Role, User};
use crate::validation::{
    validate_field, validate_request, Email, MaxLength, MinLength, Required, Validate,
    ValidationResult,
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(
                validate_field("email", &self.email)
                    .stop_on_first()
                    .rule(Required)
                    .rule(Email),
            )
            .field(
                validate_field("password", &self.password)
                    .stop_on_first()
                    .rule(Required)
                    .rule(MinLength(MIN_PASSWORD_LEN)),
            )
            .field(
                validate_field("name", &self.name)
                    .rule(Required)
                    .rule(MaxLength(MAX_NAME_LEN)),
            )
            .result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("email", &self.email).rule(Required))
            .field(validate_field("password", &self.password).rule(Required))
            .result()
    }
}

/// Body of `/auth/refresh` and `/auth/logout`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

impl Validate for RefreshRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("refresh_token", &self.refresh_token).rule(Required))
            .result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(
                validate_field("name", &self.name)
                    .rule(Required)
                    .rule(MaxLength(MAX_NAME_LEN)),
            )
            .result()
    }
}

/// Admin change to another account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserAccessRequest {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Tokens returned by register, login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            email: "user@example.com".to_string(),
            password: "user123".to_string(),
            name: "User".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "12345".to_string(),
            name: String::new(),
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.has_field("email"));
        assert!(errors.has_field("password"));
        assert!(errors.has_field("name"));
    }

    #[test]
    fn test_missing_fields_deserialize_as_empty() {
        let req: LoginRequest = serde_json::from_str("{}").unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.has_field("email"));
        assert!(errors.has_field("password"));
    }

    #[test]
    fn test_access_request_parses_role() {
        let req: UpdateUserAccessRequest =
            serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(req.role, Some(Role::Admin));
        assert_eq!(req.is_active, None);
    }
}
