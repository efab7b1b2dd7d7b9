//! HS256 access tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{CrawlError, Result};
use crate::models::{Role, User};

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// Access token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID as a string)
    pub sub: String,
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    pub iss: String,
    /// Token ID
    pub jti: String,
}

impl Claims {
    /// Claims for `user`, valid for `ttl` from `now`.
    pub fn for_user(user: &User, issuer: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user.id.to_string(),
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: issuer.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Issues and validates access tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let ttl = Duration::from_std(config.access_token_ttl)
            .map_err(|e| CrawlError::configuration(format!("Invalid access token TTL: {}", e)))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            ttl,
        })
    }

    /// Access token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign an access token for `user`.
    pub fn issue(&self, user: &User) -> Result<(String, Claims)> {
        let claims = Claims::for_user(user, &self.issuer, Utc::now(), self.ttl);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok((token, claims))
    }

    /// Validate signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn config() -> AuthConfig {
        AuthConfig::new("a-very-long-test-secret")
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            email: "admin@example.com".to_string(),
            password_hash: String::new(),
            name: "Admin".to_string(),
            role: Role::Admin,
            is_active: true,
            email_verified: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let jwt = JwtService::new(&config()).unwrap();
        let (token, issued) = jwt.issue(&user()).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "webcrawl-api");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_token() {
        let jwt = JwtService::new(&config()).unwrap();
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims::for_user(&user(), "webcrawl-api", past, Duration::minutes(15));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"a-very-long-test-secret"),
        )
        .unwrap();

        let err = jwt.verify(&token).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TokenExpired);
    }

    #[test]
    fn test_wrong_secret_and_issuer() {
        let jwt = JwtService::new(&config()).unwrap();

        let other = JwtService::new(&AuthConfig::new("another-long-test-secret")).unwrap();
        let (token, _) = other.issue(&user()).unwrap();
        assert_eq!(jwt.verify(&token).unwrap_err().code(), ErrorCode::InvalidToken);

        let mut foreign = config();
        foreign.issuer = "someone-else".to_string();
        let (token, _) = JwtService::new(&foreign).unwrap().issue(&user()).unwrap();
        assert_eq!(jwt.verify(&token).unwrap_err().code(), ErrorCode::InvalidToken);
    }

    #[test]
    fn test_garbage_token() {
        let jwt = JwtService::new(&config()).unwrap();
        assert_eq!(
            jwt.verify("not.a.jwt").unwrap_err().code(),
            ErrorCode::InvalidToken
        );
    }
}
