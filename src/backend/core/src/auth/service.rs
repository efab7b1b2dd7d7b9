//! Account operations: registration, login, token refresh and admin changes.

use chrono::{Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::jwt::JwtService;
use crate::auth::password::PasswordService;
use crate::auth::types::{
    LoginRequest, RefreshRequest, RegisterRequest, TokenPair, UpdateProfileRequest,
    UpdateUserAccessRequest,
};
use crate::auth::AuthUser;
use crate::config::{AuthConfig, BootstrapConfig};
use crate::error::{CrawlError, ErrorCode, Result};
use crate::models::{NewUser, Role, User};
use crate::store::CrawlStore;
use crate::telemetry::AuthMetrics;
use crate::validation::Validate;

/// Length of the opaque refresh token handed to clients.
pub const REFRESH_TOKEN_LEN: usize = 48;

/// Generate a random alphanumeric refresh token.
pub fn generate_refresh_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hex sha256 of a refresh token, as stored.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService {
    store: Arc<dyn CrawlStore>,
    jwt: JwtService,
    passwords: PasswordService,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn CrawlStore>, config: &AuthConfig) -> Result<Self> {
        let refresh_ttl = Duration::from_std(config.refresh_token_ttl).map_err(|e| {
            CrawlError::configuration(format!("Invalid refresh token TTL: {}", e))
        })?;

        Ok(Self {
            store,
            jwt: JwtService::new(config)?,
            passwords: PasswordService::from_config(config)?,
            refresh_ttl,
        })
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Public Operations
    // ═══════════════════════════════════════════════════════════════════════════

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<TokenPair> {
        req.validate()?;

        let email = normalize_email(&req.email);
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(CrawlError::duplicate_user());
        }

        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash: self.passwords.hash(&req.password)?,
                name: req.name.trim().to_string(),
                role: Role::User,
            })
            .await
            .map_err(|e| match e.code() {
                ErrorCode::DuplicateRecord => CrawlError::duplicate_user(),
                _ => e,
            })?;

        info!(user_id = user.id, "User registered");
        AuthMetrics::record("register");
        self.issue_tokens(user).await
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<TokenPair> {
        req.validate()?;

        let email = normalize_email(&req.email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            AuthMetrics::record("login_failed");
            return Err(CrawlError::invalid_credentials());
        };

        if !self.passwords.verify(&req.password, &user.password_hash)? {
            warn!(user_id = user.id, "Login rejected: wrong password");
            AuthMetrics::record("login_failed");
            return Err(CrawlError::invalid_credentials());
        }

        if !user.is_active {
            AuthMetrics::record("login_disabled");
            return Err(CrawlError::account_disabled());
        }

        let now = Utc::now();
        self.store.record_login(user.id, now).await?;
        let user = User {
            last_login: Some(now),
            ..user
        };

        info!(user_id = user.id, "User logged in");
        AuthMetrics::record("login");
        self.issue_tokens(user).await
    }

    /// Exchange a refresh token for a new pair. The presented token is revoked.
    #[instrument(skip_all)]
    pub async fn refresh(&self, req: RefreshRequest) -> Result<TokenPair> {
        req.validate()?;

        let hash = hash_refresh_token(req.refresh_token.trim());
        let token = self
            .store
            .find_active_refresh_token(&hash, Utc::now())
            .await?
            .ok_or_else(|| CrawlError::new(ErrorCode::InvalidToken, "Invalid or expired refresh token"))?;

        let user = self
            .store
            .find_user_by_id(token.user_id)
            .await?
            .ok_or_else(|| CrawlError::new(ErrorCode::InvalidToken, "Invalid or expired refresh token"))?;

        if !user.is_active {
            return Err(CrawlError::account_disabled());
        }

        // Losing a concurrent refresh of the same token means it is already spent.
        if !self.store.revoke_refresh_token(user.id, &hash).await? {
            return Err(CrawlError::new(ErrorCode::InvalidToken, "Invalid or expired refresh token"));
        }
        AuthMetrics::record("refresh");
        self.issue_tokens(user).await
    }

    #[instrument(skip_all, fields(user_id = caller.id))]
    pub async fn logout(&self, caller: &AuthUser, req: RefreshRequest) -> Result<()> {
        req.validate()?;

        let hash = hash_refresh_token(req.refresh_token.trim());
        if !self.store.revoke_refresh_token(caller.id, &hash).await? {
            return Err(CrawlError::invalid_input("Invalid refresh token"));
        }

        info!("User logged out");
        AuthMetrics::record("logout");
        Ok(())
    }

    pub async fn profile(&self, caller: &AuthUser) -> Result<User> {
        self.store
            .find_user_by_id(caller.id)
            .await?
            .ok_or_else(|| CrawlError::user_not_found(caller.id))
    }

    pub async fn update_profile(&self, caller: &AuthUser, req: UpdateProfileRequest) -> Result<User> {
        req.validate()?;

        self.store
            .update_user_name(caller.id, req.name.trim())
            .await?
            .ok_or_else(|| CrawlError::user_not_found(caller.id))
    }

    /// Resolve a bearer token to a live, active account.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser> {
        let claims = self.jwt.verify(token)?;

        let user = self
            .store
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or_else(|| CrawlError::unauthorized("User no longer exists"))?;

        if !user.is_active {
            return Err(CrawlError::unauthorized("Account is deactivated"));
        }

        Ok(AuthUser::from(&user))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Administration
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    /// Change another account's role or active flag.
    #[instrument(skip(self, caller, req), fields(admin_id = caller.id))]
    pub async fn update_user_access(
        &self,
        caller: &AuthUser,
        user_id: i64,
        req: UpdateUserAccessRequest,
    ) -> Result<User> {
        if caller.id == user_id
            && (req.role == Some(Role::User) || req.is_active == Some(false))
        {
            return Err(CrawlError::new(
                ErrorCode::InvalidStateTransition,
                "Administrators cannot demote or deactivate themselves",
            ));
        }

        let user = self
            .store
            .update_user_access(user_id, req.role, req.is_active)
            .await?
            .ok_or_else(|| CrawlError::user_not_found(user_id))?;

        if req.is_active == Some(false) {
            let revoked = self.store.revoke_user_refresh_tokens(user_id).await?;
            info!(user_id, revoked, "User deactivated");
        }

        Ok(user)
    }

    /// Create the configured admin account when it does not exist yet.
    pub async fn bootstrap_admin(&self, config: &BootstrapConfig) -> Result<Option<User>> {
        let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
            return Ok(None);
        };

        let email = normalize_email(email);
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Ok(None);
        }

        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash: self.passwords.hash(password)?,
                name: config.admin_name.clone(),
                role: Role::Admin,
            })
            .await?;

        info!(user_id = user.id, email = %user.email, "Bootstrap admin created");
        Ok(Some(user))
    }

    async fn issue_tokens(&self, user: User) -> Result<TokenPair> {
        let (access_token, claims) = self.jwt.issue(&user)?;

        let refresh_token = generate_refresh_token();
        self.store
            .insert_refresh_token(
                user.id,
                &hash_refresh_token(&refresh_token),
                Utc::now() + self.refresh_ttl,
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.jwt.ttl().num_seconds(),
            expires_at: claims.expires_at(),
            user,
        })
    }
}
