//! Accounts and request authentication.
//!
//! - **password**: argon2id hashing
//! - **jwt**: HS256 access tokens
//! - **service**: register, login, refresh, logout and admin account changes
//! - **middleware**: bearer-token middleware and the caller extractors

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod types;

pub use jwt::{Claims, JwtService};
pub use middleware::{extract_bearer, require_auth, AuthError, AuthUser, RequireAdmin};
pub use password::PasswordService;
pub use service::{generate_refresh_token, hash_refresh_token, AuthService};
pub use types::{
    LoginRequest, RefreshRequest, RegisterRequest, TokenPair, UpdateProfileRequest,
    UpdateUserAccessRequest,
};
