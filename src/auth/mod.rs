/*!
 * # Authentication and Authorization
 *
 * Bearer tokens are HS256 JWTs carrying the user id, role and company id.
 * `auth_middleware` validates them and places an [`AuthUser`] into the request
 * extensions; `role_middleware` gates routers on a role. Routers opt in through
 * [`AuthRouterExt`].
 */

use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub name: String,
    pub role: String,
    pub company_id: i32,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, extracted from a validated token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: i32,
    pub name: String,
    pub role: UserRole,
    pub company_id: i32,
}

impl AuthUser {
    /// Role names compare case-insensitively, so "admin" matches `Admin`.
    pub fn has_role(&self, role: &str) -> bool {
        self.role.to_string().eq_ignore_ascii_case(role.trim())
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_lifetime: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, token_lifetime: Duration) -> Self {
        Self {
            jwt_secret,
            token_lifetime,
        }
    }
}

impl From<&crate::config::AppConfig> for AuthConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
        )
    }
}

/// Issues and validates access tokens and hashes passwords
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Signs an access token for `user`.
    pub fn issue_token(&self, user: &user::Model) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = ChronoDuration::from_std(self.config.token_lifetime)
            .map_err(|_| AuthError::TokenCreation("Invalid token lifetime".to_string()))?;

        let claims = Claims {
            sub: user.id,
            name: user.name.clone(),
            role: user.role.to_string(),
            company_id: user.company_id,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Decodes a token and checks signature and expiry.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Validates `token` and maps its claims onto an [`AuthUser`].
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let role = UserRole::parse_loose(&claims.role).ok_or_else(|| {
            warn!(role = %claims.role, "token carries an unknown role");
            AuthError::InvalidToken
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            name: claims.name,
            role,
            company_id: claims.company_id,
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServiceError::HashError(e.to_string()))
    }

    /// False for a wrong password or an unparseable stored hash.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("stored password hash is malformed: {}", e);
                false
            }
        }
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Access denied. No token provided.",
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token",
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired",
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Access denied. Insufficient permissions.",
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Could not issue token",
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Authentication unavailable",
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(serde_json::json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth | AuthError::InvalidToken | AuthError::TokenExpired => {
                ServiceError::Unauthorized(err.to_string())
            }
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::JwtError(msg),
            AuthError::InternalError(msg) => ServiceError::InternalError(msg),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that validates the bearer token
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("auth service not installed".to_string())
                .into_response()
        }
    };

    let user = match bearer_token(request.headers()) {
        Some(token) => auth_service.authenticate(token),
        None => Err(AuthError::MissingAuth),
    };

    match user {
        Ok(user) => {
            debug!(user_id = user.user_id, company_id = user.company_id, "authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "unit-test-secret-with-enough-length-0123".to_string(),
            Duration::from_secs(3600),
        ))
    }

    fn engineer() -> user::Model {
        let now = Utc::now();
        user::Model {
            id: 42,
            name: "Ravi".to_string(),
            email: None,
            password_hash: None,
            role: UserRole::SiteEngineer,
            company_id: 7,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_authenticates_back_to_the_same_user() {
        let auth = service();
        let token = auth.issue_token(&engineer()).unwrap();
        let user = auth.authenticate(&token).unwrap();

        assert_eq!(user.user_id, 42);
        assert_eq!(user.company_id, 7);
        assert_eq!(user.role, UserRole::SiteEngineer);
        assert!(user.has_role("site_engineer"));
        assert!(!user.is_admin());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AuthService::new(AuthConfig::new(
            "a-completely-different-secret-value-9876".to_string(),
            Duration::from_secs(3600),
        ));
        let token = other.issue_token(&engineer()).unwrap();
        assert!(matches!(
            service().authenticate(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let auth = service();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 1,
            name: "Old".into(),
            role: "Admin".into(),
            company_id: 1,
            jti: "x".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret-with-enough-length-0123"),
        )
        .unwrap();

        assert!(matches!(auth.validate_token(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn password_hash_verifies_only_the_original_password() {
        let auth = service();
        let hash = auth.hash_password("s3cret!").unwrap();
        assert!(auth.verify_password("s3cret!", &hash));
        assert!(!auth.verify_password("S3cret!", &hash));
        assert!(!auth.verify_password("s3cret!", "not-a-hash"));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
