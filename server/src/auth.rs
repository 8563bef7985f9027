//! Cookie-based token authentication.
//!
//! `POST /jwt` signs the submitted identity into an HS256 token valid for one
//! hour and hands it back as an `HttpOnly` cookie named `token`. The
//! [`require_identity`] middleware guards routes by verifying that cookie and
//! attaching the decoded [`Claims`] to the request extensions.
//!
//! # Example
//!
//! ```rust
//! use galaxy_server::auth::{issue_token, verify_token};
//!
//! let mut extra = serde_json::Map::new();
//! extra.insert("name".to_string(), "Ada".into());
//!
//! let token = issue_token("secret", "ada@galaxy.example", extra).unwrap();
//! let claims = verify_token("secret", &token).unwrap();
//! assert_eq!(claims.email, "ada@galaxy.example");
//! ```

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ApiError;
use crate::routes::AppState;
use crate::types::Record;

/// Name of the cookie carrying the token.
pub const TOKEN_COOKIE: &str = "token";

/// Lifetime of an issued token and its cookie.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Claims reserved for the token itself or checked by the verifier; they are
/// stripped from the identity payload before signing.
const RESERVED_CLAIMS: [&str; 7] = ["email", "iat", "exp", "nbf", "aud", "iss", "sub"];

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The request carried no `token` cookie.
    #[error("missing token")]
    MissingToken,

    /// The token failed signature, expiry or shape checks.
    #[error("invalid token")]
    InvalidToken,

    /// No signing secret is configured.
    #[error("token secret not configured")]
    MissingSecret,

    /// Encoding the token failed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => ApiError::unauthorized(err.to_string()),
            AuthError::MissingSecret | AuthError::Signing(_) => ApiError::internal(err.to_string()),
        }
    }
}

/// Decoded identity carried by a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to.
    pub email: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Any further claims from the identity payload.
    #[serde(flatten)]
    pub extra: Record,
}

/// Signs an identity into a token that expires after [`TOKEN_TTL`].
///
/// # Errors
///
/// Returns [`AuthError::MissingSecret`] for an empty secret and
/// [`AuthError::Signing`] if encoding fails.
pub fn issue_token(secret: &str, email: &str, mut extra: Record) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    for claim in RESERVED_CLAIMS {
        extra.remove(claim);
    }

    let now = Utc::now().timestamp();
    let claims = Claims {
        email: email.to_string(),
        iat: now,
        exp: now + TOKEN_TTL.as_secs() as i64,
        extra,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Verifies signature and expiry and returns the decoded claims.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] for any verification failure and
/// [`AuthError::MissingSecret`] for an empty secret.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|err| {
        debug!(reason = %err, "Token verification failed");
        AuthError::InvalidToken
    })
}

/// Builds the cookie that carries a freshly issued token.
///
/// Secure deployments need `SameSite=None` so a separately hosted client can
/// send the cookie cross-site; otherwise the cookie stays same-site.
pub fn auth_cookie(token: String, secure: bool) -> Cookie<'static> {
    let same_site = if secure {
        SameSite::None
    } else {
        SameSite::Strict
    };

    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/")
        .max_age(time::Duration::seconds(TOKEN_TTL.as_secs() as i64))
        .build()
}

/// Middleware that admits only requests with a valid `token` cookie.
///
/// Rejections happen before the inner handler runs, so nothing touches the
/// store for an unauthenticated request. Without a configured secret every
/// request is rejected.
pub async fn require_identity(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let secret = state.config.token_secret.as_deref().ok_or_else(|| {
        debug!("Rejecting gated request: no token secret configured");
        AuthError::InvalidToken
    })?;

    let claims = verify_token(secret, &token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
