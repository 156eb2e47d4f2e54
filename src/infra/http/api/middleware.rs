//! Bearer-token authentication for moderator routes.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderValue, header, request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use super::error::ApiError;
use super::state::ApiState;

pub const TOKEN_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct ModeratorClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Disabled,
    Missing,
    Expired,
    Invalid,
}

/// Verifies HS256 moderator tokens. `exp` is checked when present.
pub struct ModeratorAuth {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl ModeratorAuth {
    pub fn new(secret: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = TOKEN_LEEWAY_SECS;
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;

        Self {
            key: secret.map(|secret| DecodingKey::from_secret(secret.as_bytes())),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<ModeratorClaims, AuthFailure> {
        let key = self.key.as_ref().ok_or(AuthFailure::Disabled)?;
        decode::<ModeratorClaims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthFailure::Expired,
                _ => AuthFailure::Invalid,
            })
    }
}

/// Extractor for handlers that require a moderator token.
#[derive(Debug, Clone)]
pub struct Moderator {
    pub subject: Option<String>,
}

impl<S> FromRequestParts<S> for Moderator
where
    S: Send + Sync,
    ApiState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = ApiState::from_ref(state);
        let token = extract_token(parts.headers.get(header::AUTHORIZATION));
        let claims = token
            .ok_or(AuthFailure::Missing)
            .and_then(|token| state.auth.verify(&token))
            .map_err(rejection)?;

        debug!(
            target = "civic_reports::http::auth",
            subject = claims.sub.as_deref().unwrap_or(""),
            "moderator authenticated"
        );
        Ok(Moderator {
            subject: claims.sub,
        })
    }
}

fn rejection(failure: AuthFailure) -> ApiError {
    match failure {
        AuthFailure::Disabled => ApiError::unauthorized("Moderator access is not configured"),
        AuthFailure::Missing => ApiError::unauthorized("Bearer token required"),
        AuthFailure::Expired => ApiError::unauthorized("Token expired"),
        AuthFailure::Invalid => ApiError::unauthorized("Invalid token"),
    }
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}
