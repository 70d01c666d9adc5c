//! Session Authentication
//!
//! Verifies identity-provider session tokens; sign-in itself happens
//! elsewhere. The token is taken from `Authorization: Bearer` or, failing
//! that, the `__session` cookie.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::Deserialize;

use crate::config::{ConfigError, SessionKey};
use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "__session";

/// Caller identity taken from a verified session token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(key: &SessionKey, issuer: Option<&str>) -> Result<Self, ConfigError> {
        let (key, algorithm) = match key {
            SessionKey::RsaPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| ConfigError::Invalid {
                    name: "CLERK_JWT_KEY",
                    reason: e.to_string(),
                })?,
                Algorithm::RS256,
            ),
            SessionKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self { key, validation })
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, ApiError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                    tracing::error!(error = %e, "Session key rejected by verifier");
                }
                _ => tracing::debug!(error = %e, "Session token rejected"),
            }
            ApiError::Unauthorized
        })?;

        let id = data.claims.sub.trim().to_string();
        if id.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(AuthenticatedUser {
            id,
            email: data.claims.email.filter(|e| !e.is_empty()),
        })
    }
}

/// Bearer token first, then the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.trim())
            .filter(|t| !t.is_empty())
    })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        state.sessions.verify(token)
    }
}
