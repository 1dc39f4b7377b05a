//! Bearer token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Verify its RS256 signature, expiry, issuer and audience
//! 3. Inject the verified claims into the request
//! 4. Reject unauthorized requests with HTTP 401

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{app::AppState, error::AppError};

/// Issuer stamped on development tokens.
pub const DEV_ISSUER: &str = "paygate-dev-auth";

/// Audience every caller token must carry.
pub const AUDIENCE: &str = "paygate";

const DEV_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Claims carried by a caller token.
///
/// Inserted into the request extensions; handlers can extract it with
/// `Extension<Claims>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Key material failed to load.
#[derive(Debug, thiserror::Error)]
#[error("invalid signing key: {0}")]
pub struct KeyError(#[from] jsonwebtoken::errors::Error);

/// Verifies caller tokens against one RS256 public key.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let key = DecodingKey::from_rsa_pem(pem)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[DEV_ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        Ok(Self { key, validation })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                AppError::Unauthorized
            })
    }
}

/// Signs short-lived development tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, KeyError> {
        Ok(Self {
            key: EncodingKey::from_rsa_pem(pem)?,
        })
    }

    /// Token for `subject`, valid for five minutes.
    pub fn issue(&self, subject: &str) -> Result<(String, Claims), KeyError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: DEV_ISSUER.to_string(),
            sub: subject.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now,
            exp: now + DEV_TOKEN_TTL.as_secs() as i64,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)?;
        Ok((token, claims))
    }
}

/// Bearer authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Verify the token with the configured public key
/// 3. If valid: inject `Claims` into request, call next handler
/// 4. Otherwise: return 401 Unauthorized
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let claims = state.jwt.verify(token)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
