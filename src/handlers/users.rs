//! Development token endpoint.
//!
//! - POST /v1/users/token
//!
//! Mounted only when a signing key is configured. Issues a five minute
//! RS256 token the payment endpoints accept.

use axum::{Json, extract::State};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{app::AppState, error::AppError};

type HmacSha256 = Hmac<Sha256>;

const CREDENTIAL_KEY: &[u8] = b"paygate-dev-credentials";

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
}

/// Exchange development credentials for a bearer token.
///
/// Unknown credentials, or no credentials configured at all, yield 401.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let issuer = state.issuer.as_ref().ok_or(AppError::Unauthorized)?;

    let accepted = state
        .dev_credentials
        .as_ref()
        .is_some_and(|(user, pass)| {
            let user_ok = secrets_match(user, &request.username);
            let pass_ok = secrets_match(pass, &request.password);
            user_ok & pass_ok
        });
    if !accepted {
        tracing::info!(username = %request.username, "development token refused");
        return Err(AppError::Unauthorized);
    }

    let (access_token, claims) = issuer.issue(&request.username).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        AppError::Unauthorized
    })?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_at: claims.exp,
    }))
}

/// Compare two credentials in time that does not depend on where they
/// first differ or on their lengths.
///
/// Both sides are reduced to fixed-size MACs and checked with
/// `verify_slice`, which compares in constant time.
fn secrets_match(expected: &str, supplied: &str) -> bool {
    let mac = |value: &str| {
        HmacSha256::new_from_slice(CREDENTIAL_KEY).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };
    let (Ok(expected), Ok(supplied)) = (mac(expected), mac(supplied)) else {
        return false;
    };
    supplied
        .verify_slice(&expected.finalize().into_bytes())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_match_only_when_equal() {
        assert!(secrets_match("hunter2", "hunter2"));
        assert!(!secrets_match("hunter2", "hunter3"));
        assert!(!secrets_match("hunter2", "hunter22"));
        assert!(!secrets_match("hunter2", ""));
        assert!(secrets_match("", ""));
    }
}
