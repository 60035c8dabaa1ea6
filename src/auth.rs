//! # Credential Guard
//!
//! Verifies the signed credential presented at connection time, before any
//! WebSocket upgrade or application data exchange. The identity provider
//! signs a JWT carrying `{id, role}`; this module only verifies it and
//! extracts the principal, it never issues tokens.
//!
//! ## Where the token comes from:
//! - The `token` cookie (browser connections, set at login)
//! - The `Authorization: Bearer <token>` header (non-browser clients)
//!
//! ## Failure behavior:
//! Missing, malformed, expired, or badly signed tokens reject the connection
//! attempt with HTTP 401 at handshake time. Authentication failures are never
//! surfaced as in-band application frames.
//!
//! This step is stateless and re-entrant: the resulting [`Principal`] is
//! attached to the connection and trusted for its whole life, never
//! re-verified mid-session.

use crate::error::AppError;
use actix_web::HttpRequest;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// The authenticated identity attached to a connection.
///
/// Read-only for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: String,
}

/// Claims the identity provider puts in the session token.
///
/// `exp` is validated by jsonwebtoken itself; the rest is carried into the
/// [`Principal`].
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    role: String,
    exp: usize,
}

/// Stateless verifier for connection credentials.
pub struct CredentialGuard {
    decoding_key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl CredentialGuard {
    /// Create a guard for the given HS256 shared secret.
    pub fn new(jwt_secret: &str, cookie_name: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            cookie_name: cookie_name.to_string(),
        }
    }

    /// Authenticate a connection attempt.
    ///
    /// Extracts the raw token from the handshake request and verifies it.
    /// Returns the principal on success; an `Unauthorized` error (mapped to
    /// HTTP 401) otherwise.
    pub fn authenticate(&self, req: &HttpRequest) -> Result<Principal, AppError> {
        let token = self
            .extract_token(req)
            .ok_or_else(|| AppError::Unauthorized("Missing credential".to_string()))?;
        self.verify(&token)
    }

    /// Verify a raw token value and extract the principal.
    pub fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AppError::Unauthorized(format!("Invalid credential: {}", err)))?;

        Ok(Principal {
            id: data.claims.id,
            role: data.claims.role,
        })
    }

    /// Pull the raw token out of the handshake.
    ///
    /// Cookie first (the browser path), then the Authorization header.
    fn extract_token(&self, req: &HttpRequest) -> Option<String> {
        if let Some(cookie) = req.cookie(&self.cookie_name) {
            return Some(cookie.value().to_string());
        }

        req.headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn sign(id: &str, role: &str, exp_offset_secs: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset_secs) as usize;
        let claims = Claims {
            id: id.to_string(),
            role: role.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_cookie_token_accepted() {
        let guard = CredentialGuard::new(SECRET, "token");
        let token = sign("candidate-1", "CANDIDATE", 3600);

        let req = TestRequest::default()
            .cookie(actix_web::cookie::Cookie::new("token", token))
            .to_http_request();

        let principal = guard.authenticate(&req).unwrap();
        assert_eq!(principal.id, "candidate-1");
        assert_eq!(principal.role, "CANDIDATE");
    }

    #[test]
    fn test_bearer_header_accepted() {
        let guard = CredentialGuard::new(SECRET, "token");
        let token = sign("candidate-2", "CANDIDATE", 3600);

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        let principal = guard.authenticate(&req).unwrap();
        assert_eq!(principal.id, "candidate-2");
    }

    #[test]
    fn test_missing_token_rejected() {
        let guard = CredentialGuard::new(SECRET, "token");
        let req = TestRequest::default().to_http_request();

        assert!(matches!(
            guard.authenticate(&req),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let guard = CredentialGuard::new(SECRET, "token");
        let token = sign("candidate-3", "CANDIDATE", -3600);  // Expired an hour ago

        let req = TestRequest::default()
            .cookie(actix_web::cookie::Cookie::new("token", token))
            .to_http_request();

        assert!(guard.authenticate(&req).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = CredentialGuard::new("other-secret", "token");
        let token = sign("candidate-4", "CANDIDATE", 3600);

        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let guard = CredentialGuard::new(SECRET, "token");
        assert!(guard.verify("not-a-jwt").is_err());
    }
}
