//! Bearer-token authentication for the HTTP surface.
//!
//! Tokens are HS256 JWTs carrying the user id, email, and role. Issuing is only used by the
//! CLI and tests; the identity component owns real sign-in.

use std::fmt;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::workflows::grants::{Actor, UserId, UserRole};

const ISSUER: &str = "grantdesk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity resolved from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role)
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AuthError::AdminRequired)
        }
    }
}

/// Signs and verifies bearer tokens with a shared secret.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("secret", &"<redacted>")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_ttl_hours)
    }

    pub fn issue(&self, user: &AuthenticatedUser) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.0.clone(),
            email: user.email.clone(),
            role: user.role,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        Ok(AuthenticatedUser {
            id: UserId(data.claims.sub),
            email: data.claims.email,
            role: data.claims.role,
        })
    }

    /// Resolve the caller from an `Authorization: Bearer <token>` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::MalformedHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MalformedHeader)?;
        self.verify(token)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingCredentials,
    #[error("Authorization header must use the Bearer scheme")]
    MalformedHeader,
    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("Admin access required")]
    AdminRequired,
    #[error("could not sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admin() -> AuthenticatedUser {
        AuthenticatedUser {
            id: UserId("admin-1".to_string()),
            email: "ops@example.org".to_string(),
            role: UserRole::SuperAdmin,
        }
    }

    #[test]
    fn issued_tokens_verify_back_to_the_same_user() {
        let authority = TokenAuthority::new("test-secret", 1);
        let token = authority.issue(&admin()).expect("token issued");
        let user = authority.verify(&token).expect("token verifies");
        assert_eq!(user, admin());
        assert!(user.require_admin().is_ok());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = TokenAuthority::new("one", 1)
            .issue(&admin())
            .expect("token issued");
        let err = TokenAuthority::new("two", 1)
            .verify(&token)
            .expect_err("signature mismatch");
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let authority = TokenAuthority::new("test-secret", -2);
        let token = authority.issue(&admin()).expect("token issued");
        assert!(matches!(
            authority.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn authenticate_requires_bearer_header() {
        let authority = TokenAuthority::new("test-secret", 1);
        let mut headers = HeaderMap::new();
        assert!(matches!(
            authority.authenticate(&headers),
            Err(AuthError::MissingCredentials)
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            authority.authenticate(&headers),
            Err(AuthError::MalformedHeader)
        ));

        let token = authority.issue(&admin()).expect("token issued");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header"),
        );
        assert_eq!(authority.authenticate(&headers).expect("authenticated"), admin());
    }

    #[test]
    fn plain_users_are_not_admins() {
        let user = AuthenticatedUser {
            role: UserRole::User,
            ..admin()
        };
        assert!(matches!(user.require_admin(), Err(AuthError::AdminRequired)));
    }
}
