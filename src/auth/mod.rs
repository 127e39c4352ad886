//! Request authentication extractors.
//!
//! Token issuance (login) belongs to the auth collaborator; this module is
//! the gateway's side of that contract: verify the HS256 bearer token,
//! enforce the single-session rule against the collaborator-owned
//! `active_token:{userId}` string, and gate selection endpoints on a live
//! admission session.
//!
//! Handlers declare what they need through extractor parameters:
//! [`AuthUser`] for any authenticated caller, [`MentorUser`] for
//! mentor-only routes, [`ActiveUser`] for routes that require an admitted
//! session (mentors bypass admission everywhere).

use crate::error::AppError;
use crate::server::AppState;
use crate::types::{Role, UserId};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

/// JWT claims issued by the auth collaborator.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// User role.
    pub role: Role,
    /// Expiry (unix seconds), validated by the decoder.
    pub exp: usize,
}

/// HS256 token verifier.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier over the shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a token and extract the caller's identity.
    ///
    /// # Errors
    ///
    /// Returns 401 `INVALID_TOKEN` when the signature, expiry or claims are
    /// invalid.
    pub fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AppError::unauthorized("INVALID_TOKEN", "Token validation failed"))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::unauthorized("INVALID_TOKEN", "Token validation failed"))?;

        Ok(AuthUser {
            user_id: UserId::from_uuid(user_id),
            role: data.claims.role,
        })
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthUser {
    /// Whether the caller is a mentor.
    #[must_use]
    pub const fn is_mentor(&self) -> bool {
        matches!(self.role, Role::Mentor)
    }
}

/// Pull the bearer token from the `Authorization` header, falling back to
/// the `?token=` query parameter (used by WebSocket clients that cannot set
/// headers).
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
        })
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or_else(|| {
            AppError::unauthorized("UNAUTHORIZED", "Missing authorization token")
        })?;

        let user = state.verifier.verify(&token)?;

        // Single-session enforcement: only the token recorded by the auth
        // collaborator is valid. A mismatch means another device logged in;
        // evict this session from the queue as well.
        let stored = state
            .admission
            .store()
            .active_token(user.user_id)
            .await
            .map_err(|e| {
                AppError::internal("QUEUE_ERROR", "Failed to check session")
                    .with_source(anyhow::anyhow!(e))
            })?;

        if stored.as_deref() != Some(token.as_str()) {
            if let Err(e) = state.admission.leave(user.user_id).await {
                tracing::warn!(error = %e, user_id = %user.user_id, "failed to evict superseded session");
            }
            return Err(AppError::unauthorized(
                "SESSION_EXPIRED",
                "Session expired or logged in from another device",
            ));
        }

        Ok(user)
    }
}

/// An authenticated mentor.
#[derive(Debug, Clone, Copy)]
pub struct MentorUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for MentorUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_mentor() {
            return Err(AppError::forbidden("FORBIDDEN", "Insufficient permissions"));
        }
        Ok(Self(user))
    }
}

/// An authenticated caller with a live admission session. Mentors bypass
/// the admission check.
#[derive(Debug, Clone, Copy)]
pub struct ActiveUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for ActiveUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.is_mentor() {
            return Ok(Self(user));
        }

        let active = state
            .admission
            .is_active_session(user.user_id)
            .await
            .map_err(|e| {
                AppError::internal("QUEUE_ERROR", "Failed to check queue status")
                    .with_source(anyhow::anyhow!(e))
            })?;

        if !active {
            return Err(AppError::forbidden(
                "QUEUE_WAITING",
                "You are currently in the queue. Please wait for your turn.",
            ));
        }

        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        role: Role,
        exp: usize,
    }

    fn issue(secret: &str, sub: &str, role: Role, exp: usize) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                role,
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_valid_token() {
        let verifier = TokenVerifier::new("secret");
        let user_id = Uuid::new_v4();
        let token = issue("secret", &user_id.to_string(), Role::Student, 4_102_444_800);

        let user = verifier.verify(&token).unwrap();
        assert_eq!(user.user_id.as_uuid(), &user_id);
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = TokenVerifier::new("secret");
        let token = issue(
            "other-secret",
            &Uuid::new_v4().to_string(),
            Role::Student,
            4_102_444_800,
        );
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new("secret");
        let token = issue("secret", &Uuid::new_v4().to_string(), Role::Mentor, 1);
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let verifier = TokenVerifier::new("secret");
        let token = issue("secret", "not-a-uuid", Role::Student, 4_102_444_800);
        assert!(verifier.verify(&token).is_err());
    }
}
