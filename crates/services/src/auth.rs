use std::collections::HashMap;

use progress_core::model::{Role, UserId};

pub use crate::error::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// Identity established by a verified credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

/// Maps an opaque credential to a principal.
pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredential` if the token is not accepted.
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Extract the token from an `Authorization` header value.
///
/// # Errors
///
/// Returns `AuthError::MissingCredential` when the header is absent, lacks
/// the `Bearer ` prefix, or carries an empty token.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let token = header
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or(AuthError::MissingCredential)?;
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

/// Fixed token table, for tests and embedding behind a trusted gateway.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .copied()
            .ok_or(AuthError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("abc")), Err(AuthError::MissingCredential));
        assert_eq!(bearer_token(Some("bearer abc")), Err(AuthError::MissingCredential));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MissingCredential));
        assert_eq!(bearer_token(None), Err(AuthError::MissingCredential));
    }

    #[test]
    fn static_verifier_rejects_unknown_tokens() {
        let principal = Principal {
            user_id: UserId::new(5),
            role: Role::User,
        };
        let verifier = StaticTokenVerifier::new().with_token("t-5", principal);
        assert_eq!(verifier.verify("t-5"), Ok(principal));
        assert_eq!(verifier.verify("t-6"), Err(AuthError::InvalidCredential));
    }
}
