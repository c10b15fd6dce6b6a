//! Caller authentication for the connect API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::config::ApiToken;
use crate::error::AuthError;

/// The authenticated tenant a request acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

#[async_trait]
pub trait CallerAuthenticator: Send + Sync {
    /// Resolve the caller from the raw bearer token, if one was presented.
    async fn authenticate(&self, bearer: Option<&str>) -> Result<CallerIdentity, AuthError>;
}

/// Authenticates against a fixed list of bearer tokens.
pub struct StaticTokenAuthenticator {
    tokens: Vec<ApiToken>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl CallerAuthenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, bearer: Option<&str>) -> Result<CallerIdentity, AuthError> {
        let presented = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        // Scan every entry so timing does not reveal which token matched.
        let mut matched: Option<&ApiToken> = None;
        for entry in &self.tokens {
            let equal: bool = entry
                .token
                .expose_secret()
                .as_bytes()
                .ct_eq(presented.as_bytes())
                .into();
            if equal && matched.is_none() {
                matched = Some(entry);
            }
        }

        matched
            .map(|entry| CallerIdentity {
                user_id: entry.user_id.clone(),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}
