//! Bearer-token issuing.
//!
//! Tokens are HS256 JWTs carrying the user's identity, role name and the
//! resolved permission strings. Verification happens in the transport layer
//! with the same secret and [`Claims`] shape; once verified, the boundary
//! builds a [`RequestScope`] and hands it to the service.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::UserIdentity;
use crate::permission::Permission;
use crate::types::{RoleName, UserId};
use chrono::Duration;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Fixed validity window of issued bearer tokens.
pub const BEARER_TOKEN_VALIDITY: Duration = Duration::hours(72);

/// Claim set embedded in bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Signs bearer tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer.
    ///
    /// A blank secret is a [`Error::Configuration`]; callers should treat it
    /// as fatal at startup.
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(Error::Configuration(
                "bearer token signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            clock,
        })
    }

    /// Signs a token for `identity` with the given role and permissions.
    pub fn issue(
        &self,
        identity: &UserIdentity,
        role: &RoleName,
        permissions: &[Permission],
    ) -> Result<String> {
        let now = self.clock.now();
        let claims = Claims {
            user_id: identity.user_id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: role.to_string(),
            permissions: permissions.iter().map(ToString::to_string).collect(),
            iat: now.timestamp(),
            exp: (now + BEARER_TOKEN_VALIDITY).timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.key)
            .map_err(|err| Error::Configuration(format!("failed to sign bearer token: {err}")))?;
        debug!(user_id = %identity.user_id, role = %role, permissions = claims.permissions.len(), "bearer token issued");
        Ok(token)
    }
}

/// Typed identity of the caller, built once by the authentication boundary
/// from verified claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub role: RoleName,
    pub permissions: Vec<Permission>,
}

impl RequestScope {
    /// Converts verified claims into a request scope.
    pub fn from_claims(claims: &Claims) -> Result<Self> {
        let permissions = claims
            .permissions
            .iter()
            .map(Permission::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            user_id: claims.user_id.parse()?,
            username: claims.username.clone(),
            email: claims.email.clone(),
            role: RoleName::new(&claims.role)?,
            permissions,
        })
    }

    /// Returns whether the scope carries `permission` exactly.
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}
