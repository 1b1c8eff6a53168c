use crate::types::{Purpose, RoleId, RoleName, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role record owned by the permission catalog.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub description: Option<String>,
}

impl Role {
    /// Creates a role with a freshly generated identifier.
    pub fn new(name: RoleName, description: Option<String>) -> Self {
        Self {
            id: RoleId::generate(),
            name,
            description,
        }
    }
}

/// User record as seen through the external user store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub email_confirmed: bool,
    /// Opaque hash produced by the credential hasher.
    pub password_hash: String,
    pub role_id: RoleId,
}

impl User {
    /// Creates an unconfirmed user with a freshly generated identifier.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role_id: RoleId,
    ) -> Self {
        Self {
            id: UserId::generate(),
            username: username.into(),
            email: email.into(),
            email_confirmed: false,
            password_hash: password_hash.into(),
            role_id,
        }
    }

    /// Identity fields embedded into bearer tokens.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Identity carried by a bearer token.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
}

/// Durable verification-token record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub token: String,
    pub user_id: UserId,
    pub purpose: Purpose,
    /// Intent payload. For password resets this is the replacement hash.
    pub payload: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// A token is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Change applied to the owning user when the token is redeemed.
    pub fn user_effect(&self) -> UserEffect {
        match self.purpose {
            Purpose::ConfirmEmail => UserEffect::ConfirmEmail,
            Purpose::ResetPassword => UserEffect::ReplacePasswordHash(self.payload.clone()),
        }
    }
}

/// User mutation tied to a verification purpose.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEffect {
    /// Set the email-confirmed flag.
    ConfirmEmail,
    /// Replace the stored password hash.
    ReplacePasswordHash(String),
}

/// Result of a successful consumption.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumedToken {
    pub user_id: UserId,
    pub purpose: Purpose,
    pub payload: String,
}

impl From<VerificationToken> for ConsumedToken {
    fn from(record: VerificationToken) -> Self {
        Self {
            user_id: record.user_id,
            purpose: record.purpose,
            payload: record.payload,
        }
    }
}

/// Non-consuming view of a live token.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub user_id: UserId,
    pub purpose: Purpose,
    pub expires_at: DateTime<Utc>,
}

impl From<&VerificationToken> for TokenInfo {
    fn from(record: &VerificationToken) -> Self {
        Self {
            user_id: record.user_id,
            purpose: record.purpose,
            expires_at: record.expires_at,
        }
    }
}

/// Message handed to the notifier after a token is issued.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenNotice {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub purpose: Purpose,
    pub token: String,
}
