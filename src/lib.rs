//! Role catalog, bearer-token issuing and single-use verification tokens.
//!
//! The crate resolves roles to fine-grained `resource:action` permissions,
//! signs bearer tokens that embed a user's identity and resolved permissions,
//! and manages email-confirmation and password-reset tokens that can be
//! consumed at most once, even under concurrent access. Persistence, caching,
//! password hashing and delivery are pluggable async traits.
//!
//! # Examples
//!
//! Provisioning roles and signing a bearer token (enable `memory-store` and `bcrypt`):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "bcrypt"))]
//! # async fn run() -> tenant_authz::Result<()> {
//! use std::sync::Arc;
//! use tenant_authz::{AuthConfig, AuthServiceBuilder, MemoryStore};
//!
//! let service = AuthServiceBuilder::new(Arc::new(MemoryStore::new()), AuthConfig::new("secret"))
//!     .build()?;
//! service
//!     .provision([("admin", "all:all"), ("user", "user:read,user:update")])
//!     .await?;
//!
//! let session = service.register("alice", "alice@example.com", "hunter2").await?;
//! println!("{}", session.bearer_token);
//! # Ok(())
//! # }
//! ```
//!
//! Consuming a verification token (enable `memory-store` and `memory-cache`):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "memory-cache"))]
//! # async fn run() -> tenant_authz::Result<()> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tenant_authz::{MemoryCache, MemoryStore, Purpose, SystemClock, UserId, VerificationTokenStore};
//!
//! let tokens = VerificationTokenStore::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryCache::new(1024)),
//!     Arc::new(SystemClock),
//! );
//! let token = tokens
//!     .issue(UserId::generate(), Purpose::ConfirmEmail, "", Duration::from_secs(3600))
//!     .await?;
//! let consumed = tokens.consume(&token).await?;
//! assert_eq!(consumed.purpose, Purpose::ConfirmEmail);
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod cache;
mod catalog;
mod clock;
mod config;
mod credentials;
mod deadline;
mod error;
mod issuer;
mod model;
mod notifier;
mod permission;
mod service;
mod store;
mod types;
mod verification;
#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

pub use crate::cache::{FastCache, NoCache};
pub use crate::catalog::PermissionCatalog;
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::AuthConfig;
pub use crate::credentials::{CredentialHasher, CredentialVerifier};
pub use crate::error::{Error, Result, StoreError};
pub use crate::issuer::{BEARER_TOKEN_VALIDITY, Claims, RequestScope, TokenIssuer};
pub use crate::model::{
    ConsumedToken, Role, TokenInfo, TokenNotice, User, UserEffect, UserIdentity,
    VerificationToken,
};
pub use crate::notifier::{NoopNotifier, Notifier};
pub use crate::permission::{Permission, WILDCARD, parse_permission_spec};
pub use crate::service::{AuthService, AuthServiceBuilder, Session};
pub use crate::store::{
    DurableStore, InsertOutcome, RedeemMode, Redemption, RoleStore, TokenStore, UserStore,
};
pub use crate::types::{Purpose, RoleId, RoleName, UserId};
pub use crate::verification::VerificationTokenStore;

#[cfg(feature = "bcrypt")]
pub use crate::credentials::BcryptCredentials;

#[cfg(feature = "memory-store")]
pub use crate::memory_store::MemoryStore;

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::MemoryCache;
