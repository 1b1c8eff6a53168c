use crate::error::StoreError;
use crate::model::{Role, User, VerificationToken};
use crate::permission::Permission;
use crate::types::{RoleId, RoleName, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written.
    Inserted,
    /// A row with the same unique key already exists; nothing was written.
    Duplicate,
}

/// What to do besides deleting a token in [`TokenStore::redeem_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemMode {
    /// Only delete the record and return it.
    DeleteOnly,
    /// Also apply [`VerificationToken::user_effect`] to the owning user in the
    /// same unit of work.
    ApplyEffect,
}

/// Outcome of [`TokenStore::redeem_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// No record with that token exists.
    Missing,
    /// The record exists but is expired; it was left in place.
    Expired(VerificationToken),
    /// [`RedeemMode::ApplyEffect`] was requested but the owning user does not
    /// exist. Nothing was deleted or applied.
    OwnerMissing(VerificationToken),
    /// The record was deleted (and the effect applied, if requested).
    Redeemed(VerificationToken),
}

/// Durable storage for roles and their permissions.
#[async_trait]
pub trait RoleStore {
    /// Looks up a role by its unique name.
    async fn role_by_name(&self, name: &RoleName) -> std::result::Result<Option<Role>, StoreError>;

    /// Looks up a role by id.
    async fn role_by_id(&self, id: RoleId) -> std::result::Result<Option<Role>, StoreError>;

    /// Returns every role.
    async fn roles(&self) -> std::result::Result<Vec<Role>, StoreError>;

    /// Inserts a role; the name is unique.
    async fn insert_role(&self, role: Role) -> std::result::Result<InsertOutcome, StoreError>;

    /// Adds permissions to the known universe. Existing rows are left alone.
    async fn upsert_permissions(
        &self,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError>;

    /// Returns every permission row, wildcards included.
    async fn permissions(&self) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Returns permissions attached to a role, unexpanded.
    async fn role_permissions(
        &self,
        role: RoleId,
    ) -> std::result::Result<Vec<Permission>, StoreError>;

    /// Atomically replaces the permission set attached to a role.
    async fn replace_role_permissions(
        &self,
        role: RoleId,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError>;
}

/// Durable storage for verification tokens.
#[async_trait]
pub trait TokenStore {
    /// Inserts a record; the token string is unique.
    async fn insert_token(
        &self,
        record: VerificationToken,
    ) -> std::result::Result<InsertOutcome, StoreError>;

    /// Reads a record without consuming it.
    async fn find_token(
        &self,
        token: &str,
    ) -> std::result::Result<Option<VerificationToken>, StoreError>;

    /// Deletes and returns a live record as one atomic operation.
    ///
    /// Under concurrent calls for the same token at most one may observe
    /// [`Redemption::Redeemed`]. Expired records must not be deleted here.
    async fn redeem_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        mode: RedeemMode,
    ) -> std::result::Result<Redemption, StoreError>;

    /// Deletes records issued before `cutoff`; returns how many were removed.
    async fn purge_tokens_issued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError>;
}

/// External user persistence.
#[async_trait]
pub trait UserStore {
    /// Looks up a user by id.
    async fn user_by_id(&self, id: UserId) -> std::result::Result<Option<User>, StoreError>;

    /// Looks up a user by username or email.
    async fn user_by_identity(
        &self,
        identity: &str,
    ) -> std::result::Result<Option<User>, StoreError>;

    /// Inserts a user; username and email are unique.
    async fn insert_user(&self, user: User) -> std::result::Result<InsertOutcome, StoreError>;

    /// Replaces the password hash; returns false when the user does not exist.
    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: String,
    ) -> std::result::Result<bool, StoreError>;
}

/// Composite durable store.
pub trait DurableStore: RoleStore + TokenStore + UserStore + Send + Sync {}

impl<T> DurableStore for T where T: RoleStore + TokenStore + UserStore + Send + Sync {}
