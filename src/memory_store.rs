use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Role, User, UserEffect, VerificationToken};
use crate::permission::Permission;
use crate::store::{InsertOutcome, RedeemMode, Redemption, RoleStore, TokenStore, UserStore};
use crate::types::{RoleId, RoleName, UserId};

/// In-memory store implementation for tests and demos.
///
/// Token redemption holds the token table write lock for the whole
/// check-delete-apply sequence; when it touches users it takes the user
/// table lock second. No other method holds both.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    roles: RwLock<HashMap<RoleId, Role>>,
    permissions: RwLock<BTreeSet<Permission>>,
    role_permissions: RwLock<HashMap<RoleId, BTreeSet<Permission>>>,
    tokens: RwLock<HashMap<String, VerificationToken>>,
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored verification-token records, expired ones included.
    pub fn token_count(&self) -> usize {
        self.inner.tokens.read().expect("poisoned lock").len()
    }
}

fn apply_effect(user: &mut User, effect: UserEffect) {
    match effect {
        UserEffect::ConfirmEmail => user.email_confirmed = true,
        UserEffect::ReplacePasswordHash(hash) => user.password_hash = hash,
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn role_by_name(
        &self,
        name: &RoleName,
    ) -> std::result::Result<Option<Role>, crate::StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
        Ok(guard.values().find(|role| &role.name == name).cloned())
    }

    async fn role_by_id(&self, id: RoleId) -> std::result::Result<Option<Role>, crate::StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
        Ok(guard.get(&id).cloned())
    }

    async fn roles(&self) -> std::result::Result<Vec<Role>, crate::StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
        let mut roles: Vec<Role> = guard.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn insert_role(&self, role: Role) -> std::result::Result<InsertOutcome, crate::StoreError> {
        let mut guard = self.inner.roles.write().expect("poisoned lock");
        if guard.contains_key(&role.id) || guard.values().any(|existing| existing.name == role.name) {
            return Ok(InsertOutcome::Duplicate);
        }
        guard.insert(role.id, role);
        Ok(InsertOutcome::Inserted)
    }

    async fn upsert_permissions(
        &self,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), crate::StoreError> {
        let mut guard = self.inner.permissions.write().expect("poisoned lock");
        guard.extend(permissions);
        Ok(())
    }

    async fn permissions(&self) -> std::result::Result<Vec<Permission>, crate::StoreError> {
        let guard = self.inner.permissions.read().expect("poisoned lock");
        Ok(guard.iter().cloned().collect())
    }

    async fn role_permissions(
        &self,
        role: RoleId,
    ) -> std::result::Result<Vec<Permission>, crate::StoreError> {
        let guard = self.inner.role_permissions.read().expect("poisoned lock");
        Ok(guard
            .get(&role)
            .map(|perms| perms.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn replace_role_permissions(
        &self,
        role: RoleId,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), crate::StoreError> {
        let mut guard = self.inner.role_permissions.write().expect("poisoned lock");
        guard.insert(role, permissions.into_iter().collect());
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(
        &self,
        record: VerificationToken,
    ) -> std::result::Result<InsertOutcome, crate::StoreError> {
        let mut guard = self.inner.tokens.write().expect("poisoned lock");
        if guard.contains_key(&record.token) {
            return Ok(InsertOutcome::Duplicate);
        }
        guard.insert(record.token.clone(), record);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_token(
        &self,
        token: &str,
    ) -> std::result::Result<Option<VerificationToken>, crate::StoreError> {
        let guard = self.inner.tokens.read().expect("poisoned lock");
        Ok(guard.get(token).cloned())
    }

    async fn redeem_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        mode: RedeemMode,
    ) -> std::result::Result<Redemption, crate::StoreError> {
        let mut tokens = self.inner.tokens.write().expect("poisoned lock");
        let Some(record) = tokens.get(token) else {
            return Ok(Redemption::Missing);
        };
        if record.is_expired(now) {
            return Ok(Redemption::Expired(record.clone()));
        }

        if mode == RedeemMode::ApplyEffect {
            let mut users = self.inner.users.write().expect("poisoned lock");
            let Some(user) = users.get_mut(&record.user_id) else {
                return Ok(Redemption::OwnerMissing(record.clone()));
            };
            apply_effect(user, record.user_effect());
        }

        match tokens.remove(token) {
            Some(record) => Ok(Redemption::Redeemed(record)),
            None => Ok(Redemption::Missing),
        }
    }

    async fn purge_tokens_issued_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> std::result::Result<u64, crate::StoreError> {
        let mut guard = self.inner.tokens.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|_, record| record.issued_at >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_id(&self, id: UserId) -> std::result::Result<Option<User>, crate::StoreError> {
        let guard = self.inner.users.read().expect("poisoned lock");
        Ok(guard.get(&id).cloned())
    }

    async fn user_by_identity(
        &self,
        identity: &str,
    ) -> std::result::Result<Option<User>, crate::StoreError> {
        let guard = self.inner.users.read().expect("poisoned lock");
        Ok(guard
            .values()
            .find(|user| user.username == identity || user.email.eq_ignore_ascii_case(identity))
            .cloned())
    }

    async fn insert_user(&self, user: User) -> std::result::Result<InsertOutcome, crate::StoreError> {
        let mut guard = self.inner.users.write().expect("poisoned lock");
        let taken = guard.contains_key(&user.id)
            || guard.values().any(|existing| {
                existing.username == user.username || existing.email.eq_ignore_ascii_case(&user.email)
            });
        if taken {
            return Ok(InsertOutcome::Duplicate);
        }
        guard.insert(user.id, user);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: String,
    ) -> std::result::Result<bool, crate::StoreError> {
        let mut guard = self.inner.users.write().expect("poisoned lock");
        match guard.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Purpose;
    use chrono::Duration;
    use futures::executor::block_on;

    fn record(token: &str, user_id: UserId, purpose: Purpose, payload: &str) -> VerificationToken {
        let issued_at = Utc::now();
        VerificationToken {
            token: token.to_string(),
            user_id,
            purpose,
            payload: payload.to_string(),
            issued_at,
            expires_at: issued_at + Duration::hours(1),
        }
    }

    #[test]
    fn duplicate_role_names_are_rejected() {
        let store = MemoryStore::new();
        let name = RoleName::try_from("admin").unwrap();

        let first = block_on(store.insert_role(Role::new(name.clone(), None))).unwrap();
        let second = block_on(store.insert_role(Role::new(name, None))).unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Duplicate);
    }

    #[test]
    fn duplicate_tokens_are_rejected() {
        let store = MemoryStore::new();
        let user = UserId::generate();

        let first = block_on(store.insert_token(record("t", user, Purpose::ConfirmEmail, ""))).unwrap();
        let second =
            block_on(store.insert_token(record("t", user, Purpose::ConfirmEmail, ""))).unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Duplicate);
    }

    #[test]
    fn redeem_applies_effect_and_deletes_once() {
        let store = MemoryStore::new();
        let user = User::new("alice", "alice@example.com", "old-hash", RoleId::generate());
        let user_id = user.id;
        block_on(store.insert_user(user)).unwrap();
        block_on(store.insert_token(record("t", user_id, Purpose::ResetPassword, "new-hash")))
            .unwrap();

        let first = block_on(store.redeem_token("t", Utc::now(), RedeemMode::ApplyEffect)).unwrap();
        let second = block_on(store.redeem_token("t", Utc::now(), RedeemMode::ApplyEffect)).unwrap();

        assert!(matches!(first, Redemption::Redeemed(_)));
        assert_eq!(second, Redemption::Missing);
        let stored = block_on(store.user_by_id(user_id)).unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[test]
    fn redeem_without_owner_keeps_the_token() {
        let store = MemoryStore::new();
        let orphan = UserId::generate();
        block_on(store.insert_token(record("t", orphan, Purpose::ResetPassword, "new-hash")))
            .unwrap();

        let outcome = block_on(store.redeem_token("t", Utc::now(), RedeemMode::ApplyEffect)).unwrap();

        assert!(matches!(outcome, Redemption::OwnerMissing(_)));
        assert_eq!(store.token_count(), 1);

        let delete_only = block_on(store.redeem_token("t", Utc::now(), RedeemMode::DeleteOnly)).unwrap();
        assert!(matches!(delete_only, Redemption::Redeemed(_)));
    }

    #[test]
    fn redeem_leaves_expired_records_in_place() {
        let store = MemoryStore::new();
        let rec = record("t", UserId::generate(), Purpose::ConfirmEmail, "");
        let after_expiry = rec.expires_at;
        block_on(store.insert_token(rec)).unwrap();

        let outcome = block_on(store.redeem_token("t", after_expiry, RedeemMode::DeleteOnly)).unwrap();

        assert!(matches!(outcome, Redemption::Expired(_)));
        assert_eq!(store.token_count(), 1);
    }

    #[test]
    fn user_lookup_matches_username_or_email() {
        let store = MemoryStore::new();
        let user = User::new("bob", "Bob@Example.com", "hash", RoleId::generate());
        block_on(store.insert_user(user.clone())).unwrap();

        let by_name = block_on(store.user_by_identity("bob")).unwrap();
        let by_email = block_on(store.user_by_identity("bob@example.com")).unwrap();
        let dup = User::new("bobby", "bob@example.com", "hash", RoleId::generate());

        assert_eq!(by_name, Some(user.clone()));
        assert_eq!(by_email, Some(user));
        assert_eq!(block_on(store.insert_user(dup)).unwrap(), InsertOutcome::Duplicate);
    }
}
