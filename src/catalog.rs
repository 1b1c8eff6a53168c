use crate::deadline::bounded;
use crate::error::{Error, Result};
use crate::model::Role;
use crate::permission::{Permission, expand_grants, parse_permission_spec};
use crate::store::{InsertOutcome, RoleStore};
use crate::types::RoleName;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Role and permission catalog.
///
/// Roles map to permission grants that may contain wildcards. Wildcards are
/// stored as written and expanded by [`PermissionCatalog::resolve`] against
/// every concrete permission the catalog has seen.
#[derive(Debug)]
pub struct PermissionCatalog<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for PermissionCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timeout: self.timeout,
        }
    }
}

impl<S> PermissionCatalog<S>
where
    S: RoleStore + Send + Sync,
{
    /// Creates a catalog over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call store deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ensures every role in `spec` exists with exactly the parsed permission set.
    ///
    /// Entries are applied in role-name order and independently of each other:
    /// a malformed entry provisions nothing for that role but does not stop the
    /// rest. Roles missing from `spec` are left untouched. When any entry fails,
    /// the first failure is returned after all entries have been attempted.
    #[instrument(skip_all, fields(roles = tracing::field::Empty))]
    pub async fn provision<I, K, V>(&self, spec: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let entries: BTreeMap<String, String> = spec
            .into_iter()
            .map(|(name, perms)| (name.as_ref().trim().to_string(), perms.as_ref().to_string()))
            .collect();
        tracing::Span::current().record("roles", entries.len());

        let mut failures = Vec::new();
        for (name, perms) in &entries {
            if let Err(err) = self.provision_role(name, perms).await {
                warn!(role = %name, spec = %perms, error = %err, "role provisioning failed");
                failures.push(err);
            }
        }

        match failures.into_iter().next() {
            Some(first) => Err(first),
            None => {
                info!(roles = entries.len(), "roles provisioned");
                Ok(())
            }
        }
    }

    async fn provision_role(&self, name: &str, spec: &str) -> Result<()> {
        let name = RoleName::new(name)?;
        let grants = parse_permission_spec(spec)?;

        let role = self.ensure_role(&name).await?;

        let concrete: Vec<Permission> = grants
            .iter()
            .filter(|grant| !grant.is_wildcard())
            .cloned()
            .collect();
        let grants: Vec<Permission> = grants.into_iter().collect();

        bounded(
            "upsert permissions",
            self.timeout,
            self.store.upsert_permissions(concrete),
        )
        .await?;

        let current: BTreeSet<Permission> = bounded(
            "load role permissions",
            self.timeout,
            self.store.role_permissions(role.id),
        )
        .await?
        .into_iter()
        .collect();
        if current.iter().eq(grants.iter()) {
            debug!(role = %name, "role permissions unchanged");
            return Ok(());
        }

        bounded(
            "replace role permissions",
            self.timeout,
            self.store.replace_role_permissions(role.id, grants),
        )
        .await?;
        debug!(role = %name, "role permissions replaced");
        Ok(())
    }

    async fn ensure_role(&self, name: &RoleName) -> Result<Role> {
        if let Some(role) = self.find_role(name).await? {
            return Ok(role);
        }

        let outcome = bounded(
            "insert role",
            self.timeout,
            self.store.insert_role(Role::new(name.clone(), None)),
        )
        .await?;
        if outcome == InsertOutcome::Inserted {
            info!(role = %name, "role created");
        }

        // A concurrent creator may have won the insert; read back whichever row exists.
        self.find_role(name).await?.ok_or_else(|| {
            Error::Conflict(format!("role `{name}` could not be created or read back"))
        })
    }

    /// Adds concrete permissions to the known universe without granting them.
    pub async fn register_permissions<I, P>(&self, permissions: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for permission in permissions {
            let permission = Permission::new(permission)?;
            if permission.is_wildcard() {
                return Err(Error::Validation(format!(
                    "cannot register wildcard permission `{permission}`"
                )));
            }
            parsed.push(permission);
        }
        bounded(
            "upsert permissions",
            self.timeout,
            self.store.upsert_permissions(parsed),
        )
        .await
    }

    /// Returns the expanded, sorted permission set of `role`.
    #[instrument(skip(self), fields(role = %role))]
    pub async fn resolve(&self, role: &RoleName) -> Result<Vec<Permission>> {
        let record = self
            .find_role(role)
            .await?
            .ok_or_else(|| Error::not_found("role", role.as_str()))?;

        let grants: BTreeSet<Permission> = bounded(
            "load role permissions",
            self.timeout,
            self.store.role_permissions(record.id),
        )
        .await?
        .into_iter()
        .collect();

        if !grants.iter().any(Permission::is_wildcard) {
            return Ok(grants.into_iter().collect());
        }

        let known: BTreeSet<Permission> =
            bounded("load permissions", self.timeout, self.store.permissions())
                .await?
                .into_iter()
                .collect();
        Ok(expand_grants(&grants, &known).into_iter().collect())
    }

    /// Looks up a role by name.
    pub async fn role(&self, name: &RoleName) -> Result<Role> {
        self.find_role(name)
            .await?
            .ok_or_else(|| Error::not_found("role", name.as_str()))
    }

    /// Looks up a role by id.
    pub async fn role_by_id(&self, id: crate::types::RoleId) -> Result<Role> {
        bounded("load role", self.timeout, self.store.role_by_id(id))
            .await?
            .ok_or_else(|| Error::not_found("role", id.to_string()))
    }

    /// Returns every role, ordered by name.
    pub async fn roles(&self) -> Result<Vec<Role>> {
        let mut roles = bounded("load roles", self.timeout, self.store.roles()).await?;
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// Returns every role with its unexpanded grants, ordered by name.
    pub async fn snapshot(&self) -> Result<BTreeMap<RoleName, BTreeSet<Permission>>> {
        let roles = self.roles().await?;
        let mut snapshot = BTreeMap::new();
        for role in roles {
            let grants = bounded(
                "load role permissions",
                self.timeout,
                self.store.role_permissions(role.id),
            )
            .await?;
            snapshot.insert(role.name, grants.into_iter().collect());
        }
        Ok(snapshot)
    }

    async fn find_role(&self, name: &RoleName) -> Result<Option<Role>> {
        bounded("load role", self.timeout, self.store.role_by_name(name)).await
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    fn catalog() -> PermissionCatalog<MemoryStore> {
        PermissionCatalog::new(Arc::new(MemoryStore::new()))
    }

    fn role(name: &str) -> RoleName {
        RoleName::try_from(name).unwrap()
    }

    fn perms(values: &[&str]) -> Vec<Permission> {
        values.iter().map(|v| Permission::try_from(*v).unwrap()).collect()
    }

    #[tokio::test]
    async fn exact_spec_resolves_to_exactly_that_permission() {
        let catalog = catalog();
        catalog.provision([("analyst", "reports:read")]).await.unwrap();

        let resolved = catalog.resolve(&role("analyst")).await.unwrap();
        assert_eq!(resolved, perms(&["reports:read"]));
    }

    #[tokio::test]
    async fn resource_wildcard_resolves_every_registered_action() {
        let catalog = catalog();
        catalog
            .provision([
                ("viewer", "reports:read"),
                ("exporter", "reports:export"),
                ("staff", "user:read"),
                ("reporter", "reports:all"),
            ])
            .await
            .unwrap();

        let resolved = catalog.resolve(&role("reporter")).await.unwrap();
        assert_eq!(resolved, perms(&["reports:export", "reports:read"]));
    }

    #[tokio::test]
    async fn registered_permissions_join_the_wildcard_universe() {
        let catalog = catalog();
        catalog.provision([("admin", "all:all")]).await.unwrap();
        assert!(catalog.resolve(&role("admin")).await.unwrap().is_empty());

        catalog
            .register_permissions(["billing:refund", "user:delete"])
            .await
            .unwrap();

        let resolved = catalog.resolve(&role("admin")).await.unwrap();
        assert_eq!(resolved, perms(&["billing:refund", "user:delete"]));
    }

    #[tokio::test]
    async fn provisioning_twice_is_idempotent() {
        let catalog = catalog();
        let spec = [("admin", "all:all"), ("user", "user:read"), ("ops", "reports:all")];

        catalog.provision(spec).await.unwrap();
        let before = catalog.snapshot().await.unwrap();
        let admin_id = catalog.role(&role("admin")).await.unwrap().id;

        catalog.provision(spec).await.unwrap();
        let after = catalog.snapshot().await.unwrap();

        assert_eq!(before, after);
        assert_eq!(catalog.role(&role("admin")).await.unwrap().id, admin_id);
    }

    #[tokio::test]
    async fn reprovisioning_replaces_the_permission_set() {
        let catalog = catalog();
        catalog.provision([("user", "user:read")]).await.unwrap();
        catalog
            .provision([("user", "user:read,user:update")])
            .await
            .unwrap();

        let resolved = catalog.resolve(&role("user")).await.unwrap();
        assert_eq!(resolved, perms(&["user:read", "user:update"]));
    }

    #[tokio::test]
    async fn roles_absent_from_spec_are_kept() {
        let catalog = catalog();
        catalog.provision([("legacy", "user:read")]).await.unwrap();
        catalog.provision([("user", "user:read")]).await.unwrap();

        assert!(catalog.role(&role("legacy")).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_entry_fails_alone() {
        let catalog = catalog();
        let result = catalog
            .provision([("broken", "reports"), ("user", "user:read"), ("empty", ":read")])
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(matches!(
            catalog.role(&role("broken")).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            catalog.role(&role("empty")).await,
            Err(Error::NotFound { .. })
        ));
        assert_eq!(
            catalog.resolve(&role("user")).await.unwrap(),
            perms(&["user:read"])
        );
    }

    #[tokio::test]
    async fn roles_are_listed_by_name() {
        let catalog = catalog();
        catalog
            .provision([("user", "user:read"), ("admin", "all:all")])
            .await
            .unwrap();

        let names: Vec<String> = catalog
            .roles()
            .await
            .unwrap()
            .into_iter()
            .map(|role| role.name.to_string())
            .collect();
        assert_eq!(names, vec!["admin".to_string(), "user".to_string()]);
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let catalog = catalog();
        let result = catalog.resolve(&role("ghost")).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "role", .. })));
    }

    #[tokio::test]
    async fn wildcard_registration_is_rejected() {
        let catalog = catalog();
        let result = catalog.register_permissions(["reports:all"]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
