use crate::cache::{FastCache, NoCache};
use crate::catalog::PermissionCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::credentials::{CredentialHasher, CredentialVerifier};
use crate::deadline::bounded;
use crate::error::{Error, Result};
use crate::issuer::{RequestScope, TokenIssuer};
use crate::model::{ConsumedToken, TokenNotice, User};
use crate::notifier::{NoopNotifier, Notifier};
use crate::permission::Permission;
use crate::store::{DurableStore, InsertOutcome};
use crate::types::{Purpose, RoleName, UserId};
use crate::verification::VerificationTokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Authenticated user together with a freshly signed bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub role: RoleName,
    pub bearer_token: String,
}

/// Composition root for authentication and authorization flows.
///
/// Construct once at startup with [`AuthServiceBuilder`], call
/// [`AuthService::provision`] before serving traffic and share the service
/// behind an `Arc`.
pub struct AuthService<S, C = NoCache> {
    store: Arc<S>,
    catalog: PermissionCatalog<S>,
    tokens: Arc<VerificationTokenStore<S, C>>,
    issuer: TokenIssuer,
    hasher: Arc<dyn CredentialHasher>,
    verifier: Arc<dyn CredentialVerifier>,
    notifier: Arc<dyn Notifier>,
    config: AuthConfig,
}

/// Builder for [`AuthService`].
pub struct AuthServiceBuilder<S, C = NoCache> {
    store: Arc<S>,
    cache: Arc<C>,
    config: AuthConfig,
    hasher: Option<Arc<dyn CredentialHasher>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl<S> AuthServiceBuilder<S, NoCache> {
    /// Creates a builder with no cache, no notifier and the system clock.
    pub fn new(store: Arc<S>, config: AuthConfig) -> Self {
        Self {
            store,
            cache: Arc::new(NoCache),
            config,
            hasher: None,
            verifier: None,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<S, C> AuthServiceBuilder<S, C> {
    /// Sets the token cache.
    pub fn cache<C2: FastCache>(self, cache: Arc<C2>) -> AuthServiceBuilder<S, C2> {
        AuthServiceBuilder {
            store: self.store,
            cache,
            config: self.config,
            hasher: self.hasher,
            verifier: self.verifier,
            notifier: self.notifier,
            clock: self.clock,
        }
    }

    /// Sets one implementation as both hasher and verifier.
    pub fn credentials<K>(mut self, credentials: K) -> Self
    where
        K: CredentialHasher + CredentialVerifier + 'static,
    {
        let shared = Arc::new(credentials);
        self.hasher = Some(shared.clone());
        self.verifier = Some(shared);
        self
    }

    /// Sets the notifier for issued verification tokens.
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Sets the clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the service.
    ///
    /// Fails with [`Error::Configuration`] when the signing secret is blank or
    /// no credential implementation is available.
    pub fn build(self) -> Result<AuthService<S, C>>
    where
        S: DurableStore,
        C: FastCache,
    {
        let (hasher, verifier) = match (self.hasher, self.verifier) {
            (Some(hasher), Some(verifier)) => (hasher, verifier),
            _ => default_credentials()?,
        };
        let issuer = TokenIssuer::new(&self.config.signing_secret, Arc::clone(&self.clock))?;
        let catalog = PermissionCatalog::new(Arc::clone(&self.store))
            .with_timeout(self.config.operation_timeout);
        let tokens = VerificationTokenStore::new(
            Arc::clone(&self.store),
            self.cache,
            self.clock,
        )
        .with_retention(self.config.token_retention)
        .with_timeout(self.config.operation_timeout);

        debug!(config = ?self.config, "auth service built");
        Ok(AuthService {
            store: self.store,
            catalog,
            tokens: Arc::new(tokens),
            issuer,
            hasher,
            verifier,
            notifier: self.notifier,
            config: self.config,
        })
    }
}

#[cfg(feature = "bcrypt")]
fn default_credentials() -> Result<(Arc<dyn CredentialHasher>, Arc<dyn CredentialVerifier>)> {
    let shared = Arc::new(crate::credentials::BcryptCredentials::new());
    Ok((shared.clone(), shared))
}

#[cfg(not(feature = "bcrypt"))]
fn default_credentials() -> Result<(Arc<dyn CredentialHasher>, Arc<dyn CredentialVerifier>)> {
    Err(Error::Configuration(
        "no credential hasher configured; enable the `bcrypt` feature or call `credentials`"
            .to_string(),
    ))
}

impl<S, C> AuthService<S, C>
where
    S: DurableStore,
    C: FastCache,
{
    /// Role catalog used by this service.
    pub fn catalog(&self) -> &PermissionCatalog<S> {
        &self.catalog
    }

    /// Verification token store used by this service.
    pub fn tokens(&self) -> &VerificationTokenStore<S, C> {
        &self.tokens
    }

    /// Provisions roles. Run once before accepting traffic.
    pub async fn provision<I, K, V>(&self, spec: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.catalog.provision(spec).await
    }

    /// Resolves the permissions of `role`.
    ///
    /// Any failure yields an empty set: the resulting bearer token is valid
    /// but grants nothing.
    pub async fn resolve_permissions(&self, role: &RoleName) -> Vec<Permission> {
        match self.catalog.resolve(role).await {
            Ok(permissions) => permissions,
            Err(err) => {
                warn!(role = %role, error = %err, "permission resolution failed, issuing without permissions");
                Vec::new()
            }
        }
    }

    /// Signs a bearer token for `user` acting as `role`.
    pub async fn issue_bearer_token(&self, user: &User, role: &RoleName) -> Result<String> {
        let permissions = self.resolve_permissions(role).await;
        self.issuer.issue(&user.identity(), role, &permissions)
    }

    /// Issues a single-use token for `user_id`. See [`VerificationTokenStore::issue`].
    pub async fn issue_verification_token(
        &self,
        user_id: UserId,
        purpose: Purpose,
        payload: impl Into<String>,
        ttl: Duration,
    ) -> Result<String> {
        self.tokens.issue(user_id, purpose, payload, ttl).await
    }

    /// Consumes a token without applying its effect to the user.
    pub async fn consume_verification_token(&self, token: &str) -> Result<ConsumedToken> {
        self.tokens.consume(token).await
    }

    /// Authenticates by username or email.
    ///
    /// An unknown identity and a wrong password produce the same error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, identity: &str, password: &str) -> Result<Session> {
        let rejected = || Error::not_found("credentials", identity);

        let Some(user) = self.find_user(identity).await? else {
            debug!("login for unknown identity");
            return Err(rejected());
        };
        if !self.verifier.verify(password, &user.password_hash) {
            debug!(user_id = %user.id, "login with wrong password");
            return Err(rejected());
        }

        let session = self.session(user).await?;
        info!(user_id = %session.user.id, role = %session.role, "user logged in");
        Ok(session)
    }

    /// Creates an account with the default role and sends a confirmation token.
    ///
    /// Once the user row is written the account stands: a failure to issue or
    /// deliver the confirmation token is logged and the session is still
    /// returned, so the caller follows up with
    /// [`AuthService::resend_confirmation`] instead of registering again.
    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Session> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }
        validate_email(email)?;
        validate_password(password)?;

        let role = self.catalog.role(&self.config.default_role).await?;
        let hash = self.hasher.hash(password)?;
        let user = User::new(username, email, hash, role.id);

        let outcome = bounded(
            "insert user",
            self.config.operation_timeout,
            self.store.insert_user(user.clone()),
        )
        .await?;
        if outcome == InsertOutcome::Duplicate {
            return Err(Error::Conflict(format!(
                "username `{username}` or email `{email}` is already registered"
            )));
        }
        info!(user_id = %user.id, role = %role.name, "user registered");

        if let Err(err) = self
            .send_token(&user, Purpose::ConfirmEmail, String::new(), self.config.confirmation_ttl)
            .await
        {
            warn!(user_id = %user.id, error = %err, "confirmation token not issued at registration");
        }

        let bearer_token = self.issue_bearer_token(&user, &role.name).await?;
        Ok(Session {
            user,
            role: role.name,
            bearer_token,
        })
    }

    /// Issues another confirmation token. Earlier ones stay valid.
    #[instrument(skip(self))]
    pub async fn resend_confirmation(&self, identity: &str) -> Result<()> {
        let user = self
            .find_user(identity)
            .await?
            .ok_or_else(|| Error::not_found("user", identity))?;
        if user.email_confirmed {
            return Err(Error::Conflict(format!(
                "email of `{}` is already confirmed",
                user.username
            )));
        }
        self.send_token(&user, Purpose::ConfirmEmail, String::new(), self.config.confirmation_ttl)
            .await
    }

    /// Issues a reset token carrying the hash of `new_password`.
    ///
    /// The password takes effect only when the token is redeemed through
    /// [`AuthService::confirm_or_reset`].
    #[instrument(skip(self, new_password))]
    pub async fn request_password_reset(&self, identity: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let user = self
            .find_user(identity)
            .await?
            .ok_or_else(|| Error::not_found("user", identity))?;
        let hash = self.hasher.hash(new_password)?;
        self.send_token(&user, Purpose::ResetPassword, hash, self.config.reset_ttl)
            .await
    }

    /// Redeems a confirmation or reset token, applying its effect to the user.
    pub async fn confirm_or_reset(&self, token: &str) -> Result<ConsumedToken> {
        self.tokens.redeem(token).await
    }

    /// Re-signs a bearer token from current user and role state.
    pub async fn refresh(&self, scope: &RequestScope) -> Result<Session> {
        let user = self.user(scope.user_id).await?;
        self.session(user).await
    }

    /// Replaces the caller's password after checking the current one.
    #[instrument(skip_all, fields(user_id = %scope.user_id))]
    pub async fn change_password(
        &self,
        scope: &RequestScope,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        validate_password(new_password)?;
        let user = self.user(scope.user_id).await?;
        if !self.verifier.verify(current_password, &user.password_hash) {
            return Err(Error::Validation("current password does not match".to_string()));
        }

        let hash = self.hasher.hash(new_password)?;
        let updated = bounded(
            "update password",
            self.config.operation_timeout,
            self.store.update_password_hash(user.id, hash),
        )
        .await?;
        if !updated {
            return Err(Error::not_found("user", user.id.to_string()));
        }
        info!("password changed");
        Ok(())
    }

    /// Starts the periodic retention sweep of verification tokens.
    pub fn spawn_retention_sweep(&self, every: Duration) -> JoinHandle<()>
    where
        S: 'static,
        C: 'static,
    {
        Arc::clone(&self.tokens).spawn_retention_sweep(every)
    }

    async fn session(&self, user: User) -> Result<Session> {
        let role = self.catalog.role_by_id(user.role_id).await?;
        let bearer_token = self.issue_bearer_token(&user, &role.name).await?;
        Ok(Session {
            user,
            role: role.name,
            bearer_token,
        })
    }

    async fn user(&self, id: UserId) -> Result<User> {
        bounded(
            "load user",
            self.config.operation_timeout,
            self.store.user_by_id(id),
        )
        .await?
        .ok_or_else(|| Error::not_found("user", id.to_string()))
    }

    async fn find_user(&self, identity: &str) -> Result<Option<User>> {
        bounded(
            "load user",
            self.config.operation_timeout,
            self.store.user_by_identity(identity.trim()),
        )
        .await
    }

    async fn send_token(
        &self,
        user: &User,
        purpose: Purpose,
        payload: String,
        ttl: Duration,
    ) -> Result<()> {
        let token = self.tokens.issue(user.id, purpose, payload, ttl).await?;
        let notice = TokenNotice {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            purpose,
            token,
        };
        if let Err(err) = bounded(
            "publish notice",
            self.config.operation_timeout,
            self.notifier.publish(notice),
        )
        .await
        {
            warn!(user_id = %user.id, purpose = %purpose, error = %err, "token notice not delivered");
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("`{email}` is not a valid email address")))
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".to_string()));
    }
    Ok(())
}
