//! Single-use verification tokens.
//!
//! The durable [`TokenStore`] is the source of truth. The [`FastCache`] only
//! holds a [`TokenInfo`] index entry per live token for cheap `peek`s; the
//! payload never leaves the durable record.

use crate::cache::FastCache;
use crate::clock::Clock;
use crate::deadline::bounded;
use crate::error::{Error, Result};
use crate::model::{ConsumedToken, TokenInfo, VerificationToken};
use crate::store::{InsertOutcome, RedeemMode, Redemption, TokenStore};
use crate::types::{Purpose, UserId};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const TOKEN_BYTES: usize = 32;
const MAX_ISSUE_ATTEMPTS: usize = 5;
const CACHE_PREFIX: &str = "verification:";
const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues, inspects and consumes single-use tokens.
pub struct VerificationTokenStore<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    timeout: Duration,
}

impl<S, C> VerificationTokenStore<S, C>
where
    S: TokenStore + Send + Sync,
    C: FastCache,
{
    /// Creates a token store with a 24h retention window and a 5s deadline.
    pub fn new(store: Arc<S>, cache: Arc<C>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache,
            clock,
            retention: DEFAULT_RETENTION,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets how long durable records are kept before [`Self::sweep`] purges them.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the per-call deadline for store and cache calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issues a token valid for `ttl` and returns its opaque string.
    ///
    /// A zero `ttl` yields a token that is already expired.
    #[instrument(skip(self, payload), fields(user_id = %user_id, purpose = %purpose))]
    pub async fn issue(
        &self,
        user_id: UserId,
        purpose: Purpose,
        payload: impl Into<String>,
        ttl: Duration,
    ) -> Result<String> {
        let payload = payload.into();
        if purpose == Purpose::ResetPassword && payload.is_empty() {
            return Err(Error::Validation(
                "password reset token requires a replacement hash".to_string(),
            ));
        }
        let out_of_range = || Error::Validation(format!("token ttl out of range: {ttl:?}"));
        let lifetime = chrono::Duration::from_std(ttl).map_err(|_| out_of_range())?;

        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(out_of_range)?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let record = VerificationToken {
                token: generate_token(),
                user_id,
                purpose,
                payload: payload.clone(),
                issued_at,
                expires_at,
            };
            let info = TokenInfo::from(&record);
            let token = record.token.clone();

            match bounded("insert token", self.timeout, self.store.insert_token(record)).await? {
                InsertOutcome::Inserted => {
                    self.index(&token, &info, ttl).await;
                    info!(expires_at = %expires_at, "verification token issued");
                    return Ok(token);
                }
                InsertOutcome::Duplicate => {
                    warn!(attempt, "generated token collided, regenerating");
                }
            }
        }

        Err(Error::Conflict(format!(
            "could not generate a unique token after {MAX_ISSUE_ATTEMPTS} attempts"
        )))
    }

    /// Consumes a token without touching the owning user.
    pub async fn consume(&self, token: &str) -> Result<ConsumedToken> {
        self.finish(token, RedeemMode::DeleteOnly).await
    }

    /// Consumes a token and applies its effect to the owning user atomically.
    pub async fn redeem(&self, token: &str) -> Result<ConsumedToken> {
        self.finish(token, RedeemMode::ApplyEffect).await
    }

    #[instrument(skip(self, token), fields(mode = ?mode))]
    async fn finish(&self, token: &str, mode: RedeemMode) -> Result<ConsumedToken> {
        let now = self.clock.now();
        let outcome = bounded(
            "redeem token",
            self.timeout,
            self.store.redeem_token(token, now, mode),
        )
        .await?;

        match outcome {
            Redemption::Missing => Err(Error::not_found("verification token", redact(token))),
            Redemption::Expired(record) => {
                debug!(user_id = %record.user_id, expired_at = %record.expires_at, "token expired");
                Err(Error::Expired {
                    expired_at: record.expires_at,
                })
            }
            Redemption::OwnerMissing(record) => {
                warn!(user_id = %record.user_id, purpose = %record.purpose, "token owner does not exist, nothing applied");
                Err(Error::not_found("user", record.user_id.to_string()))
            }
            Redemption::Redeemed(record) => {
                self.unindex(token).await;
                info!(user_id = %record.user_id, purpose = %record.purpose, "verification token consumed");
                Ok(record.into())
            }
        }
    }

    /// Looks a token up without consuming it.
    ///
    /// The durable record decides the answer. A cache entry whose record is
    /// gone (consumed elsewhere, or left behind by a failed removal) is
    /// dropped rather than reported as live.
    pub async fn peek(&self, token: &str) -> Result<TokenInfo> {
        let now = self.clock.now();
        let cached = self.cached_info(token).await;

        let Some(record) = bounded("find token", self.timeout, self.store.find_token(token)).await?
        else {
            if cached.is_some() {
                debug!("dropping cache entry of a consumed token");
                self.unindex(token).await;
            }
            return Err(Error::not_found("verification token", redact(token)));
        };
        if record.is_expired(now) {
            return Err(Error::Expired {
                expired_at: record.expires_at,
            });
        }

        let info = TokenInfo::from(&record);
        if cached.as_ref().is_some_and(|entry| *entry != info) {
            warn!(user_id = %info.user_id, "cache entry disagrees with durable record");
        }
        Ok(info)
    }

    async fn cached_info(&self, token: &str) -> Option<TokenInfo> {
        match bounded("cache get", self.timeout, self.cache.get(&cache_key(token))).await {
            Ok(Some(raw)) => match serde_json::from_str::<TokenInfo>(&raw) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!(error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "cache lookup failed");
                None
            }
        }
    }

    /// Purges durable records issued more than the retention window ago.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<u64> {
        let out_of_range =
            || Error::Configuration(format!("token retention out of range: {:?}", self.retention));
        let retention = chrono::Duration::from_std(self.retention).map_err(|_| out_of_range())?;
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .ok_or_else(out_of_range)?;
        let purged = bounded(
            "purge tokens",
            self.timeout,
            self.store.purge_tokens_issued_before(cutoff),
        )
        .await?;
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "swept verification tokens");
        }
        Ok(purged)
    }

    /// Runs [`Self::sweep`] every `every` until the returned handle is aborted.
    pub fn spawn_retention_sweep(self: Arc<Self>, every: Duration) -> JoinHandle<()>
    where
        S: 'static,
        C: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep().await {
                    warn!(error = %err, "retention sweep failed");
                }
            }
        })
    }

    async fn index(&self, token: &str, info: &TokenInfo, ttl: Duration) {
        let ttl = ttl.min(self.retention);
        if ttl.is_zero() {
            return;
        }
        let value = match serde_json::to_string(info) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = bounded(
            "cache set",
            self.timeout,
            self.cache.set(&cache_key(token), value, ttl),
        )
        .await
        {
            warn!(error = %err, "token cache write failed");
        }
    }

    async fn unindex(&self, token: &str) {
        if let Err(err) = bounded("cache remove", self.timeout, self.cache.remove(&cache_key(token))).await
        {
            warn!(error = %err, "token cache removal failed");
        }
    }
}

fn cache_key(token: &str) -> String {
    format!("{CACHE_PREFIX}{token}")
}

/// Keeps token strings out of error messages and logs.
fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}…")
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
