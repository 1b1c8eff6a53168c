//! Runtime configuration.
//!
//! [`AuthConfig::from_env`] reads:
//!
//! - `SECRET_KEY`: bearer-token signing secret (required)
//! - `DEFAULT_ROLE`: role given to new registrations (default: `user`)
//! - `CONFIRMATION_TOKEN_TTL_SECS`: email confirmation lifetime (default: 86400)
//! - `RESET_TOKEN_TTL_SECS`: password reset lifetime (default: 86400)
//! - `TOKEN_RETENTION_SECS`: age after which records are swept (default: 86400)
//! - `STORE_TIMEOUT_MS`: per-call deadline for store, cache and notifier (default: 5000)

use crate::error::{Error, Result};
use crate::types::RoleName;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings shared by the issuer, token store and service.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens.
    pub signing_secret: String,
    /// Role assigned at registration.
    pub default_role: RoleName,
    /// Lifetime of email-confirmation tokens.
    pub confirmation_ttl: Duration,
    /// Lifetime of password-reset tokens.
    pub reset_ttl: Duration,
    /// Age after which durable token records are purged regardless of state.
    pub token_retention: Duration,
    /// Deadline applied to every store, cache and notifier call.
    pub operation_timeout: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_secret", &"<redacted>")
            .field("default_role", &self.default_role)
            .field("confirmation_ttl", &self.confirmation_ttl)
            .field("reset_ttl", &self.reset_ttl)
            .field("token_retention", &self.token_retention)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl AuthConfig {
    /// Creates a configuration with defaults and the given secret.
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            default_role: RoleName::from_string("user".to_string()),
            confirmation_ttl: DAY,
            reset_ttl: DAY,
            token_retention: DAY,
            operation_timeout: Duration::from_secs(5),
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// A missing or blank `SECRET_KEY` is a [`Error::Configuration`].
    pub fn from_env() -> Result<Self> {
        let secret = env::var("SECRET_KEY").unwrap_or_default();
        if secret.trim().is_empty() {
            return Err(Error::Configuration(
                "SECRET_KEY must be set to a non-empty value".to_string(),
            ));
        }

        let mut config = Self::new(secret);
        if let Ok(role) = env::var("DEFAULT_ROLE") {
            config.default_role = RoleName::new(role)
                .map_err(|err| Error::Configuration(format!("DEFAULT_ROLE: {err}")))?;
        }
        config.confirmation_ttl =
            Duration::from_secs(parse_var("CONFIRMATION_TOKEN_TTL_SECS", DAY.as_secs())?);
        config.reset_ttl = Duration::from_secs(parse_var("RESET_TOKEN_TTL_SECS", DAY.as_secs())?);
        config.token_retention =
            Duration::from_secs(parse_var("TOKEN_RETENTION_SECS", DAY.as_secs())?);
        config.operation_timeout = Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 5_000)?);
        Ok(config)
    }

    /// Sets the default registration role.
    pub fn with_default_role(mut self, role: RoleName) -> Self {
        self.default_role = role;
        self
    }

    /// Sets the retention window for durable token records.
    pub fn with_token_retention(mut self, retention: Duration) -> Self {
        self.token_retention = retention;
        self
    }

    /// Sets the per-call deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Configuration(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_one_day_windows() {
        let config = AuthConfig::new("secret");
        assert_eq!(config.confirmation_ttl, DAY);
        assert_eq!(config.token_retention, DAY);
        assert_eq!(config.default_role.as_str(), "user");
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn parse_var_falls_back_to_default_when_unset() {
        let value: u64 = parse_var("TENANT_AUTHZ_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
