use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 50;

fn validate_simple_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(Error::Validation(format!(
            "{kind} contains invalid characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_allowed_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

/// Unique role name such as `admin` or `user`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Creates a validated role name.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        validate_simple_name(value.as_ref(), "role name").map(Self)
    }

    /// Creates a role name from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for RoleName {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

macro_rules! define_uuid_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self> {
                Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|err| Error::Validation(format!("invalid {}: {err}", $kind)))
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

define_uuid_type!(
    /// User identifier.
    UserId,
    "user id"
);
define_uuid_type!(
    /// Role identifier.
    RoleId,
    "role id"
);

/// What a verification token is for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// Proves ownership of the registered email address.
    ConfirmEmail,
    /// Authorizes replacing the stored password hash.
    ResetPassword,
}

impl Purpose {
    /// Returns the wire name (`confirm-email` or `reset-password`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmEmail => "confirm-email",
            Self::ResetPassword => "reset-password",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "confirm-email" => Ok(Self::ConfirmEmail),
            "reset-password" => Ok(Self::ResetPassword),
            other => Err(Error::Validation(format!(
                "unknown verification purpose: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_trims_input() {
        let role = RoleName::try_from("  admin ").expect("role name");
        assert_eq!(role.as_str(), "admin");
    }

    #[test]
    fn role_name_rejects_empty_and_invalid_chars() {
        assert!(matches!(RoleName::new("   "), Err(Error::Validation(_))));
        let err = RoleName::new("ad min").expect_err("must reject");
        assert!(err.to_string().contains("role name"));
    }

    #[test]
    fn user_id_parses_from_string() {
        let id = UserId::generate();
        let parsed: UserId = id.to_string().parse().expect("user id");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn purpose_uses_kebab_case_names() {
        assert_eq!(Purpose::ConfirmEmail.to_string(), "confirm-email");
        assert_eq!(
            "reset-password".parse::<Purpose>().expect("purpose"),
            Purpose::ResetPassword
        );
        let json = serde_json::to_string(&Purpose::ResetPassword).expect("json");
        assert_eq!(json, r#""reset-password""#);
    }
}
