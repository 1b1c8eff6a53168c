use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Wildcard segment as stored.
pub const WILDCARD: &str = "*";

/// Wildcard segment as written in provisioning specs.
const SPEC_WILDCARD: &str = "all";

/// Permission string wrapper (`resource:action`).
///
/// Either segment may be the wildcard `*`. Wildcards are kept as written and
/// only expanded against the catalog's known permissions at resolution time.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    /// Parses and validates a single permission.
    ///
    /// This trims whitespace and normalizes to lowercase. `all` is accepted
    /// as a synonym for `*` in either segment.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::Validation(
                "permission must not be empty".to_string(),
            ));
        }
        let normalized = trimmed.to_ascii_lowercase();
        let (resource, action) = split_permission(&normalized).ok_or_else(|| {
            Error::Validation(format!(
                "permission `{trimmed}` must be in resource:action format"
            ))
        })?;
        Self::from_parts(resource, action)
    }

    /// Builds a permission from its two segments.
    pub fn from_parts(resource: &str, action: &str) -> Result<Self> {
        let resource = normalize_segment(resource);
        let action = normalize_segment(action);
        if resource.is_empty() || action.is_empty() {
            return Err(Error::Validation(
                "permission must not have empty segments".to_string(),
            ));
        }
        if !is_valid_segment(&resource) {
            return Err(Error::Validation(format!(
                "resource segment `{resource}` contains invalid characters"
            )));
        }
        if !is_valid_segment(&action) {
            return Err(Error::Validation(format!(
                "action segment `{action}` contains invalid characters"
            )));
        }
        Ok(Self(format!("{resource}:{action}")))
    }

    /// Creates a permission from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource segment.
    pub fn resource(&self) -> &str {
        split_permission(&self.0).map_or("", |(resource, _)| resource)
    }

    /// Action segment.
    pub fn action(&self) -> &str {
        split_permission(&self.0).map_or("", |(_, action)| action)
    }

    /// Returns whether either segment is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.resource() == WILDCARD || self.action() == WILDCARD
    }

    /// Returns whether this (possibly wildcard) grant covers `concrete`.
    pub fn covers(&self, concrete: &Permission) -> bool {
        let resource_ok = self.resource() == WILDCARD || self.resource() == concrete.resource();
        let action_ok = self.action() == WILDCARD || self.action() == concrete.action();
        resource_ok && action_ok
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Permission {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Parses a provisioning spec string into the permission set it denotes.
///
/// Accepted forms are `resource:action`, `resource:all` and `all:all`,
/// optionally joined with `,`. Duplicates collapse.
pub fn parse_permission_spec(spec: &str) -> Result<BTreeSet<Permission>> {
    let mut permissions = BTreeSet::new();
    for item in spec.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(Error::Validation(format!(
                "permission spec `{spec}` contains an empty entry"
            )));
        }
        permissions.insert(Permission::new(item)?);
    }
    Ok(permissions)
}

/// Expands wildcard grants against `known`, the concrete permission universe.
///
/// Concrete grants are kept as they are; a wildcard matching nothing
/// contributes nothing.
pub(crate) fn expand_grants(
    granted: &BTreeSet<Permission>,
    known: &BTreeSet<Permission>,
) -> BTreeSet<Permission> {
    let mut expanded = BTreeSet::new();
    for grant in granted {
        if grant.is_wildcard() {
            expanded.extend(
                known
                    .iter()
                    .filter(|candidate| !candidate.is_wildcard() && grant.covers(candidate))
                    .cloned(),
            );
        } else {
            expanded.insert(grant.clone());
        }
    }
    expanded
}

fn normalize_segment(segment: &str) -> String {
    let segment = segment.trim().to_ascii_lowercase();
    if segment == SPEC_WILDCARD {
        WILDCARD.to_string()
    } else {
        segment
    }
}

fn is_valid_segment(segment: &str) -> bool {
    if segment == WILDCARD {
        return true;
    }
    if segment.is_empty() {
        return false;
    }
    segment
        .chars()
        .all(|ch| matches!(ch, 'a'..='z' | '0'..='9' | '_' | '-'))
}

fn split_permission(value: &str) -> Option<(&str, &str)> {
    value.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(value: &str) -> Permission {
        Permission::try_from(value).unwrap()
    }

    #[test]
    fn try_from_should_trim_and_lowercase() {
        let permission = Permission::try_from(" Reports:Read ").unwrap();
        assert_eq!(permission.as_str(), "reports:read");
        assert_eq!(permission.resource(), "reports");
        assert_eq!(permission.action(), "read");
    }

    #[test]
    fn try_from_should_reject_missing_colon_and_empty_segments() {
        assert!(matches!(Permission::try_from("reports"), Err(Error::Validation(_))));
        assert!(matches!(Permission::try_from(":read"), Err(Error::Validation(_))));
        assert!(matches!(Permission::try_from("reports:"), Err(Error::Validation(_))));
        assert!(matches!(Permission::try_from("a:b:c"), Err(Error::Validation(_))));
    }

    #[test]
    fn all_is_stored_as_wildcard() {
        assert_eq!(perm("reports:all").as_str(), "reports:*");
        assert_eq!(perm("all:all").as_str(), "*:*");
        assert!(perm("all:all").is_wildcard());
        assert!(!perm("user:read").is_wildcard());
    }

    #[test]
    fn spec_should_accept_comma_separated_entries() {
        let parsed = parse_permission_spec("user:read, user:write,user:read").unwrap();
        let expected: BTreeSet<_> = [perm("user:read"), perm("user:write")].into();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn spec_should_reject_empty_entries() {
        assert!(matches!(parse_permission_spec(""), Err(Error::Validation(_))));
        assert!(matches!(
            parse_permission_spec("user:read,,user:write"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn resource_wildcard_expands_only_that_resource() {
        let known: BTreeSet<_> = [
            perm("reports:read"),
            perm("reports:export"),
            perm("user:read"),
        ]
        .into();
        let granted: BTreeSet<_> = [perm("reports:all")].into();

        let expanded = expand_grants(&granted, &known);
        let expected: BTreeSet<_> = [perm("reports:export"), perm("reports:read")].into();
        assert_eq!(expanded, expected);
    }

    #[test]
    fn action_wildcard_expands_across_resources() {
        let known: BTreeSet<_> = [perm("reports:read"), perm("user:read"), perm("user:write")].into();
        let granted: BTreeSet<_> = [perm("all:read")].into();

        let expanded = expand_grants(&granted, &known);
        let expected: BTreeSet<_> = [perm("reports:read"), perm("user:read")].into();
        assert_eq!(expanded, expected);
    }

    #[test]
    fn unmatched_wildcard_expands_to_nothing() {
        let known: BTreeSet<_> = [perm("user:read")].into();
        let granted: BTreeSet<_> = [perm("billing:all")].into();
        assert!(expand_grants(&granted, &known).is_empty());
    }
}
