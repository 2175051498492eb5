//! # Permission Paths
//!
//! Permissions are hierarchical paths such as `/permission/admin/manage`.
//! A path implies every path nested under it.

use org_core::{OrgError, OrgResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// A root-anchored permission path.
///
/// Paths are parsed once into segments; prefix checks compare segments, so
/// `/a/bc` never implies `/a/b` and vice versa.
///
/// # Example
///
/// ```
/// use org_authz::PermissionPath;
///
/// let admin = PermissionPath::parse("/permission/admin").unwrap();
/// let users = PermissionPath::parse("permission/admin/manage/users").unwrap();
///
/// assert!(admin.implies(&users));
/// assert!(!users.implies(&admin));
/// assert_eq!(users.to_string(), "/permission/admin/manage/users");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionPath {
    segments: Vec<String>,
}

impl PermissionPath {
    /// Parse a path.
    ///
    /// A single leading separator is optional.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty path or an empty segment (`a//b`, `a/`).
    pub fn parse(s: &str) -> OrgResult<Self> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix(SEPARATOR).unwrap_or(trimmed);
        if body.is_empty() {
            return Err(OrgError::Validation("permission path must not be empty".to_string()));
        }

        let segments: Vec<String> = body.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(OrgError::Validation(format!(
                "permission path '{}' has an empty segment",
                s
            )));
        }
        Ok(Self { segments })
    }

    /// Segments from the root down.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; a parsed path has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path one level up, `None` for a single-segment path.
    pub fn parent(&self) -> Option<PermissionPath> {
        (self.segments.len() > 1).then(|| PermissionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Extend the path by one segment.
    ///
    /// # Errors
    ///
    /// `Validation` when the segment is empty or contains the separator.
    pub fn child(&self, segment: &str) -> OrgResult<PermissionPath> {
        if segment.trim().is_empty() || segment.contains(SEPARATOR) {
            return Err(OrgError::Validation(format!("invalid permission segment '{}'", segment)));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(PermissionPath { segments })
    }

    /// Check whether holding `self` grants `other`.
    ///
    /// True when `self` is `other` or one of its ancestors.
    pub fn implies(&self, other: &PermissionPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Every path that implies `self`: `self` first, then each shorter
    /// root-anchored prefix down to the first segment.
    ///
    /// # Example
    ///
    /// ```
    /// use org_authz::PermissionPath;
    ///
    /// let path = PermissionPath::parse("/a/b/c").unwrap();
    /// let reductions: Vec<String> = path.prefix_reductions().map(|p| p.to_string()).collect();
    /// assert_eq!(reductions, vec!["/a/b/c", "/a/b", "/a"]);
    /// ```
    pub fn prefix_reductions(&self) -> impl Iterator<Item = PermissionPath> + '_ {
        (1..=self.segments.len()).rev().map(move |len| PermissionPath {
            segments: self.segments[..len].to_vec(),
        })
    }
}

impl fmt::Display for PermissionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{}{}", SEPARATOR, segment)?;
        }
        Ok(())
    }
}

impl FromStr for PermissionPath {
    type Err = OrgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PermissionPath {
    type Error = OrgError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionPath> for String {
    fn from(path: PermissionPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_leading_separator() {
        let a = PermissionPath::parse("/permission/admin").unwrap();
        let b = PermissionPath::parse("permission/admin").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "/permission/admin");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for bad in ["", "/", "a//b", "a/", "//a", "a/ /b"] {
            assert!(
                matches!(PermissionPath::parse(bad), Err(OrgError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_implies_compares_segments() {
        let ab = PermissionPath::parse("/a/b").unwrap();
        let abc = PermissionPath::parse("/a/bc").unwrap();
        let ab_c = PermissionPath::parse("/a/b/c").unwrap();

        assert!(ab.implies(&ab));
        assert!(ab.implies(&ab_c));
        assert!(!ab.implies(&abc));
        assert!(!ab_c.implies(&ab));
    }

    #[test]
    fn test_prefix_reductions_of_single_segment() {
        let root = PermissionPath::parse("/permission").unwrap();
        let reductions: Vec<PermissionPath> = root.prefix_reductions().collect();
        assert_eq!(reductions, vec![root.clone()]);
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_child_and_parent() {
        let admin = PermissionPath::parse("/permission/admin").unwrap();
        let manage = admin.child("manage").unwrap();
        assert_eq!(manage.parent(), Some(admin.clone()));
        assert!(admin.child("a/b").is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let path = PermissionPath::parse("/permission/admin").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/permission/admin\"");
        let decoded: PermissionPath = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, path);
        assert!(serde_json::from_str::<PermissionPath>("\"a//b\"").is_err());
    }
}
