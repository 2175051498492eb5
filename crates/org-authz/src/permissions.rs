//! # Permission Sets
//!
//! The permissions a user holds within one organization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::path::PermissionPath;

/// A set of permission paths held by a user in an organization.
///
/// # Example
///
/// ```
/// use org_authz::{PermissionPath, PermissionSet};
///
/// let set = PermissionSet::from_strings(&["/permission/admin/manage"]);
/// let required = PermissionPath::parse("/permission/admin/manage/users/create").unwrap();
///
/// assert!(set.grants(&required));
/// assert!(!set.grants(&PermissionPath::parse("/permission/admin").unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    paths: BTreeSet<PermissionPath>,
}

impl PermissionSet {
    /// Create an empty permission set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path. Returns `true` if it was not already present.
    pub fn add(&mut self, path: PermissionPath) -> bool {
        self.paths.insert(path)
    }

    /// Add several paths.
    pub fn add_all(&mut self, paths: impl IntoIterator<Item = PermissionPath>) {
        self.paths.extend(paths);
    }

    /// Remove a path. Returns `true` if it was present.
    ///
    /// Nested paths held separately are left alone.
    pub fn remove(&mut self, path: &PermissionPath) -> bool {
        self.paths.remove(path)
    }

    /// Check whether the exact path is held.
    pub fn contains(&self, path: &PermissionPath) -> bool {
        self.paths.contains(path)
    }

    /// Check whether the set grants `required`.
    ///
    /// True when the set holds `required` or one of its prefixes.
    pub fn grants(&self, required: &PermissionPath) -> bool {
        required.prefix_reductions().any(|prefix| self.paths.contains(&prefix))
    }

    /// Check whether every path in `required` is granted.
    pub fn grants_all<'a>(&self, required: impl IntoIterator<Item = &'a PermissionPath>) -> bool {
        required.into_iter().all(|path| self.grants(path))
    }

    /// Check whether any path in `required` is granted.
    pub fn grants_any<'a>(&self, required: impl IntoIterator<Item = &'a PermissionPath>) -> bool {
        required.into_iter().any(|path| self.grants(path))
    }

    /// Iterate over the held paths in order.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionPath> {
        self.paths.iter()
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: &PermissionSet) {
        self.paths.extend(other.paths.iter().cloned());
    }

    /// Build a set from strings, skipping any that do not parse.
    pub fn from_strings(paths: &[&str]) -> Self {
        paths
            .iter()
            .filter_map(|s| PermissionPath::parse(s).ok())
            .collect()
    }

    /// Number of held paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every path.
    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

impl FromIterator<PermissionPath> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PermissionPath>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a PermissionPath;
    type IntoIter = std::collections::btree_set::Iter<'a, PermissionPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
