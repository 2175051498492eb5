//! Organization user association models
//!
//! A real user lives in a resident organization. When their access is
//! propagated to a descendant organization, a distinct shared-user identity
//! is minted there and linked back to the real identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Uniqueness key of an association: at most one shared user exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationKey {
    /// Real user identity
    pub real_user_id: Uuid,
    /// Organization the real identity lives in
    pub resident_organization_id: Uuid,
    /// Descendant organization the shared identity lives in
    pub sub_organization_id: Uuid,
}

impl AssociationKey {
    /// Create a new association key.
    pub fn new(real_user_id: Uuid, resident_organization_id: Uuid, sub_organization_id: Uuid) -> Self {
        Self {
            real_user_id,
            resident_organization_id,
            sub_organization_id,
        }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}->{}",
            self.real_user_id, self.resident_organization_id, self.sub_organization_id
        )
    }
}

/// Link between a real user and the shared user minted for a sub-organization.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use org_sharing::{AssociationKey, OrganizationUserAssociation};
///
/// let key = AssociationKey::new(Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
/// let association = OrganizationUserAssociation::mint(key);
/// assert_eq!(association.key(), key);
/// assert_ne!(association.shared_user_id, key.real_user_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationUserAssociation {
    /// Real user identity
    pub real_user_id: Uuid,

    /// Organization the real identity lives in
    pub resident_organization_id: Uuid,

    /// Identity minted for the sub-organization
    pub shared_user_id: Uuid,

    /// Descendant organization the shared identity lives in
    pub sub_organization_id: Uuid,

    /// When the association was created
    pub created_at: DateTime<Utc>,
}

impl OrganizationUserAssociation {
    /// Mint a fresh shared-user identity for the key.
    pub fn mint(key: AssociationKey) -> Self {
        Self {
            real_user_id: key.real_user_id,
            resident_organization_id: key.resident_organization_id,
            shared_user_id: Uuid::now_v7(),
            sub_organization_id: key.sub_organization_id,
            created_at: Utc::now(),
        }
    }

    /// The uniqueness key of this association.
    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(
            self.real_user_id,
            self.resident_organization_id,
            self.sub_organization_id,
        )
    }
}
