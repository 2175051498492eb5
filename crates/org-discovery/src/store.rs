//! Persistence boundary for discovery configuration and attributes

use async_trait::async_trait;
use org_core::{OrgError, OrgResult};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::attribute::{AttributeKey, DiscoveryAttribute};
use crate::properties::DiscoveryConfig;

/// Storage for discovery configuration and the attribute index.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Fetch the configuration of an organization.
    async fn get_config(&self, organization_id: Uuid) -> OrgResult<Option<DiscoveryConfig>>;

    /// Insert a configuration; `Conflict` when one already exists.
    async fn create_config(&self, config: DiscoveryConfig) -> OrgResult<()>;

    /// Replace an existing configuration, returning the previous one.
    ///
    /// `NotFound` when the organization has no configuration.
    async fn replace_config(&self, config: DiscoveryConfig) -> OrgResult<DiscoveryConfig>;

    /// Delete a configuration, returning what was removed.
    async fn delete_config(&self, organization_id: Uuid) -> OrgResult<Option<DiscoveryConfig>>;

    /// Attributes of an organization.
    async fn get_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>>;

    /// Replace the attributes of an organization, returning the previous set.
    ///
    /// `root_id` is the root of the organization's tree. Fails with
    /// `Conflict`, writing nothing, when another organization under the
    /// same root already holds one of the values.
    async fn replace_attributes(
        &self,
        organization_id: Uuid,
        root_id: Uuid,
        attributes: Vec<DiscoveryAttribute>,
    ) -> OrgResult<Vec<DiscoveryAttribute>>;

    /// Delete the attributes of an organization, returning the removed set.
    async fn delete_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>>;

    /// Organizations, across every root, holding an attribute value.
    async fn find_organizations(&self, key: &AttributeKey) -> OrgResult<BTreeSet<Uuid>>;
}

#[derive(Debug)]
struct OrganizationAttributes {
    root_id: Uuid,
    attributes: Vec<DiscoveryAttribute>,
}

#[derive(Debug, Default)]
struct Attributes {
    by_organization: HashMap<Uuid, OrganizationAttributes>,
    index: HashMap<AttributeKey, BTreeSet<Uuid>>,
}

impl Attributes {
    fn unindex(&mut self, organization_id: Uuid, attributes: &[DiscoveryAttribute]) {
        for key in attributes.iter().flat_map(|attribute| attribute.keys()) {
            if let Some(holders) = self.index.get_mut(&key) {
                holders.remove(&organization_id);
                if holders.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }
}

/// In-memory discovery store.
#[derive(Debug, Default)]
pub struct MemoryDiscoveryStore {
    configs: RwLock<HashMap<Uuid, DiscoveryConfig>>,
    attributes: RwLock<Attributes>,
}

impl MemoryDiscoveryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscoveryStore for MemoryDiscoveryStore {
    async fn get_config(&self, organization_id: Uuid) -> OrgResult<Option<DiscoveryConfig>> {
        Ok(self.configs.read().await.get(&organization_id).cloned())
    }

    async fn create_config(&self, config: DiscoveryConfig) -> OrgResult<()> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.organization_id) {
            return Err(OrgError::Conflict(format!(
                "discovery configuration already exists for organization {}",
                config.organization_id
            )));
        }
        configs.insert(config.organization_id, config);
        Ok(())
    }

    async fn replace_config(&self, mut config: DiscoveryConfig) -> OrgResult<DiscoveryConfig> {
        let mut configs = self.configs.write().await;
        let previous = configs
            .remove(&config.organization_id)
            .ok_or_else(|| OrgError::not_found("discovery configuration", config.organization_id))?;
        config.created_at = previous.created_at;
        configs.insert(config.organization_id, config);
        Ok(previous)
    }

    async fn delete_config(&self, organization_id: Uuid) -> OrgResult<Option<DiscoveryConfig>> {
        Ok(self.configs.write().await.remove(&organization_id))
    }

    async fn get_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>> {
        Ok(self
            .attributes
            .read()
            .await
            .by_organization
            .get(&organization_id)
            .map(|entry| entry.attributes.clone())
            .unwrap_or_default())
    }

    async fn replace_attributes(
        &self,
        organization_id: Uuid,
        root_id: Uuid,
        attributes: Vec<DiscoveryAttribute>,
    ) -> OrgResult<Vec<DiscoveryAttribute>> {
        let mut inner = self.attributes.write().await;

        for key in attributes.iter().flat_map(|attribute| attribute.keys()) {
            let taken = inner.index.get(&key).is_some_and(|holders| {
                holders.iter().any(|holder| {
                    *holder != organization_id
                        && inner
                            .by_organization
                            .get(holder)
                            .is_some_and(|entry| entry.root_id == root_id)
                })
            });
            if taken {
                return Err(OrgError::Conflict(format!(
                    "{} is already used by another organization in this hierarchy",
                    key
                )));
            }
        }

        let previous = inner
            .by_organization
            .remove(&organization_id)
            .map(|entry| entry.attributes)
            .unwrap_or_default();
        inner.unindex(organization_id, &previous);

        for key in attributes.iter().flat_map(|attribute| attribute.keys()) {
            inner.index.entry(key).or_default().insert(organization_id);
        }
        inner
            .by_organization
            .insert(organization_id, OrganizationAttributes { root_id, attributes });
        Ok(previous)
    }

    async fn delete_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>> {
        let mut inner = self.attributes.write().await;
        let removed = inner
            .by_organization
            .remove(&organization_id)
            .map(|entry| entry.attributes)
            .unwrap_or_default();
        inner.unindex(organization_id, &removed);
        Ok(removed)
    }

    async fn find_organizations(&self, key: &AttributeKey) -> OrgResult<BTreeSet<Uuid>> {
        Ok(self
            .attributes
            .read()
            .await
            .index
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}
