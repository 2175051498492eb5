//! Discovery attribute resolver
//!
//! Answers "which organization does this input identify" during sign-up and
//! sign-in, and manages the discovery configuration of the primary
//! organization.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use org_core::{with_retry, CacheStats, OrgError, OrgResult, OrganizationTree, ReadThroughCache, RetryConfig};
use org_events::{publish_best_effort, DiscoveryEvent, EventBus};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::attribute::{email_domain, normalize_attributes, AttributeKey, DiscoveryAttribute, EMAIL_DOMAIN};
use crate::properties::{DiscoveryConfig, DiscoveryParam, EMAIL_DOMAIN_ENABLE, EMAIL_DOMAIN_SELF_SIGNUP_ENABLE};
use crate::store::DiscoveryStore;

/// Organization discovery resolver.
///
/// Attribute lookups go through a read-through cache keyed by
/// [`AttributeKey`]; writes invalidate the affected keys before returning.
///
/// # Examples
///
/// ```rust,no_run
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
/// use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
/// use org_discovery::{DiscoveryParam, DiscoveryResolver, MemoryDiscoveryStore};
///
/// async fn example() -> org_core::OrgResult<()> {
///     let orgs = Arc::new(MemoryOrganizationStore::new());
///     let root = Organization::root("Super", "super");
///     orgs.insert(root.clone()).await?;
///
///     let config = HierarchyConfig::default().with_primary_organization(root.id);
///     let tree = Arc::new(OrganizationTree::new(orgs, config));
///     let discovery = DiscoveryResolver::new(tree, Arc::new(MemoryDiscoveryStore::new()));
///
///     assert_eq!(discovery.resolve_default_discovery_param().await?, DiscoveryParam::Org);
///
///     let properties = BTreeMap::from([("default-param".to_string(), "orgName".to_string())]);
///     discovery.set_discovery_config(root.id, properties).await?;
///     assert_eq!(discovery.resolve_default_discovery_param().await?, DiscoveryParam::OrgName);
///     Ok(())
/// }
/// ```
pub struct DiscoveryResolver {
    tree: Arc<OrganizationTree>,
    store: Arc<dyn DiscoveryStore>,
    lookups: ReadThroughCache<AttributeKey, BTreeSet<Uuid>>,
    events: Option<Arc<dyn EventBus>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for DiscoveryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResolver")
            .field("primary_organization_id", &self.tree.primary_organization_id())
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl DiscoveryResolver {
    /// Create a resolver over a tree index and a discovery store.
    pub fn new(tree: Arc<OrganizationTree>, store: Arc<dyn DiscoveryStore>) -> Self {
        let config = tree.config();
        Self {
            lookups: ReadThroughCache::new(&config.cache),
            retry: config.retry_config(),
            events: None,
            tree,
            store,
        }
    }

    /// Publish discovery changes on an event bus.
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Create the discovery configuration of the primary organization.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the organization is unknown
    /// * `Forbidden` - the organization is not the configured primary
    ///   organization, or none is configured
    /// * `Validation` - unsupported key or value
    /// * `Conflict` - a configuration already exists
    #[instrument(level = "debug", skip(self, properties))]
    pub async fn set_discovery_config(
        &self,
        organization_id: Uuid,
        properties: BTreeMap<String, String>,
    ) -> OrgResult<DiscoveryConfig> {
        self.ensure_primary(organization_id).await?;
        let config = DiscoveryConfig::new(organization_id, properties)?;

        self.store
            .create_config(config.clone())
            .await
            .map_err(|e| log_store_failure("create_config", &organization_id, e))?;

        tracing::info!(organization_id = %organization_id, "Discovery configuration created");
        self.emit(DiscoveryEvent::ConfigCreated { org_id: organization_id }).await;
        Ok(config)
    }

    /// Replace the discovery configuration of the primary organization.
    ///
    /// # Errors
    ///
    /// As [`DiscoveryResolver::set_discovery_config`], with `NotFound`
    /// instead of `Conflict` when no configuration exists.
    #[instrument(level = "debug", skip(self, properties))]
    pub async fn update_discovery_config(
        &self,
        organization_id: Uuid,
        properties: BTreeMap<String, String>,
    ) -> OrgResult<DiscoveryConfig> {
        self.ensure_primary(organization_id).await?;
        let config = DiscoveryConfig::new(organization_id, properties)?;

        let previous = self
            .store
            .replace_config(config.clone())
            .await
            .map_err(|e| log_store_failure("replace_config", &organization_id, e))?;

        tracing::info!(organization_id = %organization_id, "Discovery configuration updated");
        self.emit(DiscoveryEvent::ConfigUpdated { org_id: organization_id }).await;
        Ok(DiscoveryConfig {
            created_at: previous.created_at,
            ..config
        })
    }

    /// Delete the discovery configuration of the primary organization.
    ///
    /// # Errors
    ///
    /// `Forbidden` for any other organization, `NotFound` when no
    /// configuration exists.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_discovery_config(&self, organization_id: Uuid) -> OrgResult<DiscoveryConfig> {
        self.ensure_primary(organization_id).await?;

        let removed = self
            .store
            .delete_config(organization_id)
            .await
            .map_err(|e| log_store_failure("delete_config", &organization_id, e))?
            .ok_or_else(|| OrgError::not_found("discovery configuration", organization_id))?;

        tracing::info!(organization_id = %organization_id, "Discovery configuration deleted");
        self.emit(DiscoveryEvent::ConfigDeleted { org_id: organization_id }).await;
        Ok(removed)
    }

    /// Discovery configuration of an organization.
    ///
    /// # Errors
    ///
    /// `NotFound` when the organization has no configuration.
    pub async fn get_discovery_config(&self, organization_id: Uuid) -> OrgResult<DiscoveryConfig> {
        self.load_config(organization_id)
            .await?
            .ok_or_else(|| OrgError::not_found("discovery configuration", organization_id))
    }

    /// Default discovery parameter of the deployment.
    ///
    /// Read from the configured primary organization. Falls back to
    /// [`DiscoveryParam::Org`] when no primary organization is configured,
    /// it has no configuration, or the configuration has no
    /// `default-param`. Store failures are retried, then propagated.
    pub async fn resolve_default_discovery_param(&self) -> OrgResult<DiscoveryParam> {
        match self.tree.primary_organization_id() {
            Some(primary) => self.default_param_of(primary).await,
            None => Ok(DiscoveryParam::Org),
        }
    }

    /// Default discovery parameter for the tree `organization_id` belongs to.
    ///
    /// Only the primary organization holds configuration, so organizations
    /// outside its tree resolve to [`DiscoveryParam::Org`].
    ///
    /// # Errors
    ///
    /// `NotFound` when the organization is unknown.
    pub async fn resolve_default_discovery_param_for(&self, organization_id: Uuid) -> OrgResult<DiscoveryParam> {
        let root = self.tree.root_of(organization_id).await?;
        if self.tree.primary_organization_id() != Some(root) {
            return Ok(DiscoveryParam::Org);
        }
        self.default_param_of(root).await
    }

    /// Whether email-domain discovery is enabled for the deployment.
    pub async fn is_email_domain_discovery_enabled(&self) -> OrgResult<bool> {
        Ok(self
            .primary_config()
            .await?
            .is_some_and(|config| config.is_enabled(EMAIL_DOMAIN_ENABLE)))
    }

    /// Whether email-domain based self sign-up is enabled for the deployment.
    pub async fn is_self_signup_enabled(&self) -> OrgResult<bool> {
        Ok(self.primary_config().await?.is_some_and(|config| {
            config.is_enabled(EMAIL_DOMAIN_ENABLE) && config.is_enabled(EMAIL_DOMAIN_SELF_SIGNUP_ENABLE)
        }))
    }

    /// Replace the discovery attributes of an organization.
    ///
    /// Returns the normalized attributes as stored.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the organization is unknown
    /// * `Validation` - unsupported type, duplicate type, empty or invalid values
    /// * `Conflict` - a value is already used by another organization under
    ///   the same root
    #[instrument(level = "debug", skip(self, attributes))]
    pub async fn set_discovery_attributes(
        &self,
        organization_id: Uuid,
        attributes: Vec<DiscoveryAttribute>,
    ) -> OrgResult<Vec<DiscoveryAttribute>> {
        let attributes = normalize_attributes(attributes)?;
        let root = self.tree.root_of(organization_id).await?;

        let previous = self
            .store
            .replace_attributes(organization_id, root, attributes.clone())
            .await
            .map_err(|e| log_store_failure("replace_attributes", &organization_id, e))?;
        self.invalidate(previous.iter().chain(attributes.iter())).await;

        tracing::info!(
            organization_id = %organization_id,
            values = attributes.iter().map(|a| a.values.len()).sum::<usize>(),
            "Discovery attributes set"
        );
        self.emit(DiscoveryEvent::AttributesUpdated {
            org_id: organization_id,
            attribute_types: attributes.iter().map(|a| a.attribute_type.clone()).collect(),
        })
        .await;
        Ok(attributes)
    }

    /// Discovery attributes of an organization.
    ///
    /// # Errors
    ///
    /// `NotFound` when the organization is unknown.
    pub async fn get_discovery_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>> {
        self.tree.get_organization(organization_id).await?;
        with_retry(&self.retry, "get_attributes", || self.store.get_attributes(organization_id)).await
    }

    /// Delete the discovery attributes of an organization, returning them.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_discovery_attributes(&self, organization_id: Uuid) -> OrgResult<Vec<DiscoveryAttribute>> {
        let removed = self
            .store
            .delete_attributes(organization_id)
            .await
            .map_err(|e| log_store_failure("delete_attributes", &organization_id, e))?;
        self.invalidate(removed.iter()).await;

        if !removed.is_empty() {
            tracing::info!(organization_id = %organization_id, "Discovery attributes deleted");
            self.emit(DiscoveryEvent::AttributesDeleted { org_id: organization_id })
                .await;
        }
        Ok(removed)
    }

    /// Whether no organization under `root_id` holds an attribute value yet.
    pub async fn is_discovery_attribute_available(
        &self,
        root_id: Uuid,
        attribute_type: &str,
        value: &str,
    ) -> OrgResult<bool> {
        Ok(self
            .holders_under_root(root_id, attribute_type, value)
            .await?
            .is_empty())
    }

    /// Organizations holding an attribute value, across every tree.
    ///
    /// An empty set when nothing matches.
    ///
    /// # Errors
    ///
    /// `Validation` for an unsupported attribute type.
    #[instrument(level = "debug", skip(self))]
    pub async fn find_organizations_by_attribute(
        &self,
        attribute_type: &str,
        value: &str,
    ) -> OrgResult<BTreeSet<Uuid>> {
        let key = AttributeKey::normalized(attribute_type, value)?;
        if let Some(found) = self.lookups.get(&key).await {
            return Ok(found);
        }

        let generation = self.lookups.generation().await;
        let found = with_retry(&self.retry, "find_organizations", || self.store.find_organizations(&key))
            .await
            .map_err(|e| log_store_failure("find_organizations", &key, e))?;

        self.lookups.insert_if_current(key, found.clone(), generation).await;
        Ok(found)
    }

    /// Organization under the primary organization matching an email's domain.
    ///
    /// `None` when no primary organization is configured, email-domain
    /// discovery is disabled, or no organization holds the domain.
    ///
    /// # Errors
    ///
    /// `Validation` when `email` is not an email address.
    #[instrument(level = "debug", skip(self, email))]
    pub async fn discover_organization_by_email(&self, email: &str) -> OrgResult<Option<Uuid>> {
        let domain = email_domain(email)?;
        let Some(primary) = self.tree.primary_organization_id() else {
            return Ok(None);
        };
        if !self.is_email_domain_discovery_enabled().await? {
            debug!("Email domain discovery is disabled");
            return Ok(None);
        }

        let found = self.holders_under_root(primary, EMAIL_DOMAIN, &domain).await?;
        Ok(found.into_iter().next())
    }

    /// Drop discovery state of a deleted organization.
    ///
    /// Removes its attributes and, for a root, its configuration.
    #[instrument(level = "debug", skip(self))]
    pub async fn organization_deleted(&self, organization_id: Uuid) -> OrgResult<()> {
        self.delete_discovery_attributes(organization_id).await?;
        let removed = self
            .store
            .delete_config(organization_id)
            .await
            .map_err(|e| log_store_failure("delete_config", &organization_id, e))?;
        if removed.is_some() {
            self.emit(DiscoveryEvent::ConfigDeleted { org_id: organization_id }).await;
        }
        Ok(())
    }

    /// Attribute lookup cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.lookups.stats().await
    }

    async fn ensure_primary(&self, organization_id: Uuid) -> OrgResult<()> {
        if self.tree.is_primary_organization(organization_id).await? {
            return Ok(());
        }
        let reason = match self.tree.primary_organization_id() {
            Some(primary) => format!(
                "only the primary organization {} can manage discovery configuration, not {}",
                primary, organization_id
            ),
            None => "no primary organization is configured; discovery configuration is read-only".to_string(),
        };
        Err(OrgError::Forbidden(reason))
    }

    async fn load_config(&self, organization_id: Uuid) -> OrgResult<Option<DiscoveryConfig>> {
        with_retry(&self.retry, "get_config", || self.store.get_config(organization_id))
            .await
            .map_err(|e| log_store_failure("get_config", &organization_id, e))
    }

    async fn primary_config(&self) -> OrgResult<Option<DiscoveryConfig>> {
        match self.tree.primary_organization_id() {
            Some(primary) => self.load_config(primary).await,
            None => Ok(None),
        }
    }

    async fn default_param_of(&self, organization_id: Uuid) -> OrgResult<DiscoveryParam> {
        let param = self
            .load_config(organization_id)
            .await?
            .and_then(|config| config.default_param());
        Ok(param.unwrap_or(DiscoveryParam::Org))
    }

    async fn holders_under_root(&self, root_id: Uuid, attribute_type: &str, value: &str) -> OrgResult<BTreeSet<Uuid>> {
        let mut under_root = BTreeSet::new();
        for holder in self.find_organizations_by_attribute(attribute_type, value).await? {
            match self.tree.root_of(holder).await {
                Ok(root) if root == root_id => {
                    under_root.insert(holder);
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(organization_id = %holder, "Ignoring attribute of deleted organization");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(under_root)
    }

    async fn invalidate<'a>(&self, attributes: impl Iterator<Item = &'a DiscoveryAttribute>) {
        let keys: BTreeSet<AttributeKey> = attributes.flat_map(|attribute| attribute.keys()).collect();
        self.lookups.invalidate_where(|key, _| keys.contains(key)).await;
        debug!(keys = keys.len(), "Invalidated discovery lookups");
    }

    async fn emit(&self, event: DiscoveryEvent) {
        if let Some(events) = &self.events {
            publish_best_effort(events.as_ref(), event.to_event()).await;
        }
    }
}

fn log_store_failure(operation: &'static str, id: &dyn std::fmt::Display, error: OrgError) -> OrgError {
    if error.is_server_error() {
        tracing::error!(operation, id = %id, error = %error, "Discovery store failed");
    }
    error
}
