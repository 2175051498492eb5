//! End-to-end tests for organization discovery.
//!
//! Two trees share the deployment: Super (primary) → {Acme, Globex} and a
//! second root Other → Initech.

use std::collections::BTreeMap;
use std::sync::Arc;

use org_core::{HierarchyConfig, MemoryOrganizationStore, OrgError, Organization, OrganizationTree};
use org_discovery::{
    DiscoveryAttribute, DiscoveryParam, DiscoveryResolver, MemoryDiscoveryStore, DEFAULT_PARAM, EMAIL_DOMAIN,
    EMAIL_DOMAIN_ENABLE, EMAIL_DOMAIN_SELF_SIGNUP_ENABLE,
};
use org_events::{EventBus, MemoryEventBus};

struct Deployment {
    discovery: DiscoveryResolver,
    bus: Arc<MemoryEventBus>,
    super_org: Organization,
    acme: Organization,
    globex: Organization,
    other: Organization,
    initech: Organization,
}

impl Deployment {
    async fn new() -> Self {
        Self::with_primary(true).await
    }

    async fn with_primary(primary: bool) -> Self {
        let orgs = Arc::new(MemoryOrganizationStore::new());
        let super_org = Organization::root("Super", "super");
        let acme = Organization::child_of(&super_org, "Acme", "acme");
        let globex = Organization::child_of(&super_org, "Globex", "globex");
        let other = Organization::root("Other", "other");
        let initech = Organization::child_of(&other, "Initech", "initech");
        for org in [&super_org, &acme, &globex, &other, &initech] {
            orgs.insert(org.clone()).await.unwrap();
        }

        let mut config = HierarchyConfig::default();
        if primary {
            config = config.with_primary_organization(super_org.id);
        }
        let tree = Arc::new(OrganizationTree::new(orgs, config));
        let bus = Arc::new(MemoryEventBus::new());
        let discovery = DiscoveryResolver::new(tree, Arc::new(MemoryDiscoveryStore::new()))
            .with_events(bus.clone() as Arc<dyn EventBus>);

        Self {
            discovery,
            bus,
            super_org,
            acme,
            globex,
            other,
            initech,
        }
    }
}

fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_default_param_follows_primary_configuration() {
    let d = Deployment::new().await;
    assert_eq!(
        d.discovery.resolve_default_discovery_param().await.unwrap(),
        DiscoveryParam::Org
    );

    d.discovery
        .set_discovery_config(d.super_org.id, props(&[(DEFAULT_PARAM, "orgName")]))
        .await
        .unwrap();
    assert_eq!(
        d.discovery.resolve_default_discovery_param().await.unwrap(),
        DiscoveryParam::OrgName
    );

    // Only the primary organization's tree reads its configuration.
    assert_eq!(
        d.discovery
            .resolve_default_discovery_param_for(d.initech.id)
            .await
            .unwrap(),
        DiscoveryParam::Org
    );

    d.discovery.delete_discovery_config(d.super_org.id).await.unwrap();
    assert_eq!(
        d.discovery.resolve_default_discovery_param().await.unwrap(),
        DiscoveryParam::Org
    );
}

#[tokio::test]
async fn test_default_hierarchy_config_keeps_discovery_read_only() {
    let d = Deployment::with_primary(false).await;

    for root in [d.super_org.id, d.other.id] {
        let err = d
            .discovery
            .set_discovery_config(root, props(&[(DEFAULT_PARAM, "orgName"), (EMAIL_DOMAIN_ENABLE, "true")]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrgError::Forbidden(_)));
    }

    assert_eq!(
        d.discovery.resolve_default_discovery_param().await.unwrap(),
        DiscoveryParam::Org
    );
    assert_eq!(
        d.discovery
            .resolve_default_discovery_param_for(d.acme.id)
            .await
            .unwrap(),
        DiscoveryParam::Org
    );
    assert!(!d.discovery.is_email_domain_discovery_enabled().await.unwrap());
    assert_eq!(
        d.discovery.discover_organization_by_email("jane@acme.com").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_config_validation_and_authorization() {
    let d = Deployment::new().await;

    let forbidden = d
        .discovery
        .set_discovery_config(d.acme.id, props(&[(DEFAULT_PARAM, "orgHandle")]))
        .await
        .unwrap_err();
    assert!(matches!(forbidden, OrgError::Forbidden(_)));
    assert_eq!(forbidden.status_code(), 403);

    // A root that is not the configured primary is refused as well.
    for result in [
        d.discovery
            .set_discovery_config(d.other.id, props(&[(DEFAULT_PARAM, "orgHandle")]))
            .await,
        d.discovery
            .update_discovery_config(d.other.id, props(&[(DEFAULT_PARAM, "orgHandle")]))
            .await,
        d.discovery.delete_discovery_config(d.other.id).await,
    ] {
        assert!(matches!(result, Err(OrgError::Forbidden(_))));
    }

    let invalid = d
        .discovery
        .set_discovery_config(d.super_org.id, props(&[(DEFAULT_PARAM, "invalid")]))
        .await
        .unwrap_err();
    assert!(matches!(invalid, OrgError::Validation(_)));

    d.discovery
        .set_discovery_config(d.super_org.id, props(&[(DEFAULT_PARAM, "orgHandle")]))
        .await
        .unwrap();
    let conflict = d
        .discovery
        .set_discovery_config(d.super_org.id, props(&[(DEFAULT_PARAM, "orgName")]))
        .await
        .unwrap_err();
    assert!(matches!(conflict, OrgError::Conflict(_)));

    assert!(d
        .discovery
        .get_discovery_config(d.other.id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_email_discovery_within_primary_tree() {
    let d = Deployment::new().await;
    d.discovery
        .set_discovery_attributes(d.acme.id, vec![DiscoveryAttribute::email_domains(["acme.com"])])
        .await
        .unwrap();
    d.discovery
        .set_discovery_attributes(d.initech.id, vec![DiscoveryAttribute::email_domains(["initech.com"])])
        .await
        .unwrap();

    // Disabled until the primary organization opts in.
    assert_eq!(
        d.discovery.discover_organization_by_email("jane@acme.com").await.unwrap(),
        None
    );

    d.discovery
        .set_discovery_config(
            d.super_org.id,
            props(&[(EMAIL_DOMAIN_ENABLE, "true"), (EMAIL_DOMAIN_SELF_SIGNUP_ENABLE, "true")]),
        )
        .await
        .unwrap();
    assert!(d.discovery.is_email_domain_discovery_enabled().await.unwrap());
    assert!(d.discovery.is_self_signup_enabled().await.unwrap());

    assert_eq!(
        d.discovery.discover_organization_by_email("Jane@ACME.com").await.unwrap(),
        Some(d.acme.id)
    );
    // Initech lives under another root.
    assert_eq!(
        d.discovery.discover_organization_by_email("bob@initech.com").await.unwrap(),
        None
    );
    assert!(matches!(
        d.discovery.discover_organization_by_email("not-an-email").await,
        Err(OrgError::Validation(_))
    ));
}

#[tokio::test]
async fn test_domains_are_unique_per_tree() {
    let d = Deployment::new().await;
    d.discovery
        .set_discovery_attributes(d.acme.id, vec![DiscoveryAttribute::email_domains(["shared.com"])])
        .await
        .unwrap();

    assert!(!d
        .discovery
        .is_discovery_attribute_available(d.super_org.id, EMAIL_DOMAIN, "shared.com")
        .await
        .unwrap());
    assert!(d
        .discovery
        .is_discovery_attribute_available(d.other.id, EMAIL_DOMAIN, "shared.com")
        .await
        .unwrap());

    let conflict = d
        .discovery
        .set_discovery_attributes(d.globex.id, vec![DiscoveryAttribute::email_domains(["shared.com"])])
        .await
        .unwrap_err();
    assert!(matches!(conflict, OrgError::Conflict(_)));

    d.discovery
        .set_discovery_attributes(d.initech.id, vec![DiscoveryAttribute::email_domains(["shared.com"])])
        .await
        .unwrap();
    assert_eq!(
        d.discovery
            .find_organizations_by_attribute(EMAIL_DOMAIN, "shared.com")
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_missing_attribute_yields_empty_set() {
    let d = Deployment::new().await;
    assert!(d
        .discovery
        .find_organizations_by_attribute(EMAIL_DOMAIN, "nobody.example")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_attribute_lifecycle_and_events() {
    let d = Deployment::new().await;
    let mut sub = d.bus.subscribe("discovery.attributes.*").await.unwrap();

    let stored = d
        .discovery
        .set_discovery_attributes(d.globex.id, vec![DiscoveryAttribute::email_domains(["Globex.com"])])
        .await
        .unwrap();
    assert_eq!(stored[0].values, vec!["globex.com"]);
    assert_eq!(d.discovery.get_discovery_attributes(d.globex.id).await.unwrap(), stored);

    d.discovery.organization_deleted(d.globex.id).await.unwrap();
    assert!(d
        .discovery
        .get_discovery_attributes(d.globex.id)
        .await
        .unwrap()
        .is_empty());
    assert!(d
        .discovery
        .find_organizations_by_attribute(EMAIL_DOMAIN, "globex.com")
        .await
        .unwrap()
        .is_empty());

    assert_eq!(sub.recv().await.unwrap().topic(), "discovery.attributes.updated");
    assert_eq!(sub.recv().await.unwrap().topic(), "discovery.attributes.deleted");
}
