//! Organization discovery configuration
//!
//! Discovery configuration is a small key/value set owned by a root
//! organization. Keys and values are validated against a fixed vocabulary.

use chrono::{DateTime, Utc};
use org_core::{OrgError, OrgResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Enables email-domain based organization discovery.
pub const EMAIL_DOMAIN_ENABLE: &str = "email-domain-enable";

/// Enables self sign-up into the organization matched by email domain.
pub const EMAIL_DOMAIN_SELF_SIGNUP_ENABLE: &str = "email-domain-based-self-signup-enable";

/// Selects which organization parameter users supply during discovery.
pub const DEFAULT_PARAM: &str = "default-param";

/// Every supported property key.
pub const SUPPORTED_KEYS: [&str; 3] = [EMAIL_DOMAIN_ENABLE, EMAIL_DOMAIN_SELF_SIGNUP_ENABLE, DEFAULT_PARAM];

/// Parameter a user identifies their organization with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryParam {
    /// The organization handle
    #[serde(rename = "orgHandle")]
    OrgHandle,
    /// The organization name
    #[serde(rename = "orgName")]
    OrgName,
    /// Deployment default when nothing is configured
    #[serde(rename = "org")]
    Org,
}

impl DiscoveryParam {
    /// Get the string representation of the parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryParam::OrgHandle => "orgHandle",
            DiscoveryParam::OrgName => "orgName",
            DiscoveryParam::Org => "org",
        }
    }

    /// Parse a configurable parameter.
    ///
    /// Only `orgHandle` and `orgName` can be configured; `org` is the
    /// fallback and is rejected here.
    pub fn parse_configurable(s: &str) -> Option<Self> {
        match s {
            "orgHandle" => Some(DiscoveryParam::OrgHandle),
            "orgName" => Some(DiscoveryParam::OrgName),
            _ => None,
        }
    }
}

impl fmt::Display for DiscoveryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovery configuration of an organization.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use uuid::Uuid;
/// use org_discovery::{DiscoveryConfig, DiscoveryParam};
///
/// let properties = BTreeMap::from([
///     ("email-domain-enable".to_string(), "TRUE".to_string()),
///     ("default-param".to_string(), "orgHandle".to_string()),
/// ]);
/// let config = DiscoveryConfig::new(Uuid::now_v7(), properties).unwrap();
///
/// assert!(config.is_enabled("email-domain-enable"));
/// assert_eq!(config.default_param(), Some(DiscoveryParam::OrgHandle));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Organization the configuration belongs to
    pub organization_id: Uuid,

    /// Normalized properties
    pub properties: BTreeMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryConfig {
    /// Validate and normalize properties into a configuration.
    ///
    /// # Errors
    ///
    /// `Validation` when the set is empty, a key is unsupported, a flag is
    /// not `true`/`false`, `default-param` is not `orgHandle`/`orgName`, or
    /// self sign-up is enabled without email-domain discovery.
    pub fn new(organization_id: Uuid, properties: BTreeMap<String, String>) -> OrgResult<Self> {
        let properties = normalize_properties(properties)?;
        let now = Utc::now();
        Ok(Self {
            organization_id,
            properties,
            created_at: now,
            updated_at: now,
        })
    }

    /// Raw value of a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether a boolean property is set to `true`.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    /// The configured default parameter, if any.
    pub fn default_param(&self) -> Option<DiscoveryParam> {
        self.get(DEFAULT_PARAM).and_then(DiscoveryParam::parse_configurable)
    }
}

fn normalize_properties(properties: BTreeMap<String, String>) -> OrgResult<BTreeMap<String, String>> {
    if properties.is_empty() {
        return Err(OrgError::Validation(
            "discovery configuration needs at least one property".to_string(),
        ));
    }

    let mut normalized = BTreeMap::new();
    for (key, value) in properties {
        let key = key.trim().to_string();
        let value = value.trim();
        let value = match key.as_str() {
            EMAIL_DOMAIN_ENABLE | EMAIL_DOMAIN_SELF_SIGNUP_ENABLE => {
                if value.eq_ignore_ascii_case("true") {
                    "true".to_string()
                } else if value.eq_ignore_ascii_case("false") {
                    "false".to_string()
                } else {
                    return Err(OrgError::Validation(format!(
                        "{} must be true or false, got '{}'",
                        key, value
                    )));
                }
            }
            DEFAULT_PARAM => match DiscoveryParam::parse_configurable(value) {
                Some(param) => param.as_str().to_string(),
                None => {
                    return Err(OrgError::Validation(format!(
                        "{} must be orgHandle or orgName, got '{}'",
                        DEFAULT_PARAM, value
                    )))
                }
            },
            _ => {
                return Err(OrgError::Validation(format!(
                    "unsupported discovery property '{}'",
                    key
                )))
            }
        };
        normalized.insert(key, value);
    }

    let enabled = |key: &str| normalized.get(key).map(String::as_str) == Some("true");
    if enabled(EMAIL_DOMAIN_SELF_SIGNUP_ENABLE) && !enabled(EMAIL_DOMAIN_ENABLE) {
        return Err(OrgError::Validation(format!(
            "{} requires {} to be true",
            EMAIL_DOMAIN_SELF_SIGNUP_ENABLE, EMAIL_DOMAIN_ENABLE
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalizes_flags() {
        let config = DiscoveryConfig::new(
            Uuid::now_v7(),
            props(&[(EMAIL_DOMAIN_ENABLE, " True "), (EMAIL_DOMAIN_SELF_SIGNUP_ENABLE, "FALSE")]),
        )
        .unwrap();

        assert_eq!(config.get(EMAIL_DOMAIN_ENABLE), Some("true"));
        assert!(!config.is_enabled(EMAIL_DOMAIN_SELF_SIGNUP_ENABLE));
        assert_eq!(config.default_param(), None);
    }

    #[test]
    fn test_rejects_unsupported_input() {
        let cases = [
            props(&[]),
            props(&[("theme", "dark")]),
            props(&[(EMAIL_DOMAIN_ENABLE, "yes")]),
            props(&[(DEFAULT_PARAM, "invalid")]),
            props(&[(DEFAULT_PARAM, "org")]),
            props(&[(EMAIL_DOMAIN_SELF_SIGNUP_ENABLE, "true")]),
        ];
        for properties in cases {
            let err = DiscoveryConfig::new(Uuid::now_v7(), properties).unwrap_err();
            assert!(matches!(err, OrgError::Validation(_)), "{}", err);
        }
    }

    #[test]
    fn test_default_param_values() {
        for (raw, param) in [("orgHandle", DiscoveryParam::OrgHandle), ("orgName", DiscoveryParam::OrgName)] {
            let config = DiscoveryConfig::new(Uuid::now_v7(), props(&[(DEFAULT_PARAM, raw)])).unwrap();
            assert_eq!(config.default_param(), Some(param));
        }
        assert_eq!(serde_json::to_value(DiscoveryParam::Org).unwrap(), "org");
    }
}
