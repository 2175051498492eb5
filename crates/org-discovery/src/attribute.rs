//! Organization discovery attributes
//!
//! Attributes are searchable properties of an organization, such as the
//! email domains its users sign in with.

use org_core::{OrgError, OrgResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute type for email domains.
pub const EMAIL_DOMAIN: &str = "emailDomain";

/// A discovery attribute: a type and its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAttribute {
    /// Attribute type (e.g. `emailDomain`)
    #[serde(rename = "type")]
    pub attribute_type: String,

    /// Ordered, de-duplicated values
    pub values: Vec<String>,
}

impl DiscoveryAttribute {
    /// Create an attribute.
    pub fn new<I, S>(attribute_type: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute_type: attribute_type.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an `emailDomain` attribute.
    pub fn email_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(EMAIL_DOMAIN, domains)
    }

    /// Index keys for every value.
    pub fn keys(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        self.values
            .iter()
            .map(move |value| AttributeKey::new(self.attribute_type.clone(), value.clone()))
    }
}

/// Lookup key for the attribute index: one (type, value) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    /// Attribute type
    pub attribute_type: String,
    /// Normalized value
    pub value: String,
}

impl AttributeKey {
    /// Create a key from already normalized parts.
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
        }
    }

    /// Normalize a user-supplied lookup.
    ///
    /// # Errors
    ///
    /// `Validation` for an unsupported type.
    pub fn normalized(attribute_type: &str, value: &str) -> OrgResult<Self> {
        ensure_supported(attribute_type)?;
        Ok(Self::new(attribute_type, normalize_value(attribute_type, value)))
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_type, self.value)
    }
}

/// Validate and normalize a full attribute set for one organization.
///
/// Types must be supported and unique, every attribute needs at least one
/// value, and email domains must be syntactically valid. Values are
/// lower-cased and de-duplicated keeping their first position.
///
/// # Errors
///
/// `Validation` describing the first offending attribute or value.
pub fn normalize_attributes(attributes: Vec<DiscoveryAttribute>) -> OrgResult<Vec<DiscoveryAttribute>> {
    let mut normalized: Vec<DiscoveryAttribute> = Vec::with_capacity(attributes.len());

    for attribute in attributes {
        let attribute_type = attribute.attribute_type.trim().to_string();
        ensure_supported(&attribute_type)?;
        if normalized.iter().any(|a| a.attribute_type == attribute_type) {
            return Err(OrgError::Validation(format!(
                "discovery attribute '{}' is listed twice",
                attribute_type
            )));
        }

        let mut values: Vec<String> = Vec::with_capacity(attribute.values.len());
        for value in &attribute.values {
            let value = normalize_value(&attribute_type, value);
            if attribute_type == EMAIL_DOMAIN && !is_valid_domain(&value) {
                return Err(OrgError::Validation(format!("invalid email domain '{}'", value)));
            }
            if !values.contains(&value) {
                values.push(value);
            }
        }
        if values.is_empty() {
            return Err(OrgError::Validation(format!(
                "discovery attribute '{}' needs at least one value",
                attribute_type
            )));
        }

        normalized.push(DiscoveryAttribute { attribute_type, values });
    }
    Ok(normalized)
}

/// The domain part of an email address, lower-cased.
///
/// # Errors
///
/// `Validation` when the address has no local part or an invalid domain.
pub fn email_domain(email: &str) -> OrgResult<String> {
    let (local, domain) = email
        .trim()
        .rsplit_once('@')
        .ok_or_else(|| OrgError::Validation(format!("'{}' is not an email address", email)))?;
    let domain = domain.to_ascii_lowercase();
    if local.is_empty() || !is_valid_domain(&domain) {
        return Err(OrgError::Validation(format!("'{}' is not an email address", email)));
    }
    Ok(domain)
}

/// Check that `domain` is a dotted DNS name.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn ensure_supported(attribute_type: &str) -> OrgResult<()> {
    if attribute_type == EMAIL_DOMAIN {
        Ok(())
    } else {
        Err(OrgError::Validation(format!(
            "unsupported discovery attribute type '{}'",
            attribute_type
        )))
    }
}

fn normalize_value(attribute_type: &str, value: &str) -> String {
    let value = value.trim();
    if attribute_type == EMAIL_DOMAIN {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_validation() {
        assert!(is_valid_domain("acme.com"));
        assert!(is_valid_domain("eu.acme-corp.co.uk"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("acme..com"));
        assert!(!is_valid_domain("-acme.com"));
        assert!(!is_valid_domain("acme_corp.com"));
    }

    #[test]
    fn test_normalize_lowercases_and_dedupes() {
        let attrs = normalize_attributes(vec![DiscoveryAttribute::email_domains([
            "Acme.com",
            "acme.com ",
            "acme.io",
        ])])
        .unwrap();

        assert_eq!(attrs[0].values, vec!["acme.com", "acme.io"]);
    }

    #[test]
    fn test_normalize_rejects_bad_sets() {
        let cases = vec![
            vec![DiscoveryAttribute::new("phoneNumber", ["123"])],
            vec![DiscoveryAttribute::email_domains(Vec::<String>::new())],
            vec![DiscoveryAttribute::email_domains(["not a domain"])],
            vec![
                DiscoveryAttribute::email_domains(["a.com"]),
                DiscoveryAttribute::email_domains(["b.com"]),
            ],
        ];
        for attributes in cases {
            assert!(matches!(
                normalize_attributes(attributes),
                Err(OrgError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("Jane.Doe@Acme.COM").unwrap(), "acme.com");
        assert!(email_domain("acme.com").is_err());
        assert!(email_domain("@acme.com").is_err());
        assert!(email_domain("jane@").is_err());
    }

    #[test]
    fn test_attribute_serializes_type_field() {
        let json = serde_json::to_value(DiscoveryAttribute::email_domains(["acme.com"])).unwrap();
        assert_eq!(json["type"], "emailDomain");
        assert_eq!(json["values"][0], "acme.com");
    }
}
