//! SAML metadata model and the store the context provider reads it from.
//!
//! Metadata parsing and refresh belong to whoever implements
//! [`MetadataStore`]; this module only defines the lookups the provider needs
//! and an in-memory implementation fed by the configuration file.

mod memory;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::UsageType;
use crate::security::KeyInfo;
use crate::types::{EntityAlias, EntityId, KeyName};

pub use memory::InMemoryMetadataStore;

/// SAML 2.0 protocol namespace, used to select role descriptors.
pub const SAML20P_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 metadata namespace.
pub const SAML20MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// Default maximum PKIX chain length.
pub const DEFAULT_VERIFY_DEPTH: usize = 5;

/// The role a local entity plays for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRole {
    #[serde(rename = "sp")]
    ServiceProvider,
    #[serde(rename = "idp")]
    IdentityProvider,
}

impl EntityRole {
    /// Local name of the role descriptor element.
    pub fn element_name(self) -> &'static str {
        match self {
            Self::ServiceProvider => "SPSSODescriptor",
            Self::IdentityProvider => "IDPSSODescriptor",
        }
    }

    /// Short form used in request paths and configuration.
    pub fn as_segment(self) -> &'static str {
        match self {
            Self::ServiceProvider => "sp",
            Self::IdentityProvider => "idp",
        }
    }
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", SAML20MD_NS, self.element_name())
    }
}

/// `md:KeyDescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub usage: UsageType,
    pub key_info: KeyInfo,
}

/// Role-scoped part of an entity descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDescriptor {
    pub role: EntityRole,
    pub protocol_support: Vec<String>,
    pub key_descriptors: Vec<KeyDescriptor>,
}

impl RoleDescriptor {
    /// A SAML 2.0 role descriptor without keys.
    pub fn new(role: EntityRole) -> Self {
        Self {
            role,
            protocol_support: vec![SAML20P_NS.to_string()],
            key_descriptors: Vec::new(),
        }
    }

    pub fn with_key(mut self, descriptor: KeyDescriptor) -> Self {
        self.key_descriptors.push(descriptor);
        self
    }

    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocol_support.iter().any(|p| p == protocol)
    }

    /// Key descriptors usable for `usage`.
    pub fn keys_for(&self, usage: UsageType) -> impl Iterator<Item = &KeyDescriptor> {
        self.key_descriptors
            .iter()
            .filter(move |kd| kd.usage.permits(usage))
    }
}

/// `md:EntityDescriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub entity_id: EntityId,
    pub roles: Vec<RoleDescriptor>,
}

impl EntityDescriptor {
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: RoleDescriptor) -> Self {
        self.roles.push(role);
        self
    }

    /// The first descriptor for `role` that supports `protocol`.
    pub fn role(&self, role: EntityRole, protocol: &str) -> Option<&RoleDescriptor> {
        self.roles
            .iter()
            .find(|r| r.role == role && r.supports_protocol(protocol))
    }
}

/// Local overrides that standard metadata cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedMetadata {
    /// Whether the entity is hosted by this deployment.
    pub local: bool,
    /// Alias used to address the entity in request paths.
    pub alias: Option<EntityAlias>,
    /// `"pkix"` selects certificate-chain trust; anything else explicit keys.
    pub security_profile: Option<String>,
    pub signing_key: Option<KeyName>,
    pub encryption_key: Option<KeyName>,
    /// Key-store credentials whose certificates serve as PKIX anchors; all of
    /// them when unset. Explicit-key trust does not read it.
    pub trusted_keys: Option<BTreeSet<KeyName>>,
    /// Subject names a PKIX signer certificate must carry.
    pub trusted_names: Option<BTreeSet<String>>,
    /// Maximum PKIX chain length.
    pub verify_depth: usize,
}

impl Default for ExtendedMetadata {
    fn default() -> Self {
        Self {
            local: false,
            alias: None,
            security_profile: None,
            signing_key: None,
            encryption_key: None,
            trusted_keys: None,
            trusted_names: None,
            verify_depth: DEFAULT_VERIFY_DEPTH,
        }
    }
}

impl ExtendedMetadata {
    /// Whether certificate-chain trust was requested (case-insensitive).
    pub fn is_pkix(&self) -> bool {
        self.security_profile
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("pkix"))
    }
}

/// Errors raised by a metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Entity {0} is already registered")]
    DuplicateEntity(EntityId),

    #[error("Alias {alias} is used by both {existing} and {entity_id}")]
    DuplicateAlias {
        alias: EntityAlias,
        existing: EntityId,
        entity_id: EntityId,
    },

    /// Metadata provider failure.
    #[error("Metadata provider error: {0}")]
    Provider(String),
}

/// Lookups the context provider performs against loaded metadata.
pub trait MetadataStore: Send + Sync {
    /// Entity id registered for `alias`, if any.
    fn entity_id_for_alias(&self, alias: &EntityAlias) -> Result<Option<EntityId>, MetadataError>;

    fn entity_descriptor(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Arc<EntityDescriptor>>, MetadataError>;

    /// Role descriptor of `entity_id` for `role` supporting `protocol`.
    fn role(
        &self,
        entity_id: &EntityId,
        role: EntityRole,
        protocol: &str,
    ) -> Result<Option<RoleDescriptor>, MetadataError> {
        Ok(self
            .entity_descriptor(entity_id)?
            .and_then(|ed| ed.role(role, protocol).cloned()))
    }

    /// Extended metadata of `entity_id`; a default instance when none was
    /// configured.
    fn extended_metadata(&self, entity_id: &EntityId) -> Result<Arc<ExtendedMetadata>, MetadataError>;

    /// Entity used when a request carries no alias.
    fn hosted_sp_name(&self) -> Option<EntityId>;

    /// Every known entity id.
    fn entity_ids(&self) -> Vec<EntityId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_is_qualified_name() {
        assert_eq!(
            EntityRole::ServiceProvider.to_string(),
            "{urn:oasis:names:tc:SAML:2.0:metadata}SPSSODescriptor"
        );
        assert_eq!(EntityRole::IdentityProvider.element_name(), "IDPSSODescriptor");
    }

    #[test]
    fn test_role_lookup_respects_protocol() {
        let mut saml11 = RoleDescriptor::new(EntityRole::IdentityProvider);
        saml11.protocol_support = vec!["urn:oasis:names:tc:SAML:1.1:protocol".to_string()];
        let ed = EntityDescriptor::new("https://idp.example.org").with_role(saml11);

        assert!(ed.role(EntityRole::IdentityProvider, SAML20P_NS).is_none());
        assert!(ed
            .role(EntityRole::IdentityProvider, "urn:oasis:names:tc:SAML:1.1:protocol")
            .is_some());
        assert!(ed.role(EntityRole::ServiceProvider, SAML20P_NS).is_none());
    }

    #[test]
    fn test_keys_for_usage() {
        let role = RoleDescriptor::new(EntityRole::ServiceProvider)
            .with_key(KeyDescriptor {
                usage: UsageType::Encryption,
                key_info: KeyInfo::default(),
            })
            .with_key(KeyDescriptor::default());

        assert_eq!(role.keys_for(UsageType::Signing).count(), 1);
        assert_eq!(role.keys_for(UsageType::Encryption).count(), 2);
    }

    #[test]
    fn test_is_pkix_case_insensitive() {
        for profile in ["PKIX", "pkix", "Pkix"] {
            let em = ExtendedMetadata {
                security_profile: Some(profile.to_string()),
                ..Default::default()
            };
            assert!(em.is_pkix(), "{profile}");
        }
        for profile in [Some("metaiop"), Some("pkix2"), None] {
            let em = ExtendedMetadata {
                security_profile: profile.map(str::to_string),
                ..Default::default()
            };
            assert!(!em.is_pkix());
        }
    }

    #[test]
    fn test_extended_metadata_deserialize_defaults() {
        let em: ExtendedMetadata =
            serde_json::from_str(r#"{"alias": "acme", "signing_key": "apollo"}"#).unwrap();
        assert_eq!(em.alias, Some(EntityAlias::new("acme")));
        assert_eq!(em.signing_key, Some(KeyName::new("apollo")));
        assert_eq!(em.encryption_key, None);
        assert_eq!(em.verify_depth, DEFAULT_VERIFY_DEPTH);
        assert!(!em.local);
    }
}
