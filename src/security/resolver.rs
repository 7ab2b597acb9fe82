//! Process-wide resolvers backing the trust engines.
//!
//! Both are built once at bootstrap and only read afterwards, so a single
//! instance is shared by every request.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::keyinfo::KeyInfoCredentialResolver;
use super::trust::{TrustCriteria, TrustError};
use crate::keys::{Certificate, Credential, CredentialResolver, UsageType};
use crate::metadata::{MetadataStore, SAML20P_NS};
use crate::types::KeyName;

/// Derives the trusted credentials of a peer from its published metadata,
/// or from the key store when the peer's extended metadata overrides them.
pub struct MetadataCredentialResolver {
    metadata: Arc<dyn MetadataStore>,
    credentials: Arc<dyn CredentialResolver>,
    key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
}

impl MetadataCredentialResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        credentials: Arc<dyn CredentialResolver>,
        key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
    ) -> Self {
        Self {
            metadata,
            credentials,
            key_info_resolver,
        }
    }

    /// Credentials trusted for the peer, role and usage in `criteria`.
    pub fn resolve(&self, criteria: &TrustCriteria) -> Result<Vec<Arc<Credential>>, TrustError> {
        let extended = self.metadata.extended_metadata(&criteria.peer_entity_id)?;

        let override_key = match criteria.usage {
            UsageType::Signing => extended.signing_key.as_ref(),
            UsageType::Encryption => extended.encryption_key.as_ref(),
            UsageType::Unspecified => None,
        };
        if let Some(name) = override_key {
            debug!(
                "Using locally configured key {} for entity {}",
                name, criteria.peer_entity_id
            );
            return Ok(vec![self.credentials.credential(name)?]);
        }

        let Some(role) =
            self.metadata
                .role(&criteria.peer_entity_id, criteria.peer_role, SAML20P_NS)?
        else {
            debug!(
                "No {} metadata for entity {}, no trusted credentials",
                criteria.peer_role.element_name(),
                criteria.peer_entity_id
            );
            return Ok(Vec::new());
        };

        let mut trusted = Vec::new();
        for descriptor in role.keys_for(criteria.usage) {
            for credential in self.key_info_resolver.resolve(Some(&descriptor.key_info)) {
                let credential = credential
                    .as_ref()
                    .clone()
                    .with_entity_id(criteria.peer_entity_id.clone())
                    .with_usage(descriptor.usage);
                trusted.push(Arc::new(credential));
            }
        }

        debug!(
            "Resolved {} trusted credential(s) for entity {}",
            trusted.len(),
            criteria.peer_entity_id
        );
        Ok(trusted)
    }
}

/// Trust anchors and constraints for certificate-chain validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkixValidationInformation {
    pub anchors: Vec<Certificate>,
    pub verify_depth: usize,
    pub trusted_names: Option<BTreeSet<String>>,
}

impl PkixValidationInformation {
    /// Whether `certificate` is one of the anchors.
    pub fn is_anchor(&self, certificate: &Certificate) -> bool {
        self.anchors.iter().any(|a| a.same_as(certificate))
    }

    /// Anchors whose subject is `issuer`. A name match alone proves nothing;
    /// the caller must still verify the issued certificate against each.
    pub fn anchors_for_issuer<'a>(&'a self, issuer: &'a str) -> impl Iterator<Item = &'a Certificate> {
        self.anchors.iter().filter(move |a| a.subject() == issuer)
    }
}

/// Derives PKIX trust anchors for a peer, layered on the metadata
/// credential resolver.
pub struct PkixInformationResolver {
    metadata_resolver: Arc<MetadataCredentialResolver>,
    metadata: Arc<dyn MetadataStore>,
    credentials: Arc<dyn CredentialResolver>,
}

impl PkixInformationResolver {
    pub fn new(
        metadata_resolver: Arc<MetadataCredentialResolver>,
        metadata: Arc<dyn MetadataStore>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            metadata_resolver,
            metadata,
            credentials,
        }
    }

    pub fn resolve(&self, criteria: &TrustCriteria) -> Result<PkixValidationInformation, TrustError> {
        let extended = self.metadata.extended_metadata(&criteria.peer_entity_id)?;

        let mut anchors: Vec<Certificate> = Vec::new();
        for credential in self.metadata_resolver.resolve(criteria)? {
            anchors.extend(credential.certificates().iter().cloned());
        }

        let key_names: Vec<KeyName> = match &extended.trusted_keys {
            Some(names) => names.iter().cloned().collect(),
            None => self.credentials.available_credentials(),
        };
        for name in &key_names {
            let credential = self.credentials.credential(name)?;
            anchors.extend(credential.certificates().iter().cloned());
        }

        let mut unique: Vec<Certificate> = Vec::with_capacity(anchors.len());
        for cert in anchors {
            if !unique.iter().any(|u| u.same_as(&cert)) {
                unique.push(cert);
            }
        }
        let anchors = unique;

        debug!(
            "Resolved {} PKIX anchor(s) for entity {}",
            anchors.len(),
            criteria.peer_entity_id
        );

        Ok(PkixValidationInformation {
            anchors,
            verify_depth: extended.verify_depth,
            trusted_names: extended.trusted_names.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyStore;
    use crate::metadata::{
        EntityDescriptor, EntityRole, ExtendedMetadata, InMemoryMetadataStore, KeyDescriptor,
        RoleDescriptor,
    };
    use crate::security::{DefaultKeyInfoResolver, KeyInfo};
    use crate::types::EntityId;

    const IDP: &str = "https://idp.example.org";

    fn idp_cert() -> Certificate {
        Certificate::new("CN=idp.example.org", "CN=Example CA", vec![10]).with_public_key(vec![1, 1])
    }

    fn ca_cert() -> Certificate {
        Certificate::new("CN=Example CA", "CN=Example CA", vec![20]).with_public_key(vec![2, 2])
    }

    fn idp_descriptor() -> EntityDescriptor {
        EntityDescriptor::new(IDP).with_role(
            RoleDescriptor::new(EntityRole::IdentityProvider)
                .with_key(KeyDescriptor {
                    usage: UsageType::Signing,
                    key_info: KeyInfo {
                        certificates: vec![idp_cert()],
                        ..Default::default()
                    },
                })
                .with_key(KeyDescriptor {
                    usage: UsageType::Encryption,
                    key_info: KeyInfo {
                        key_values: vec![vec![3, 3]],
                        ..Default::default()
                    },
                }),
        )
    }

    fn keys() -> KeyStore {
        KeyStore::new()
            .with_key("ca", Credential::new(vec![2, 2]).with_certificates(vec![ca_cert()]))
            .with_key("override", Credential::new(vec![9, 9]))
            .with_default_key("ca")
    }

    fn resolvers(extended: Option<ExtendedMetadata>) -> (Arc<MetadataCredentialResolver>, PkixInformationResolver) {
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            InMemoryMetadataStore::new()
                .with_entity(idp_descriptor(), extended)
                .unwrap(),
        );
        let credentials: Arc<dyn CredentialResolver> = Arc::new(keys());
        let metadata_resolver = Arc::new(MetadataCredentialResolver::new(
            metadata.clone(),
            credentials.clone(),
            Arc::new(DefaultKeyInfoResolver),
        ));
        let pkix = PkixInformationResolver::new(metadata_resolver.clone(), metadata, credentials);
        (metadata_resolver, pkix)
    }

    fn criteria(usage: UsageType) -> TrustCriteria {
        TrustCriteria::new(EntityId::new(IDP), EntityRole::IdentityProvider).with_usage(usage)
    }

    #[test]
    fn test_signing_credentials_from_metadata() {
        let (resolver, _) = resolvers(None);
        let trusted = resolver.resolve(&criteria(UsageType::Signing)).unwrap();

        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].public_key(), &[1, 1]);
        assert_eq!(trusted[0].entity_id(), Some(&EntityId::new(IDP)));
        assert_eq!(trusted[0].usage(), UsageType::Signing);
    }

    #[test]
    fn test_encryption_credentials_from_metadata() {
        let (resolver, _) = resolvers(None);
        let trusted = resolver.resolve(&criteria(UsageType::Encryption)).unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].public_key(), &[3, 3]);
    }

    #[test]
    fn test_extended_metadata_overrides_signing_key() {
        let (resolver, _) = resolvers(Some(ExtendedMetadata {
            signing_key: Some(KeyName::new("override")),
            ..Default::default()
        }));
        let trusted = resolver.resolve(&criteria(UsageType::Signing)).unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].public_key(), &[9, 9]);
    }

    #[test]
    fn test_trusted_keys_leave_metadata_credentials_alone() {
        let (resolver, _) = resolvers(Some(ExtendedMetadata {
            trusted_keys: Some(BTreeSet::from([KeyName::new("override")])),
            ..Default::default()
        }));
        let trusted = resolver.resolve(&criteria(UsageType::Signing)).unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].public_key(), &[1, 1]);
    }

    #[test]
    fn test_unknown_peer_has_no_trusted_credentials() {
        let (resolver, _) = resolvers(None);
        let criteria = TrustCriteria::new(EntityId::new("https://nobody"), EntityRole::IdentityProvider);
        assert!(resolver.resolve(&criteria).unwrap().is_empty());
    }

    #[test]
    fn test_pkix_anchors_include_metadata_and_key_store() {
        let (_, pkix) = resolvers(None);
        let info = pkix.resolve(&criteria(UsageType::Signing)).unwrap();

        assert_eq!(info.anchors.len(), 2);
        assert!(info.is_anchor(&idp_cert()));
        assert!(info.is_anchor(&ca_cert()));
        assert_eq!(info.anchors_for_issuer("CN=Example CA").count(), 1);
        assert_eq!(info.anchors_for_issuer("CN=Rogue CA").count(), 0);
        assert_eq!(info.verify_depth, crate::metadata::DEFAULT_VERIFY_DEPTH);
        assert!(info.trusted_names.is_none());
    }

    #[test]
    fn test_pkix_trusted_keys_restrict_key_store_anchors() {
        let (_, pkix) = resolvers(Some(ExtendedMetadata {
            trusted_keys: Some(BTreeSet::from([KeyName::new("override")])),
            verify_depth: 2,
            ..Default::default()
        }));
        let info = pkix.resolve(&criteria(UsageType::Signing)).unwrap();

        assert_eq!(info.anchors.len(), 1);
        assert!(!info.is_anchor(&ca_cert()));
        assert_eq!(info.verify_depth, 2);
    }

    #[test]
    fn test_pkix_unknown_trusted_key_propagates() {
        let (_, pkix) = resolvers(Some(ExtendedMetadata {
            trusted_keys: Some(BTreeSet::from([KeyName::new("missing")])),
            ..Default::default()
        }));
        let err = pkix.resolve(&criteria(UsageType::Signing)).unwrap_err();
        assert!(matches!(err, TrustError::Credential(_)));
    }
}
