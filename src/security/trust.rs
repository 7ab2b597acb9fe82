//! Signature trust engines.
//!
//! A trust engine decides whether a signature was produced by a key this
//! deployment trusts for the peer that sent the message. The cryptographic
//! check itself is performed by a [`SignatureValidator`]; the engines only
//! choose which credentials the validator may use.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::keyinfo::{KeyInfo, KeyInfoCredentialResolver};
use super::resolver::{MetadataCredentialResolver, PkixInformationResolver, PkixValidationInformation};
use crate::keys::{Certificate, Credential, KeyError, UsageType};
use crate::metadata::{EntityRole, MetadataError};
use crate::types::EntityId;

/// Errors raised while evaluating trust.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Credential(#[from] KeyError),

    /// The signature validator could not evaluate the signature.
    #[error("Signature validation error: {0}")]
    Validator(String),
}

/// A signature as extracted by the protocol layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: Option<String>,
    /// Canonicalized `SignedInfo`.
    pub signed_info: Vec<u8>,
    pub value: Vec<u8>,
    pub key_info: Option<KeyInfo>,
}

/// Who is expected to have signed, and for what purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustCriteria {
    pub peer_entity_id: EntityId,
    pub peer_role: EntityRole,
    pub usage: UsageType,
}

impl TrustCriteria {
    /// Criteria for a signing key of `peer_entity_id` acting as `peer_role`.
    pub fn new(peer_entity_id: EntityId, peer_role: EntityRole) -> Self {
        Self {
            peer_entity_id,
            peer_role,
            usage: UsageType::Signing,
        }
    }

    pub fn with_usage(mut self, usage: UsageType) -> Self {
        self.usage = usage;
        self
    }
}

/// Cryptographic checks the trust engines delegate.
pub trait SignatureValidator: Send + Sync {
    /// Whether `signature` was made with the key of `credential`.
    fn validate(&self, signature: &Signature, credential: &Credential) -> Result<bool, TrustError>;

    /// Whether `certificate` carries a valid signature by the key of `issuer`.
    fn verify_certificate(&self, certificate: &Certificate, issuer: &Certificate) -> Result<bool, TrustError>;
}

/// Which trust strategy an engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustEngineKind {
    ExplicitKey,
    Pkix,
}

/// Trusts only keys published in (or locally configured for) the peer's
/// metadata.
#[derive(Clone)]
pub struct ExplicitKeyTrustEngine {
    resolver: Arc<MetadataCredentialResolver>,
    key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
}

impl ExplicitKeyTrustEngine {
    pub fn new(
        resolver: Arc<MetadataCredentialResolver>,
        key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
    ) -> Self {
        Self {
            resolver,
            key_info_resolver,
        }
    }

    pub fn verify(
        &self,
        signature: &Signature,
        criteria: &TrustCriteria,
        validator: &dyn SignatureValidator,
    ) -> Result<bool, TrustError> {
        let trusted = self.resolver.resolve(criteria)?;
        if trusted.is_empty() {
            warn!("No trusted credentials for entity {}", criteria.peer_entity_id);
            return Ok(false);
        }

        for candidate in self.key_info_resolver.resolve(signature.key_info.as_ref()) {
            if !trusted.iter().any(|t| t.same_key_as(&candidate)) {
                debug!(
                    "Key {} from KeyInfo is not trusted for {}",
                    candidate.key_fingerprint(),
                    criteria.peer_entity_id
                );
                continue;
            }
            if validator.validate(signature, &candidate)? {
                debug!("Signature verified with KeyInfo credential");
                return Ok(true);
            }
        }

        for credential in &trusted {
            if validator.validate(signature, credential)? {
                debug!("Signature verified with trusted credential");
                return Ok(true);
            }
        }

        debug!("Signature could not be verified for {}", criteria.peer_entity_id);
        Ok(false)
    }
}

/// Trusts signers whose certificate chain leads to a configured anchor.
#[derive(Clone)]
pub struct PkixTrustEngine {
    resolver: Arc<PkixInformationResolver>,
    key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
}

impl PkixTrustEngine {
    pub fn new(
        resolver: Arc<PkixInformationResolver>,
        key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
    ) -> Self {
        Self {
            resolver,
            key_info_resolver,
        }
    }

    pub fn verify(
        &self,
        signature: &Signature,
        criteria: &TrustCriteria,
        validator: &dyn SignatureValidator,
    ) -> Result<bool, TrustError> {
        self.verify_at(signature, criteria, validator, Utc::now())
    }

    /// Like [`verify`](Self::verify) with an explicit evaluation time.
    pub fn verify_at(
        &self,
        signature: &Signature,
        criteria: &TrustCriteria,
        validator: &dyn SignatureValidator,
        at: DateTime<Utc>,
    ) -> Result<bool, TrustError> {
        let info = self.resolver.resolve(criteria)?;

        for candidate in self.key_info_resolver.resolve(signature.key_info.as_ref()) {
            if !validate_chain(&candidate, &info, validator, at)? {
                continue;
            }
            if validator.validate(signature, &candidate)? {
                debug!("Signature verified with PKIX-validated credential");
                return Ok(true);
            }
        }

        debug!("No PKIX-trusted signer for {}", criteria.peer_entity_id);
        Ok(false)
    }
}

/// Whether the credential's chain leads to an anchor. Every link, and the
/// link from the top of the chain to its anchor, must verify through
/// `validator`; names are only used to pair certificates.
fn validate_chain(
    credential: &Credential,
    info: &PkixValidationInformation,
    validator: &dyn SignatureValidator,
    at: DateTime<Utc>,
) -> Result<bool, TrustError> {
    let chain = credential.certificates();
    let (Some(leaf), Some(last)) = (chain.first(), chain.last()) else {
        debug!("Rejecting signer: credential carries no certificate");
        return Ok(false);
    };

    if chain.len() > info.verify_depth {
        debug!(
            "Rejecting {}: chain length {} exceeds verify depth {}",
            leaf.subject(),
            chain.len(),
            info.verify_depth
        );
        return Ok(false);
    }

    if let Some(expired) = chain.iter().find(|c| !c.is_valid_at(at)) {
        debug!("Rejecting {}: certificate {} is not valid at {}", leaf.subject(), expired.subject(), at);
        return Ok(false);
    }

    for pair in chain.windows(2) {
        let (issued, issuer) = (&pair[0], &pair[1]);
        if issued.issuer() != issuer.subject() || !validator.verify_certificate(issued, issuer)? {
            debug!(
                "Rejecting {}: certificate {} is not issued by {}",
                leaf.subject(),
                issued.subject(),
                issuer.subject()
            );
            return Ok(false);
        }
    }

    let mut anchored = chain.iter().any(|c| info.is_anchor(c));
    if !anchored {
        for anchor in info.anchors_for_issuer(last.issuer()) {
            if anchor.is_valid_at(at) && validator.verify_certificate(last, anchor)? {
                anchored = true;
                break;
            }
        }
    }
    if !anchored {
        debug!("Rejecting {}: no trust anchor verifies {}", leaf.subject(), last.subject());
        return Ok(false);
    }

    if let Some(names) = &info.trusted_names {
        if !subject_matches(leaf.subject(), names) {
            debug!("Rejecting {}: not a trusted name", leaf.subject());
            return Ok(false);
        }
    }

    Ok(true)
}

/// Match a subject DN, or its CN component, against trusted names.
fn subject_matches(subject: &str, names: &BTreeSet<String>) -> bool {
    if names.contains(subject) {
        return true;
    }
    subject
        .split(',')
        .map(str::trim)
        .filter_map(|rdn| {
            let (attr, value) = rdn.split_once('=')?;
            attr.trim().eq_ignore_ascii_case("CN").then(|| value.trim())
        })
        .any(|cn| names.contains(cn))
}

/// The trust strategy selected for one local entity.
#[derive(Clone)]
pub enum TrustEngine {
    ExplicitKey(ExplicitKeyTrustEngine),
    Pkix(PkixTrustEngine),
}

impl TrustEngine {
    pub fn kind(&self) -> TrustEngineKind {
        match self {
            Self::ExplicitKey(_) => TrustEngineKind::ExplicitKey,
            Self::Pkix(_) => TrustEngineKind::Pkix,
        }
    }

    /// Whether `signature` was made by a key trusted under `criteria`.
    pub fn verify(
        &self,
        signature: &Signature,
        criteria: &TrustCriteria,
        validator: &dyn SignatureValidator,
    ) -> Result<bool, TrustError> {
        match self {
            Self::ExplicitKey(engine) => engine.verify(signature, criteria, validator),
            Self::Pkix(engine) => engine.verify(signature, criteria, validator),
        }
    }
}

impl std::fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TrustEngine").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{CredentialResolver, KeyStore};
    use crate::metadata::{
        EntityDescriptor, ExtendedMetadata, InMemoryMetadataStore, KeyDescriptor, MetadataStore,
        RoleDescriptor,
    };
    use crate::security::DefaultKeyInfoResolver;
    use chrono::Duration;

    const IDP: &str = "https://idp.example.org";

    /// A signature (or certificate signature) is valid iff its value equals
    /// the signer's public key.
    struct EchoValidator;

    impl SignatureValidator for EchoValidator {
        fn validate(&self, signature: &Signature, credential: &Credential) -> Result<bool, TrustError> {
            Ok(signature.value == credential.public_key())
        }

        fn verify_certificate(&self, certificate: &Certificate, issuer: &Certificate) -> Result<bool, TrustError> {
            Ok(!issuer.public_key().is_empty() && certificate.signature() == issuer.public_key())
        }
    }

    fn leaf() -> Certificate {
        Certificate::new("CN=idp.example.org, O=Example", "CN=Example CA", vec![10])
            .with_public_key(vec![1, 1])
            .with_signature(vec![2, 2])
    }

    fn ca() -> Certificate {
        Certificate::new("CN=Example CA", "CN=Example CA", vec![20])
            .with_public_key(vec![2, 2])
            .with_signature(vec![2, 2])
    }

    /// Claims the CA as issuer but is signed with the attacker's own key.
    fn forged() -> Certificate {
        Certificate::new("CN=attacker", "CN=Example CA", vec![99])
            .with_public_key(vec![6, 6])
            .with_signature(vec![6, 6])
    }

    fn engines(extended: Option<ExtendedMetadata>) -> (ExplicitKeyTrustEngine, PkixTrustEngine) {
        let descriptor = EntityDescriptor::new(IDP).with_role(
            RoleDescriptor::new(EntityRole::IdentityProvider).with_key(KeyDescriptor {
                usage: UsageType::Signing,
                key_info: KeyInfo {
                    key_values: vec![vec![1, 1]],
                    ..Default::default()
                },
            }),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            InMemoryMetadataStore::new()
                .with_entity(descriptor, extended)
                .unwrap(),
        );
        let credentials: Arc<dyn CredentialResolver> = Arc::new(
            KeyStore::new()
                .with_key("ca", Credential::new(vec![2, 2]).with_certificates(vec![ca()]))
                .with_default_key("ca"),
        );
        let key_info: Arc<dyn KeyInfoCredentialResolver> = Arc::new(DefaultKeyInfoResolver);
        let metadata_resolver = Arc::new(MetadataCredentialResolver::new(
            metadata.clone(),
            credentials.clone(),
            key_info.clone(),
        ));
        let pkix_resolver = Arc::new(PkixInformationResolver::new(
            metadata_resolver.clone(),
            metadata,
            credentials,
        ));
        (
            ExplicitKeyTrustEngine::new(metadata_resolver, key_info.clone()),
            PkixTrustEngine::new(pkix_resolver, key_info),
        )
    }

    fn criteria() -> TrustCriteria {
        TrustCriteria::new(EntityId::new(IDP), EntityRole::IdentityProvider)
    }

    fn signed_by(value: Vec<u8>, key_info: Option<KeyInfo>) -> Signature {
        Signature {
            value,
            key_info,
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_key_accepts_published_key() {
        let (engine, _) = engines(None);
        let sig = signed_by(
            vec![1, 1],
            Some(KeyInfo {
                key_values: vec![vec![1, 1]],
                ..Default::default()
            }),
        );
        assert!(engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_explicit_key_without_key_info_uses_trusted_set() {
        let (engine, _) = engines(None);
        assert!(engine.verify(&signed_by(vec![1, 1], None), &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_explicit_key_rejects_message_supplied_key() {
        let (engine, _) = engines(None);
        // The message brings its own key and a signature made with it.
        let sig = signed_by(
            vec![6, 6],
            Some(KeyInfo {
                key_values: vec![vec![6, 6]],
                ..Default::default()
            }),
        );
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_explicit_key_unknown_peer() {
        let (engine, _) = engines(None);
        let criteria = TrustCriteria::new(EntityId::new("https://other"), EntityRole::IdentityProvider);
        assert!(!engine.verify(&signed_by(vec![1, 1], None), &criteria, &EchoValidator).unwrap());
    }

    fn chain_key_info(chain: Vec<Certificate>) -> Option<KeyInfo> {
        Some(KeyInfo {
            certificates: chain,
            ..Default::default()
        })
    }

    #[test]
    fn test_pkix_accepts_anchored_chain() {
        let (_, engine) = engines(None);
        let sig = signed_by(vec![1, 1], chain_key_info(vec![leaf(), ca()]));
        assert!(engine.verify(&sig, &criteria(), &EchoValidator).unwrap());

        // Anchor reached through the issuer name of the last certificate.
        let sig = signed_by(vec![1, 1], chain_key_info(vec![leaf()]));
        assert!(engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_unanchored_chain() {
        let (_, engine) = engines(None);
        let rogue = Certificate::new("CN=idp.example.org", "CN=Rogue CA", vec![30]).with_public_key(vec![1, 1]);
        let sig = signed_by(vec![1, 1], chain_key_info(vec![rogue]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_forged_issuer_name() {
        let (_, engine) = engines(None);

        let sig = signed_by(vec![6, 6], chain_key_info(vec![forged()]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());

        // Appending the genuine CA certificate does not help either.
        let sig = signed_by(vec![6, 6], chain_key_info(vec![forged(), ca()]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_anchor_copy_with_foreign_key() {
        let (_, engine) = engines(None);
        // Same DER as the anchor, different subject key.
        let fake_ca = ca().with_public_key(vec![6, 6]).with_signature(vec![6, 6]);
        let sig = signed_by(vec![6, 6], chain_key_info(vec![fake_ca]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_bare_key() {
        let (_, engine) = engines(None);
        let sig = signed_by(
            vec![1, 1],
            Some(KeyInfo {
                key_values: vec![vec![1, 1]],
                ..Default::default()
            }),
        );
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_broken_link() {
        let (_, engine) = engines(None);
        let other = Certificate::new("CN=Other", "CN=Example CA", vec![40]);
        let sig = signed_by(vec![1, 1], chain_key_info(vec![leaf(), other, ca()]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_respects_verify_depth() {
        let (_, engine) = engines(Some(ExtendedMetadata {
            verify_depth: 1,
            ..Default::default()
        }));
        let sig = signed_by(vec![1, 1], chain_key_info(vec![leaf(), ca()]));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_pkix_rejects_expired_certificate() {
        let (_, engine) = engines(None);
        let now = Utc::now();
        let expired = leaf().with_validity(None, Some(now - Duration::days(1)));
        let sig = signed_by(vec![1, 1], chain_key_info(vec![expired, ca()]));
        assert!(!engine.verify_at(&sig, &criteria(), &EchoValidator, now).unwrap());
    }

    #[test]
    fn test_pkix_trusted_names() {
        let names = |n: &str| {
            Some(ExtendedMetadata {
                trusted_names: Some(BTreeSet::from([n.to_string()])),
                ..Default::default()
            })
        };
        let sig = signed_by(vec![1, 1], chain_key_info(vec![leaf(), ca()]));

        let (_, engine) = engines(names("idp.example.org"));
        assert!(engine.verify(&sig, &criteria(), &EchoValidator).unwrap());

        let (_, engine) = engines(names("sp.example.org"));
        assert!(!engine.verify(&sig, &criteria(), &EchoValidator).unwrap());
    }

    #[test]
    fn test_trust_engine_dispatch() {
        let (explicit, pkix) = engines(None);
        let explicit = TrustEngine::ExplicitKey(explicit);
        let pkix = TrustEngine::Pkix(pkix);

        assert_eq!(explicit.kind(), TrustEngineKind::ExplicitKey);
        assert_eq!(pkix.kind(), TrustEngineKind::Pkix);

        let bare = signed_by(vec![1, 1], None);
        assert!(explicit.verify(&bare, &criteria(), &EchoValidator).unwrap());
        assert!(!pkix.verify(&bare, &criteria(), &EchoValidator).unwrap());
    }
}
