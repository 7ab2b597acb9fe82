//! Opaque key material handed out by a credential resolver.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{EntityId, KeyName};

/// Intended use of a key, as published in a `KeyDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Signing,
    Encryption,
    #[default]
    Unspecified,
}

impl UsageType {
    /// Whether a key published with this usage may serve `wanted`.
    ///
    /// Keys without an explicit usage are valid for every purpose.
    pub fn permits(self, wanted: UsageType) -> bool {
        self == UsageType::Unspecified || wanted == UsageType::Unspecified || self == wanted
    }
}

/// An X.509 certificate reduced to the fields chain evaluation needs.
///
/// Parsing DER is left to the collaborator that builds the certificate; the
/// bytes are kept verbatim so fingerprints stay stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    subject: String,
    issuer: String,
    public_key: Vec<u8>,
    signature: Vec<u8>,
    der: Vec<u8>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

impl Certificate {
    /// Create a certificate with an unbounded validity window.
    pub fn new(subject: impl Into<String>, issuer: impl Into<String>, der: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            public_key: Vec::new(),
            signature: Vec::new(),
            der,
            not_before: None,
            not_after: None,
        }
    }

    /// Attach the subject public key extracted from the DER.
    pub fn with_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.public_key = public_key;
        self
    }

    /// Attach the issuer's signature value extracted from the DER.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Restrict the validity window.
    pub fn with_validity(
        mut self,
        not_before: Option<DateTime<Utc>>,
        not_after: Option<DateTime<Utc>>,
    ) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Lowercase hex SHA-256 over the DER encoding.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.der)
    }

    /// Same DER and same subject key.
    pub fn same_as(&self, other: &Certificate) -> bool {
        self.der == other.der && self.public_key == other.public_key
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Check the validity window against `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        let started = self.not_before.map_or(true, |nb| nb <= at);
        let not_expired = self.not_after.map_or(true, |na| at <= na);
        started && not_expired
    }
}

/// Private key bytes; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(Arc<[u8]>);

impl PrivateKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Key material used for signing, verification or decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    name: Option<KeyName>,
    entity_id: Option<EntityId>,
    usage: UsageType,
    public_key: Vec<u8>,
    certificates: Vec<Certificate>,
    private_key: Option<PrivateKey>,
}

impl Credential {
    /// Create a credential from raw public key bytes.
    pub fn new(public_key: Vec<u8>) -> Self {
        Self {
            name: None,
            entity_id: None,
            usage: UsageType::Unspecified,
            public_key,
            certificates: Vec::new(),
            private_key: None,
        }
    }

    pub fn with_name(mut self, name: KeyName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_entity_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_usage(mut self, usage: UsageType) -> Self {
        self.usage = usage;
        self
    }

    /// Attach the certificate chain, entity certificate first.
    pub fn with_certificates(mut self, certificates: Vec<Certificate>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn with_private_key(mut self, private_key: PrivateKey) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn name(&self) -> Option<&KeyName> {
        self.name.as_ref()
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    pub fn usage(&self) -> UsageType {
        self.usage
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// The certificate chain, entity certificate first.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// The entity (leaf) certificate, if any.
    pub fn entity_certificate(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// Lowercase hex SHA-256 over the public key.
    pub fn key_fingerprint(&self) -> String {
        fingerprint(&self.public_key)
    }

    /// Whether both credentials carry the same public key.
    pub fn same_key_as(&self, other: &Credential) -> bool {
        !self.public_key.is_empty() && self.public_key == other.public_key
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
