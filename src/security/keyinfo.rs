//! `KeyInfo` content and the resolvers that turn it into credentials.

use std::sync::Arc;

use tracing::debug;

use super::encryption::{EncryptedKey, RetrievalMethod};
use crate::keys::{Certificate, Credential};
use crate::types::KeyName;

/// Key material advertised by a message or a metadata `KeyDescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// `ds:KeyName` hints.
    pub key_names: Vec<KeyName>,
    /// Raw public keys (`ds:KeyValue`).
    pub key_values: Vec<Vec<u8>>,
    /// `ds:X509Data` chain, entity certificate first.
    pub certificates: Vec<Certificate>,
    /// `xenc:EncryptedKey` children.
    pub encrypted_keys: Vec<EncryptedKey>,
    /// `ds:RetrievalMethod` references.
    pub retrieval_methods: Vec<RetrievalMethod>,
}

impl KeyInfo {
    pub fn is_empty(&self) -> bool {
        self.key_names.is_empty()
            && self.key_values.is_empty()
            && self.certificates.is_empty()
            && self.encrypted_keys.is_empty()
            && self.retrieval_methods.is_empty()
    }
}

/// Derives candidate credentials from `KeyInfo`.
pub trait KeyInfoCredentialResolver: Send + Sync {
    fn resolve(&self, key_info: Option<&KeyInfo>) -> Vec<Arc<Credential>>;
}

/// Builds credentials from the key values and certificates carried inline.
///
/// This is the process-wide resolver both trust engines use to extract the
/// signer's presented key material from a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyInfoResolver;

impl KeyInfoCredentialResolver for DefaultKeyInfoResolver {
    fn resolve(&self, key_info: Option<&KeyInfo>) -> Vec<Arc<Credential>> {
        let Some(key_info) = key_info else {
            return Vec::new();
        };

        let name = key_info.key_names.first().cloned();
        let named = |credential: Credential| match &name {
            Some(name) => credential.with_name(name.clone()),
            None => credential,
        };

        let mut credentials = Vec::new();

        if let Some(leaf) = key_info.certificates.first() {
            let credential = Credential::new(leaf.public_key().to_vec())
                .with_certificates(key_info.certificates.clone());
            credentials.push(Arc::new(named(credential)));
        }

        for value in &key_info.key_values {
            let duplicate = credentials.iter().any(|c| c.public_key() == value.as_slice());
            if !duplicate {
                credentials.push(Arc::new(named(Credential::new(value.clone()))));
            }
        }

        debug!("Resolved {} credential(s) from KeyInfo", credentials.len());
        credentials
    }
}

/// Always yields the same fixed credentials, ignoring message content.
#[derive(Debug, Clone)]
pub struct StaticKeyInfoCredentialResolver {
    credentials: Vec<Arc<Credential>>,
}

impl StaticKeyInfoCredentialResolver {
    pub fn new(credential: Arc<Credential>) -> Self {
        Self {
            credentials: vec![credential],
        }
    }

    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }
}

impl KeyInfoCredentialResolver for StaticKeyInfoCredentialResolver {
    fn resolve(&self, _key_info: Option<&KeyInfo>) -> Vec<Arc<Credential>> {
        self.credentials.clone()
    }
}
