//! In-memory key store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{Credential, CredentialResolver, KeyError};
use crate::types::KeyName;

/// Credential resolver backed by a map of named credentials.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: BTreeMap<KeyName, Arc<Credential>>,
    default_key: Option<KeyName>,
}

impl KeyStore {
    /// Create an empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential under `name`.
    ///
    /// The credential is renamed to `name` so that lookups and the returned
    /// credential always agree.
    pub fn with_key(mut self, name: impl Into<KeyName>, credential: Credential) -> Self {
        let name = name.into();
        let credential = credential.with_name(name.clone());
        self.keys.insert(name, Arc::new(credential));
        self
    }

    /// Select the default key.
    pub fn with_default_key(mut self, name: impl Into<KeyName>) -> Self {
        self.default_key = Some(name.into());
        self
    }

    pub fn default_key(&self) -> Option<&KeyName> {
        self.default_key.as_ref()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialResolver for KeyStore {
    fn credential(&self, name: &KeyName) -> Result<Arc<Credential>, KeyError> {
        debug!("Resolving credential {}", name);
        self.keys
            .get(name)
            .cloned()
            .ok_or_else(|| KeyError::UnknownKey(name.clone()))
    }

    fn default_credential(&self) -> Result<Arc<Credential>, KeyError> {
        let name = self.default_key.as_ref().ok_or(KeyError::NoDefaultKey)?;
        debug!("Resolving default credential {}", name);
        self.credential(name)
    }

    fn available_credentials(&self) -> Vec<KeyName> {
        self.keys.keys().cloned().collect()
    }
}
