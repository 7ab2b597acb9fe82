//! Decrypter bound to one local credential.
//!
//! Assembly is cheap: a decrypter only holds the key-encryption-key resolver
//! and a handle to the shared encrypted-key strategy chain. Cipher work is
//! delegated to a [`DecryptionBackend`] when [`Decrypter::decrypt_element`]
//! is invoked by the protocol layer.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::encryption::{
    ChainingEncryptedKeyResolver, EncryptedData, EncryptedElement, EncryptedElementKind,
    EncryptedKey, EncryptedKeyResolver,
};
use super::keyinfo::{KeyInfoCredentialResolver, StaticKeyInfoCredentialResolver};
use crate::keys::Credential;

/// Errors raised while decrypting; never during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    /// None of the key-locating strategies found an `EncryptedKey`.
    #[error("No EncryptedKey could be located for the encrypted element")]
    NoEncryptedKey,

    /// Every located key failed to unwrap with every candidate credential.
    #[error("Failed to decrypt the data encryption key: {0}")]
    KeyUnwrapFailed(String),

    /// The backend failed to decrypt the payload.
    #[error("Decryption backend error: {0}")]
    Backend(String),
}

/// Byte-level cipher operations.
pub trait DecryptionBackend: Send + Sync {
    /// Decrypt `key` with the private half of `credential`.
    fn unwrap_key(
        &self,
        key: &EncryptedKey,
        credential: &Credential,
        data_algorithm: Option<&str>,
    ) -> Result<Vec<u8>, DecryptionError>;

    /// Decrypt the payload of `data` with a symmetric `key`.
    fn decrypt_data(&self, data: &EncryptedData, key: &[u8]) -> Result<Vec<u8>, DecryptionError>;
}

/// Decrypted content detached from the source message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFragment {
    pub kind: EncryptedElementKind,
    pub content: Vec<u8>,
    /// Whether the fragment is owned by a fresh document.
    pub rooted_in_new_document: bool,
}

/// Locates the encrypted key of an element and decrypts it with a fixed
/// credential.
#[derive(Clone)]
pub struct Decrypter {
    kek_resolver: Arc<StaticKeyInfoCredentialResolver>,
    encrypted_key_resolver: Arc<ChainingEncryptedKeyResolver>,
    root_in_new_document: bool,
}

impl Decrypter {
    /// Create a decrypter that only ever uses `credential`.
    pub fn new(
        credential: Arc<Credential>,
        encrypted_key_resolver: Arc<ChainingEncryptedKeyResolver>,
    ) -> Self {
        Self {
            kek_resolver: Arc::new(StaticKeyInfoCredentialResolver::new(credential)),
            encrypted_key_resolver,
            root_in_new_document: false,
        }
    }

    pub fn set_root_in_new_document(&mut self, root_in_new_document: bool) {
        self.root_in_new_document = root_in_new_document;
    }

    pub fn root_in_new_document(&self) -> bool {
        self.root_in_new_document
    }

    /// The credential keys are unwrapped with.
    pub fn credential(&self) -> Option<&Arc<Credential>> {
        self.kek_resolver.credentials().first()
    }

    pub fn encrypted_key_resolver(&self) -> &ChainingEncryptedKeyResolver {
        &self.encrypted_key_resolver
    }

    /// Run the strategy chain against `element`.
    pub fn resolve_encrypted_keys(&self, element: &EncryptedElement) -> Vec<EncryptedKey> {
        self.encrypted_key_resolver.resolve(element)
    }

    /// Locate and unwrap the data key, then decrypt the element payload.
    pub fn decrypt_element(
        &self,
        element: &EncryptedElement,
        backend: &dyn DecryptionBackend,
    ) -> Result<DecryptedFragment, DecryptionError> {
        let keys = self.resolve_encrypted_keys(element);
        if keys.is_empty() {
            return Err(DecryptionError::NoEncryptedKey);
        }

        let data_algorithm = element.encrypted_data.algorithm.as_deref();
        let mut last_error = None;

        for key in &keys {
            for credential in self.kek_resolver.resolve(key.key_info.as_ref()) {
                match backend.unwrap_key(key, &credential, data_algorithm) {
                    Ok(data_key) => {
                        debug!(
                            "Unwrapped data key with credential {:?}",
                            credential.name().map(|n| n.as_str())
                        );
                        return self.decrypt_data(element, &data_key, backend);
                    }
                    Err(e) => {
                        debug!("EncryptedKey {:?} failed to unwrap: {}", key.id, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        let reason = last_error.map_or_else(|| "no usable credential".to_string(), |e| e.to_string());
        warn!("Failed to decrypt any of {} located EncryptedKey(s)", keys.len());
        Err(DecryptionError::KeyUnwrapFailed(reason))
    }

    /// Decrypt the payload with an already known data key.
    pub fn decrypt_data(
        &self,
        element: &EncryptedElement,
        data_key: &[u8],
        backend: &dyn DecryptionBackend,
    ) -> Result<DecryptedFragment, DecryptionError> {
        let content = backend.decrypt_data(&element.encrypted_data, data_key)?;
        Ok(DecryptedFragment {
            kind: element.kind,
            content,
            rooted_in_new_document: self.root_in_new_document,
        })
    }
}

impl std::fmt::Debug for Decrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypter")
            .field("credential", &self.credential().and_then(|c| c.name().cloned()))
            .field("encrypted_key_resolver", &self.encrypted_key_resolver)
            .field("root_in_new_document", &self.root_in_new_document)
            .finish()
    }
}
