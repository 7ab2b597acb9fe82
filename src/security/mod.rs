//! Security engines assembled per local entity.
//!
//! - **keyinfo**: `KeyInfo` content and credential extraction from it
//! - **encryption**: XML Encryption structures and encrypted-key strategies
//! - **decrypter**: decryption bound to one local credential
//! - **resolver**: metadata-backed credential and PKIX anchor resolvers
//! - **trust**: explicit-key and PKIX signature trust engines

mod decrypter;
mod encryption;
mod keyinfo;
mod resolver;
mod trust;

use std::sync::Arc;

pub use decrypter::{DecryptedFragment, DecryptionBackend, DecryptionError, Decrypter};
pub use encryption::{
    ChainingEncryptedKeyResolver, ENCRYPTED_KEY_TYPE, EncryptedData, EncryptedElement,
    EncryptedElementKind, EncryptedElementTypeEncryptedKeyResolver, EncryptedKey,
    EncryptedKeyResolver, InlineEncryptedKeyResolver, RecipientFilter, RetrievalMethod,
    SimpleRetrievalMethodEncryptedKeyResolver,
};
pub use keyinfo::{
    DefaultKeyInfoResolver, KeyInfo, KeyInfoCredentialResolver, StaticKeyInfoCredentialResolver,
};
pub use resolver::{MetadataCredentialResolver, PkixInformationResolver, PkixValidationInformation};
pub use trust::{
    ExplicitKeyTrustEngine, PkixTrustEngine, Signature, SignatureValidator, TrustCriteria,
    TrustEngine, TrustEngineKind, TrustError,
};

/// Process-wide security settings shared by every request.
#[derive(Clone)]
pub struct SecurityConfiguration {
    key_info_resolver: Arc<dyn KeyInfoCredentialResolver>,
}

impl SecurityConfiguration {
    pub fn new(key_info_resolver: Arc<dyn KeyInfoCredentialResolver>) -> Self {
        Self { key_info_resolver }
    }

    /// Resolver used by trust engines to extract signer keys from messages.
    pub fn default_key_info_resolver(&self) -> Arc<dyn KeyInfoCredentialResolver> {
        self.key_info_resolver.clone()
    }
}

impl Default for SecurityConfiguration {
    fn default() -> Self {
        Self::new(Arc::new(DefaultKeyInfoResolver))
    }
}
