//! Key management.
//!
//! The context provider never builds key material itself. It asks a
//! [`CredentialResolver`] either for a credential by name (when extended
//! metadata names one) or for the deployment default. [`KeyStore`] is the
//! in-memory resolver used by the configuration loader and by tests.

mod credential;
mod store;

use std::sync::Arc;

use thiserror::Error;

use crate::types::KeyName;

pub use credential::{Certificate, Credential, PrivateKey, UsageType};
pub use store::KeyStore;

/// Errors raised by a credential resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// No key is stored under the requested name.
    #[error("Key with name {0} was not found")]
    UnknownKey(KeyName),

    /// No default key was configured.
    #[error("No default key is configured")]
    NoDefaultKey,

    /// Key store backend failure.
    #[error("Key store error: {0}")]
    Backend(String),
}

/// Named-key and default-credential lookups.
pub trait CredentialResolver: Send + Sync {
    /// Resolve the credential stored under `name`.
    fn credential(&self, name: &KeyName) -> Result<Arc<Credential>, KeyError>;

    /// Resolve the deployment default credential.
    fn default_credential(&self) -> Result<Arc<Credential>, KeyError>;

    /// Names of every credential this resolver can hand out.
    fn available_credentials(&self) -> Vec<KeyName>;
}

/// Resolve `name` when present, otherwise the default credential.
///
/// Signing and encryption keys are both chosen this way; exactly one source
/// is consulted per call.
pub fn named_or_default(
    resolver: &dyn CredentialResolver,
    name: Option<&KeyName>,
) -> Result<Arc<Credential>, KeyError> {
    match name {
        Some(name) => resolver.credential(name),
        None => resolver.default_credential(),
    }
}
