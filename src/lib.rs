//! Security context assembly for locally hosted SAML entities.
//!
//! For each inbound request the [`ContextProvider`] works out which hosted
//! service or identity provider is addressed and collects what processing
//! the request needs: metadata, signing credential, decrypter and signature
//! trust engine.

// Core modules
pub mod config;
pub mod context;
pub mod keys;
pub mod metadata;
pub mod security;
pub mod types;

// Re-export key types and functions
pub use config::{ConfigError, Deployment, DeploymentConfig};
pub use context::{
    ContextError, ContextProvider, ContextProviderBuilder, InboundTransport, OutboundTransport,
    SamlCredential, SecurityContext,
};
pub use keys::{Credential, CredentialResolver, KeyError, KeyStore};
pub use metadata::{EntityRole, ExtendedMetadata, InMemoryMetadataStore, MetadataError, MetadataStore};
pub use security::{SecurityConfiguration, TrustEngine, TrustEngineKind};
pub use types::{EntityAlias, EntityId, KeyName};

use anyhow::Result;

/// Convenience function to create a context provider from the deployment
/// configuration file.
///
/// The file is located as described in [`config`]; the provider's resolvers
/// are built before this returns.
pub fn create_provider() -> Result<ContextProvider> {
    let deployment = config::load_deployment()?;
    Ok(deployment.into_provider()?)
}
