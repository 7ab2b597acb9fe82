//! Assembly of per-request security contexts.

use std::sync::Arc;

use tracing::{debug, info};

use super::addressing::LocalAddress;
use super::credential::SamlCredential;
use super::error::{ContextError, ContextResult};
use super::security_context::{InboundTransport, OutboundTransport, SecurityContext};
use crate::keys::{CredentialResolver, named_or_default};
use crate::metadata::{EntityRole, MetadataStore, SAML20P_NS};
use crate::security::{
    ChainingEncryptedKeyResolver, Decrypter, ExplicitKeyTrustEngine, MetadataCredentialResolver,
    PkixInformationResolver, PkixTrustEngine, SecurityConfiguration, TrustEngine,
};

/// Builds a [`SecurityContext`] for each request.
///
/// The trust resolvers and the encrypted-key chain are created once in
/// [`ContextProviderBuilder::build`] and shared by every context handed out
/// afterwards. A provider is immutable and can be used from many threads.
pub struct ContextProvider {
    metadata: Arc<dyn MetadataStore>,
    credentials: Arc<dyn CredentialResolver>,
    security: SecurityConfiguration,
    metadata_resolver: Arc<MetadataCredentialResolver>,
    pkix_resolver: Arc<PkixInformationResolver>,
    encrypted_key_resolver: Arc<ChainingEncryptedKeyResolver>,
}

/// Collects the collaborators of a [`ContextProvider`].
#[derive(Default)]
pub struct ContextProviderBuilder {
    metadata: Option<Arc<dyn MetadataStore>>,
    credentials: Option<Arc<dyn CredentialResolver>>,
    security: Option<SecurityConfiguration>,
    encrypted_key_resolver: Option<ChainingEncryptedKeyResolver>,
}

impl ContextProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn key_manager(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Defaults to [`SecurityConfiguration::default`].
    pub fn security_configuration(mut self, security: SecurityConfiguration) -> Self {
        self.security = Some(security);
        self
    }

    /// Defaults to [`ChainingEncryptedKeyResolver::standard`].
    pub fn encrypted_key_resolver(mut self, resolver: ChainingEncryptedKeyResolver) -> Self {
        self.encrypted_key_resolver = Some(resolver);
        self
    }

    /// Validate collaborators and create the shared resolvers.
    pub fn build(self) -> ContextResult<ContextProvider> {
        let credentials = self
            .credentials
            .ok_or(ContextError::MissingCollaborator("Key manager must be set"))?;
        let metadata = self
            .metadata
            .ok_or(ContextError::MissingCollaborator("Metadata must be set"))?;
        let security = self.security.unwrap_or_default();
        let encrypted_key_resolver = Arc::new(
            self.encrypted_key_resolver
                .unwrap_or_else(ChainingEncryptedKeyResolver::standard),
        );

        let metadata_resolver = Arc::new(MetadataCredentialResolver::new(
            metadata.clone(),
            credentials.clone(),
            security.default_key_info_resolver(),
        ));
        let pkix_resolver = Arc::new(PkixInformationResolver::new(
            metadata_resolver.clone(),
            metadata.clone(),
            credentials.clone(),
        ));

        info!(
            "Context provider ready: {} entities, {} keys, encrypted-key chain {:?}",
            metadata.entity_ids().len(),
            credentials.available_credentials().len(),
            encrypted_key_resolver.strategy_names()
        );

        Ok(ContextProvider {
            metadata,
            credentials,
            security,
            metadata_resolver,
            pkix_resolver,
            encrypted_key_resolver,
        })
    }
}

impl ContextProvider {
    pub fn builder() -> ContextProviderBuilder {
        ContextProviderBuilder::new()
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn key_manager(&self) -> &Arc<dyn CredentialResolver> {
        &self.credentials
    }

    pub fn security_configuration(&self) -> &SecurityConfiguration {
        &self.security
    }

    pub fn metadata_resolver(&self) -> &Arc<MetadataCredentialResolver> {
        &self.metadata_resolver
    }

    pub fn pkix_resolver(&self) -> &Arc<PkixInformationResolver> {
        &self.pkix_resolver
    }

    pub fn encrypted_key_resolver(&self) -> &Arc<ChainingEncryptedKeyResolver> {
        &self.encrypted_key_resolver
    }

    /// Context for the local entity addressed by the request path.
    pub fn local_entity(
        &self,
        inbound: InboundTransport,
        outbound: OutboundTransport,
    ) -> ContextResult<SecurityContext> {
        let mut ctx = SecurityContext::new(self.metadata.clone(), inbound, outbound);
        let path = ctx.inbound_transport().path().to_string();
        self.populate_entity_id(&mut ctx, Some(&path))?;
        self.populate_local_context(&mut ctx)?;
        Ok(ctx)
    }

    /// Context for the local entity that consumed `credential`. The request
    /// path is not consulted.
    pub fn local_entity_for_credential(
        &self,
        inbound: InboundTransport,
        outbound: OutboundTransport,
        credential: &SamlCredential,
    ) -> ContextResult<SecurityContext> {
        let mut ctx = SecurityContext::new(self.metadata.clone(), inbound, outbound);
        self.populate_entity_id_from_credential(&mut ctx, credential);
        self.populate_local_context(&mut ctx)?;
        Ok(ctx)
    }

    fn populate_local_context(&self, ctx: &mut SecurityContext) -> ContextResult<()> {
        self.populate_local_entity(ctx)?;
        self.populate_decrypter(ctx)?;
        self.populate_trust_engine(ctx)?;

        debug!(
            "[{}] Security context assembled for {:?} as {:?}",
            ctx.request_id(),
            ctx.local_entity_id(),
            ctx.local_entity_role()
        );
        Ok(())
    }

    /// Set the local entity id and role from a request path.
    ///
    /// Without an alias the hosted service provider is used, which may be
    /// unset; that is reported by [`populate_local_entity`](Self::populate_local_entity).
    pub fn populate_entity_id(
        &self,
        ctx: &mut SecurityContext,
        path: Option<&str>,
    ) -> ContextResult<()> {
        let address = LocalAddress::parse_path(path);
        let role = address.role();
        match address.alias() {
            Some(alias) => {
                let Some(entity_id) = self.metadata.entity_id_for_alias(alias)? else {
                    return Err(ContextError::UnknownAlias(alias.clone()));
                };
                debug!(
                    "[{}] Alias {} resolved to entity {} ({})",
                    ctx.request_id(),
                    alias,
                    entity_id,
                    role.as_segment()
                );
                ctx.set_local_entity(Some(entity_id), role);
            }
            None => {
                let entity_id = self.metadata.hosted_sp_name();
                debug!(
                    "[{}] No alias in request, using hosted service provider {:?}",
                    ctx.request_id(),
                    entity_id
                );
                ctx.set_local_entity(entity_id, role);
            }
        }
        Ok(())
    }

    /// Set the local entity from a previously issued credential. The role is
    /// always service provider.
    pub fn populate_entity_id_from_credential(
        &self,
        ctx: &mut SecurityContext,
        credential: &SamlCredential,
    ) {
        ctx.set_local_entity(
            Some(credential.local_entity_id().clone()),
            EntityRole::ServiceProvider,
        );
    }

    /// Load metadata of the local entity and its signing credential.
    pub fn populate_local_entity(&self, ctx: &mut SecurityContext) -> ContextResult<()> {
        let Some(entity_id) = ctx.local_entity_id().cloned() else {
            return Err(ContextError::NoLocalEntity);
        };
        let role = ctx
            .local_entity_role()
            .unwrap_or(EntityRole::ServiceProvider);

        let entity = self.metadata.entity_descriptor(&entity_id)?;
        let role_descriptor = self.metadata.role(&entity_id, role, SAML20P_NS)?;
        let (Some(entity), Some(role_descriptor)) = (entity, role_descriptor) else {
            return Err(ContextError::MetadataNotFound { entity_id, role });
        };
        let extended = self.metadata.extended_metadata(&entity_id)?;

        let signing = named_or_default(self.credentials.as_ref(), extended.signing_key.as_ref())?;
        debug!(
            "[{}] Signing credential for {}: {:?}",
            ctx.request_id(),
            entity_id,
            signing.name()
        );

        ctx.set_local_metadata(entity, role_descriptor, extended);
        ctx.set_local_signing_credential(signing);
        Ok(())
    }

    /// Bind a decrypter to the local encryption credential.
    pub fn populate_decrypter(&self, ctx: &mut SecurityContext) -> ContextResult<()> {
        let extended = ctx
            .local_extended_metadata()
            .cloned()
            .ok_or(ContextError::NotPopulated("decrypter assembly"))?;

        let credential =
            named_or_default(self.credentials.as_ref(), extended.encryption_key.as_ref())?;
        debug!(
            "[{}] Encryption credential: {:?}",
            ctx.request_id(),
            credential.name()
        );

        let mut decrypter = Decrypter::new(credential, self.encrypted_key_resolver.clone());
        decrypter.set_root_in_new_document(true);
        ctx.set_local_decrypter(decrypter);
        Ok(())
    }

    /// Choose the signature trust strategy of the local entity.
    pub fn populate_trust_engine(&self, ctx: &mut SecurityContext) -> ContextResult<()> {
        let extended = ctx
            .local_extended_metadata()
            .cloned()
            .ok_or(ContextError::NotPopulated("trust engine selection"))?;

        let key_info_resolver = self.security.default_key_info_resolver();
        let engine = if extended.is_pkix() {
            TrustEngine::Pkix(PkixTrustEngine::new(
                self.pkix_resolver.clone(),
                key_info_resolver,
            ))
        } else {
            TrustEngine::ExplicitKey(ExplicitKeyTrustEngine::new(
                self.metadata_resolver.clone(),
                key_info_resolver,
            ))
        };
        debug!("[{}] Trust engine: {:?}", ctx.request_id(), engine.kind());

        ctx.set_local_trust_engine(engine);
        Ok(())
    }
}

impl std::fmt::Debug for ContextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextProvider")
            .field("entities", &self.metadata.entity_ids())
            .field("keys", &self.credentials.available_credentials())
            .field("encrypted_key_resolver", &self.encrypted_key_resolver)
            .finish()
    }
}
