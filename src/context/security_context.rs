//! Per-request security context.

use std::sync::Arc;

use http::{HeaderMap, Method, Request, Uri};
use uuid::Uuid;

use crate::keys::Credential;
use crate::metadata::{EntityDescriptor, EntityRole, ExtendedMetadata, MetadataStore, RoleDescriptor};
use crate::security::{Decrypter, TrustEngine};
use crate::types::EntityId;

/// Inbound message transport: the parts of the HTTP request the protocol
/// layer reads.
#[derive(Debug, Clone, Default)]
pub struct InboundTransport {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl InboundTransport {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Capture method, URI and headers of `request`; the body is left to the
    /// caller.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Outbound message transport: headers collected for the response.
#[derive(Debug, Clone, Default)]
pub struct OutboundTransport {
    headers: HeaderMap,
}

impl OutboundTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// Security material for the local entity addressed by one request.
///
/// Created per request and discarded afterwards. The provider only hands out
/// contexts whose every `local_*` field is populated.
#[derive(Clone)]
pub struct SecurityContext {
    request_id: Uuid,
    metadata: Arc<dyn MetadataStore>,
    inbound: InboundTransport,
    outbound: OutboundTransport,
    local_entity_id: Option<EntityId>,
    local_entity_role: Option<EntityRole>,
    local_entity_metadata: Option<Arc<EntityDescriptor>>,
    local_role_metadata: Option<RoleDescriptor>,
    local_extended_metadata: Option<Arc<ExtendedMetadata>>,
    local_signing_credential: Option<Arc<Credential>>,
    local_decrypter: Option<Decrypter>,
    local_trust_engine: Option<TrustEngine>,
}

impl SecurityContext {
    /// Create an empty context bound to the request transports.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        inbound: InboundTransport,
        outbound: OutboundTransport,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            metadata,
            inbound,
            outbound,
            local_entity_id: None,
            local_entity_role: None,
            local_entity_metadata: None,
            local_role_metadata: None,
            local_extended_metadata: None,
            local_signing_credential: None,
            local_decrypter: None,
            local_trust_engine: None,
        }
    }

    /// Correlation id for logs.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn inbound_transport(&self) -> &InboundTransport {
        &self.inbound
    }

    pub fn outbound_transport(&self) -> &OutboundTransport {
        &self.outbound
    }

    pub fn outbound_transport_mut(&mut self) -> &mut OutboundTransport {
        &mut self.outbound
    }

    pub fn local_entity_id(&self) -> Option<&EntityId> {
        self.local_entity_id.as_ref()
    }

    pub fn local_entity_role(&self) -> Option<EntityRole> {
        self.local_entity_role
    }

    pub fn local_entity_metadata(&self) -> Option<&Arc<EntityDescriptor>> {
        self.local_entity_metadata.as_ref()
    }

    pub fn local_role_metadata(&self) -> Option<&RoleDescriptor> {
        self.local_role_metadata.as_ref()
    }

    pub fn local_extended_metadata(&self) -> Option<&Arc<ExtendedMetadata>> {
        self.local_extended_metadata.as_ref()
    }

    pub fn local_signing_credential(&self) -> Option<&Arc<Credential>> {
        self.local_signing_credential.as_ref()
    }

    pub fn local_decrypter(&self) -> Option<&Decrypter> {
        self.local_decrypter.as_ref()
    }

    pub fn local_trust_engine(&self) -> Option<&TrustEngine> {
        self.local_trust_engine.as_ref()
    }

    /// Whether every local field has been populated.
    pub fn is_complete(&self) -> bool {
        self.local_entity_id.is_some()
            && self.local_entity_role.is_some()
            && self.local_entity_metadata.is_some()
            && self.local_role_metadata.is_some()
            && self.local_extended_metadata.is_some()
            && self.local_signing_credential.is_some()
            && self.local_decrypter.is_some()
            && self.local_trust_engine.is_some()
    }

    pub(crate) fn set_local_entity(&mut self, entity_id: Option<EntityId>, role: EntityRole) {
        self.local_entity_id = entity_id;
        self.local_entity_role = Some(role);
    }

    pub(crate) fn set_local_metadata(
        &mut self,
        entity: Arc<EntityDescriptor>,
        role: RoleDescriptor,
        extended: Arc<ExtendedMetadata>,
    ) {
        self.local_entity_metadata = Some(entity);
        self.local_role_metadata = Some(role);
        self.local_extended_metadata = Some(extended);
    }

    pub(crate) fn set_local_signing_credential(&mut self, credential: Arc<Credential>) {
        self.local_signing_credential = Some(credential);
    }

    pub(crate) fn set_local_decrypter(&mut self, decrypter: Decrypter) {
        self.local_decrypter = Some(decrypter);
    }

    pub(crate) fn set_local_trust_engine(&mut self, engine: TrustEngine) {
        self.local_trust_engine = Some(engine);
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("request_id", &self.request_id)
            .field("path", &self.inbound.path())
            .field("local_entity_id", &self.local_entity_id)
            .field("local_entity_role", &self.local_entity_role)
            .field(
                "local_signing_credential",
                &self
                    .local_signing_credential
                    .as_ref()
                    .and_then(|c| c.name().cloned()),
            )
            .field("local_decrypter", &self.local_decrypter)
            .field("local_trust_engine", &self.local_trust_engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadataStore;

    #[test]
    fn test_inbound_transport_from_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("https://sp.example.org/app/saml/SSO/alias/acme?foo=bar")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(())
            .unwrap();

        let inbound = InboundTransport::from_request(&request);
        assert_eq!(inbound.method(), &Method::POST);
        assert_eq!(inbound.path(), "/app/saml/SSO/alias/acme");
        assert_eq!(
            inbound.headers().get("content-type").unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx = SecurityContext::new(
            Arc::new(InMemoryMetadataStore::new()),
            InboundTransport::default(),
            OutboundTransport::new(),
        );

        assert!(ctx.local_entity_id().is_none());
        assert!(ctx.local_trust_engine().is_none());
        assert!(!ctx.is_complete());
        assert_eq!(ctx.inbound_transport().path(), "/");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let a = SecurityContext::new(metadata.clone(), InboundTransport::default(), OutboundTransport::new());
        let b = SecurityContext::new(metadata, InboundTransport::default(), OutboundTransport::new());
        assert_ne!(a.request_id(), b.request_id());
    }
}
