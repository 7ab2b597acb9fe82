//! In-memory metadata store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{EntityDescriptor, ExtendedMetadata, MetadataError, MetadataStore};
use crate::types::{EntityAlias, EntityId};

/// Metadata store holding fully loaded descriptors.
///
/// Registration validates alias uniqueness; lookups never fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    entities: HashMap<EntityId, Arc<EntityDescriptor>>,
    extended: HashMap<EntityId, Arc<ExtendedMetadata>>,
    aliases: HashMap<EntityAlias, EntityId>,
    hosted_sp: Option<EntityId>,
    default_extended: Arc<ExtendedMetadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity and, optionally, its extended metadata.
    pub fn add_entity(
        &mut self,
        descriptor: EntityDescriptor,
        extended: Option<ExtendedMetadata>,
    ) -> Result<(), MetadataError> {
        let entity_id = descriptor.entity_id.clone();
        if self.entities.contains_key(&entity_id) {
            return Err(MetadataError::DuplicateEntity(entity_id));
        }

        if let Some(alias) = extended.as_ref().and_then(|em| em.alias.clone()) {
            if let Some(existing) = self.aliases.get(&alias) {
                return Err(MetadataError::DuplicateAlias {
                    alias,
                    existing: existing.clone(),
                    entity_id,
                });
            }
            debug!("Registering alias {} for entity {}", alias, entity_id);
            self.aliases.insert(alias, entity_id.clone());
        }

        if let Some(em) = extended {
            self.extended.insert(entity_id.clone(), Arc::new(em));
        }
        self.entities.insert(entity_id, Arc::new(descriptor));
        Ok(())
    }

    /// Builder-style [`add_entity`](Self::add_entity).
    pub fn with_entity(
        mut self,
        descriptor: EntityDescriptor,
        extended: Option<ExtendedMetadata>,
    ) -> Result<Self, MetadataError> {
        self.add_entity(descriptor, extended)?;
        Ok(self)
    }

    pub fn set_hosted_sp_name(&mut self, entity_id: Option<EntityId>) {
        self.hosted_sp = entity_id;
    }

    pub fn with_hosted_sp_name(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.hosted_sp = Some(entity_id.into());
        self
    }

    /// Registered aliases and the entities they point to.
    pub fn aliases(&self) -> impl Iterator<Item = (&EntityAlias, &EntityId)> {
        self.aliases.iter()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn entity_id_for_alias(&self, alias: &EntityAlias) -> Result<Option<EntityId>, MetadataError> {
        Ok(self.aliases.get(alias).cloned())
    }

    fn entity_descriptor(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Arc<EntityDescriptor>>, MetadataError> {
        Ok(self.entities.get(entity_id).cloned())
    }

    fn extended_metadata(&self, entity_id: &EntityId) -> Result<Arc<ExtendedMetadata>, MetadataError> {
        Ok(self
            .extended
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| self.default_extended.clone()))
    }

    fn hosted_sp_name(&self) -> Option<EntityId> {
        self.hosted_sp.clone()
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().cloned().collect();
        ids.sort();
        ids
    }
}
