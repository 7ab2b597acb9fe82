//! Error types for context assembly.

use thiserror::Error;

use crate::keys::KeyError;
use crate::metadata::{EntityRole, MetadataError};
use crate::types::{EntityAlias, EntityId};

/// Errors that abort the assembly of a security context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The request named an alias no hosted entity uses.
    #[error("No local entity found for alias {0}, verify your configuration.")]
    UnknownAlias(EntityAlias),

    /// No alias was given and no default service provider is configured.
    #[error("No hosted service provider is configured and no alias was selected")]
    NoLocalEntity,

    /// The entity or its role descriptor is missing from metadata.
    #[error("Metadata for entity {entity_id} and role {role} wasn't found")]
    MetadataNotFound { entity_id: EntityId, role: EntityRole },

    /// A step ran before the local entity was populated.
    #[error("Local entity must be populated before {0}")]
    NotPopulated(&'static str),

    /// A required collaborator was not supplied at startup.
    #[error("{0}")]
    MissingCollaborator(&'static str),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Credential(#[from] KeyError),
}

impl ContextError {
    /// Whether this is a non-retryable configuration problem.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAlias(_) | Self::NoLocalEntity | Self::MetadataNotFound { .. }
        )
    }

    /// Whether this is a startup precondition failure.
    pub fn is_precondition_error(&self) -> bool {
        matches!(self, Self::MissingCollaborator(_) | Self::NotPopulated(_))
    }
}

/// Result type for context assembly.
pub type ContextResult<T> = Result<T, ContextError>;
