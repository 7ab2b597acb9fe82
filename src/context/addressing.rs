//! Request addressing: which hosted entity a request is meant for.
//!
//! Hosted entities are addressed by a path segment of the form
//! `.../alias/<alias>[/<role>]`. Requests without the marker go to the
//! hosted default service provider.

use tracing::debug;

use crate::metadata::EntityRole;
use crate::types::EntityAlias;

/// Marker preceding the alias in a request path.
pub const ALIAS_MARKER: &str = "/alias/";

/// Role segment selecting the identity provider side of an alias.
const IDP_SEGMENT: &str = "idp";

/// Addressing information parsed from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddress {
    /// The path carries an alias and the role it addresses.
    Alias { alias: EntityAlias, role: EntityRole },
    /// No alias marker; the hosted default service provider is meant.
    Default,
}

impl LocalAddress {
    /// Parse `path`. An absent path addresses the default entity.
    ///
    /// Everything after the first [`ALIAS_MARKER`] is the alias tail. When the
    /// tail contains `/`, the part after the last one is the role segment:
    /// `idp` (any case) selects the identity provider, anything else the
    /// service provider. The role segment never becomes part of the alias.
    pub fn parse_path(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::Default;
        };
        let Some(start) = path.find(ALIAS_MARKER) else {
            return Self::Default;
        };

        let tail = &path[start + ALIAS_MARKER.len()..];
        let (alias, role) = match tail.rfind('/') {
            Some(slash) => {
                let segment = &tail[slash + 1..];
                let role = if segment.eq_ignore_ascii_case(IDP_SEGMENT) {
                    EntityRole::IdentityProvider
                } else {
                    if !segment.eq_ignore_ascii_case(EntityRole::ServiceProvider.as_segment()) {
                        debug!(
                            "Unrecognised role segment '{}' in {}, treating as sp",
                            segment, path
                        );
                    }
                    EntityRole::ServiceProvider
                };
                (&tail[..slash], role)
            }
            None => (tail, EntityRole::ServiceProvider),
        };

        Self::Alias {
            alias: EntityAlias::new(alias),
            role,
        }
    }

    /// Role addressed; the default entity is always a service provider.
    pub fn role(&self) -> EntityRole {
        match self {
            Self::Alias { role, .. } => *role,
            Self::Default => EntityRole::ServiceProvider,
        }
    }

    pub fn alias(&self) -> Option<&EntityAlias> {
        match self {
            Self::Alias { alias, .. } => Some(alias),
            Self::Default => None,
        }
    }
}
