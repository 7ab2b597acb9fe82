//! NewType wrappers for strong typing throughout the context provider.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing an entity alias where a full entity ID is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Unique identifier of a SAML entity (e.g., "https://sp.example.org").
    ///
    /// This is the `entityID` attribute of an `EntityDescriptor`. Both local
    /// (hosted) and remote entities are addressed by it.
    EntityId
);

newtype_string!(
    /// Short local name mapped to a hosted entity.
    ///
    /// Aliases appear in request paths (`.../alias/<alias>/idp`) so that one
    /// deployment can host several entities behind the same filter chain.
    EntityAlias
);

newtype_string!(
    /// Name of a key held by the credential resolver.
    ///
    /// Extended metadata refers to signing, encryption and trusted keys by
    /// this name rather than by embedding key material.
    KeyName
);

newtype_string!(
    /// Identifier of an XML element within one message (the `Id` attribute).
    ///
    /// Used to link `EncryptedKey` elements with the `EncryptedData` they
    /// protect and to dereference same-document `RetrievalMethod` URIs.
    ElementId
);

newtype_string!(
    /// Subject `NameID` value of an authenticated principal.
    NameIdValue
);
