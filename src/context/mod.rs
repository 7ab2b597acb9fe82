//! Per-request security context assembly.
//!
//! A [`ContextProvider`] turns an inbound request (or a credential from an
//! earlier login) into a [`SecurityContext`] in four steps:
//!
//! 1. resolve the addressed local entity and its role
//! 2. load its metadata and signing credential
//! 3. bind a decrypter to its encryption credential
//! 4. select the trust engine for incoming signatures
//!
//! Any failing step aborts the request; partially populated contexts are
//! never returned.

mod addressing;
mod credential;
mod error;
mod provider;
mod security_context;

pub use addressing::{ALIAS_MARKER, LocalAddress};
pub use credential::SamlCredential;
pub use error::{ContextError, ContextResult};
pub use provider::{ContextProvider, ContextProviderBuilder};
pub use security_context::{InboundTransport, OutboundTransport, SecurityContext};
