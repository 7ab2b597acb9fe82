//! Credential issued after a successful SAML login.

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, NameIdValue};

/// Identity established by a previous authentication.
///
/// Follow-up requests for the same session (single logout, for example)
/// address the local entity that consumed the original assertion, which is
/// why the credential remembers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlCredential {
    name_id: NameIdValue,
    remote_entity_id: EntityId,
    local_entity_id: EntityId,
    #[serde(default)]
    relay_state: Option<String>,
}

impl SamlCredential {
    pub fn new(name_id: NameIdValue, remote_entity_id: EntityId, local_entity_id: EntityId) -> Self {
        Self {
            name_id,
            remote_entity_id,
            local_entity_id,
            relay_state: None,
        }
    }

    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    pub fn name_id(&self) -> &NameIdValue {
        &self.name_id
    }

    /// Entity that asserted the identity.
    pub fn remote_entity_id(&self) -> &EntityId {
        &self.remote_entity_id
    }

    /// Hosted entity that consumed the assertion.
    pub fn local_entity_id(&self) -> &EntityId {
        &self.local_entity_id
    }

    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saml_credential_roundtrip_fields() {
        let cred = SamlCredential::new(
            NameIdValue::new("alice"),
            EntityId::new("https://idp.example.org"),
            EntityId::new("https://sp.example.org"),
        )
        .with_relay_state("/home");

        assert_eq!(cred.name_id().as_str(), "alice");
        assert_eq!(cred.remote_entity_id().as_str(), "https://idp.example.org");
        assert_eq!(cred.local_entity_id().as_str(), "https://sp.example.org");
        assert_eq!(cred.relay_state(), Some("/home"));
    }

    #[test]
    fn test_saml_credential_deserialize_without_relay_state() {
        let json = r#"{
            "name_id": "alice",
            "remote_entity_id": "https://idp.example.org",
            "local_entity_id": "https://sp.example.org"
        }"#;
        let cred: SamlCredential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.relay_state(), None);
    }
}
