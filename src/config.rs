//! Deployment configuration.
//!
//! A single JSON file describes the hosted and remote entities and the key
//! store. It is located through `SAML_CONTEXT_CONFIG`, then
//! `$XDG_CONFIG_HOME/saml-context/saml-context.json`, then
//! `./saml-context.json`. `${VAR}` references in string values are replaced
//! from the environment before the file is interpreted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{ContextProvider, ContextResult};
use crate::keys::{Certificate, Credential, KeyStore, PrivateKey, UsageType};
use crate::metadata::{
    EntityDescriptor, EntityRole, ExtendedMetadata, InMemoryMetadataStore, KeyDescriptor,
    MetadataError, MetadataStore, RoleDescriptor, SAML20P_NS,
};
use crate::security::KeyInfo;
use crate::types::{EntityId, KeyName};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SAML_CONTEXT_CONFIG";

const CONFIG_FILE: &str = "saml-context.json";

/// Errors raised while turning a configuration into stores.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find saml-context.json (set SAML_CONTEXT_CONFIG or create ./saml-context.json)")]
    NotFound,

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid base64 in {field}: {source}")]
    Base64 {
        field: String,
        source: base64::DecodeError,
    },

    #[error("Key {0} has neither a public key nor a certificate")]
    MissingPublicKey(String),

    #[error("Default key {0} is not defined")]
    UnknownDefaultKey(String),

    #[error("Entity {entity_id} refers to undefined key {key}")]
    UnknownKeyReference { entity_id: String, key: String },

    #[error("Hosted service provider {0} is not a configured entity")]
    UnknownHostedSp(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

#[derive(Debug, Deserialize)]
pub struct DeploymentConfig {
    /// Entity used when a request carries no alias.
    #[serde(default)]
    pub hosted_sp: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub default_key: Option<String>,
    #[serde(default)]
    pub keys: BTreeMap<String, KeyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EntityConfig {
    pub entity_id: String,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub extended: Option<ExtendedMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct RoleConfig {
    pub role: EntityRole,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub keys: Vec<PublishedKeyConfig>,
}

fn default_protocols() -> Vec<String> {
    vec![SAML20P_NS.to_string()]
}

/// A `KeyDescriptor` published in metadata.
#[derive(Debug, Deserialize)]
pub struct PublishedKeyConfig {
    #[serde(default)]
    pub usage: UsageType,
    #[serde(default)]
    pub key_names: Vec<String>,
    /// Base64 public key.
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub certificates: Vec<CertificateConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateConfig {
    pub subject: String,
    pub issuer: String,
    /// Base64 DER.
    pub der: String,
    /// Base64 subject public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Base64 issuer signature value.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
}

/// A key held by the local key store.
#[derive(Debug, Deserialize)]
pub struct KeyConfig {
    #[serde(default)]
    pub usage: UsageType,
    /// Base64 public key; taken from the first certificate when omitted.
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub certificates: Vec<CertificateConfig>,
    /// Base64 private key, usually supplied as `${VAR}`.
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Stores materialised from a configuration.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub metadata: InMemoryMetadataStore,
    pub keys: KeyStore,
}

impl Deployment {
    /// Bootstrap a context provider over the loaded stores.
    pub fn into_provider(self) -> ContextResult<ContextProvider> {
        ContextProvider::builder()
            .metadata(Arc::new(self.metadata))
            .key_manager(Arc::new(self.keys))
            .build()
    }
}

impl DeploymentConfig {
    /// Parse a configuration, expanding `${VAR}` in every string value.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut value: Value = serde_json::from_str(raw)?;
        expand_value(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_deployment(self) -> Result<Deployment, ConfigError> {
        let mut keys = KeyStore::new();
        for (name, key) in &self.keys {
            keys = keys.with_key(name.as_str(), key_credential(name, key)?);
        }
        if let Some(default_key) = &self.default_key {
            if !self.keys.contains_key(default_key) {
                return Err(ConfigError::UnknownDefaultKey(default_key.clone()));
            }
            keys = keys.with_default_key(default_key.as_str());
        }

        let mut metadata = InMemoryMetadataStore::new();
        for entity in self.entities {
            if let Some(extended) = &entity.extended {
                check_key_references(&entity.entity_id, extended, &self.keys)?;
            }

            let mut descriptor = EntityDescriptor::new(entity.entity_id.as_str());
            for role in entity.roles {
                descriptor = descriptor.with_role(role_descriptor(&entity.entity_id, role)?);
            }
            debug!(
                "Loaded entity {} with {} role(s)",
                entity.entity_id,
                descriptor.roles.len()
            );
            metadata.add_entity(descriptor, entity.extended)?;
        }

        if let Some(hosted_sp) = self.hosted_sp {
            let hosted_sp = EntityId::new(hosted_sp);
            if !metadata.entity_ids().contains(&hosted_sp) {
                return Err(ConfigError::UnknownHostedSp(hosted_sp.into_inner()));
            }
            metadata.set_hosted_sp_name(Some(hosted_sp));
        }

        Ok(Deployment { metadata, keys })
    }
}

fn check_key_references(
    entity_id: &str,
    extended: &ExtendedMetadata,
    keys: &BTreeMap<String, KeyConfig>,
) -> Result<(), ConfigError> {
    let referenced = extended
        .signing_key
        .iter()
        .chain(extended.encryption_key.iter())
        .chain(extended.trusted_keys.iter().flatten());

    for key in referenced {
        if !keys.contains_key(key.as_str()) {
            return Err(ConfigError::UnknownKeyReference {
                entity_id: entity_id.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

fn role_descriptor(entity_id: &str, role: RoleConfig) -> Result<RoleDescriptor, ConfigError> {
    let mut descriptor = RoleDescriptor::new(role.role);
    descriptor.protocol_support = role.protocols;

    for (index, key) in role.keys.into_iter().enumerate() {
        let field = format!("{entity_id} {} key {index}", role.role.as_segment());
        let mut key_info = KeyInfo {
            key_names: key.key_names.into_iter().map(KeyName::new).collect(),
            ..Default::default()
        };
        if let Some(public_key) = &key.public_key {
            key_info.key_values.push(decode(&field, public_key)?);
        }
        for cert in &key.certificates {
            key_info.certificates.push(certificate(&field, cert)?);
        }
        descriptor = descriptor.with_key(KeyDescriptor {
            usage: key.usage,
            key_info,
        });
    }
    Ok(descriptor)
}

fn key_credential(name: &str, key: &KeyConfig) -> Result<Credential, ConfigError> {
    let field = format!("key {name}");
    let certificates = key
        .certificates
        .iter()
        .map(|c| certificate(&field, c))
        .collect::<Result<Vec<_>, _>>()?;

    let public_key = match &key.public_key {
        Some(encoded) => decode(&field, encoded)?,
        None => certificates
            .first()
            .map(|c| c.public_key().to_vec())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingPublicKey(name.to_string()))?,
    };

    let mut credential = Credential::new(public_key)
        .with_usage(key.usage)
        .with_certificates(certificates);
    if let Some(private_key) = &key.private_key {
        credential = credential.with_private_key(PrivateKey::new(decode(&field, private_key)?));
    }
    Ok(credential)
}

fn certificate(field: &str, cert: &CertificateConfig) -> Result<Certificate, ConfigError> {
    let mut certificate = Certificate::new(
        cert.subject.as_str(),
        cert.issuer.as_str(),
        decode(field, &cert.der)?,
    )
    .with_validity(cert.not_before, cert.not_after);
    if let Some(public_key) = &cert.public_key {
        certificate = certificate.with_public_key(decode(field, public_key)?);
    }
    if let Some(signature) = &cert.signature {
        certificate = certificate.with_signature(decode(field, signature)?);
    }
    Ok(certificate)
}

fn decode(field: &str, encoded: &str) -> Result<Vec<u8>, ConfigError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|source| ConfigError::Base64 {
            field: field.to_string(),
            source,
        })
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(p) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("saml-context").join(CONFIG_FILE);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from(CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(ConfigError::NotFound)
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match env::var(&name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_value(value: &mut Value) {
    match value {
        Value::String(s) => *s = expand_env_vars(s),
        Value::Array(items) => items.iter_mut().for_each(expand_value),
        Value::Object(map) => map.values_mut().for_each(expand_value),
        _ => {}
    }
}

/// Load the deployment described by `path`.
pub fn load_from_path(path: &Path) -> anyhow::Result<Deployment> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let deployment = DeploymentConfig::from_json_str(&raw)
        .and_then(DeploymentConfig::into_deployment)
        .with_context(|| format!("loading {}", path.display()))?;

    info!(
        "Loaded {} entities and {} keys from {}",
        deployment.metadata.entity_ids().len(),
        deployment.keys.len(),
        path.display()
    );
    Ok(deployment)
}

/// Load the deployment from the resolved configuration path.
pub fn load_deployment() -> anyhow::Result<Deployment> {
    let path = resolve_config_path()?;
    load_from_path(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::CredentialResolver;
    use crate::types::EntityAlias;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "hosted_sp": "https://sp.example.org",
        "default_key": "apollo",
        "keys": {
            "apollo": {
                "certificates": [{
                    "subject": "CN=sp.example.org",
                    "issuer": "CN=Example CA",
                    "der": "AQID",
                    "public_key": "BAU=",
                    "signature": "AgI="
                }]
            },
            "signer": { "usage": "signing", "public_key": "CQk=" }
        },
        "entities": [
            {
                "entity_id": "https://sp.example.org",
                "roles": [{ "role": "sp" }, { "role": "idp" }],
                "extended": { "local": true, "alias": "acme", "signing_key": "signer" }
            },
            {
                "entity_id": "https://idp.example.org",
                "roles": [{
                    "role": "idp",
                    "keys": [{ "usage": "signing", "public_key": "AQE=" }]
                }],
                "extended": { "security_profile": "pkix" }
            }
        ]
    }"#;

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let deployment = load_from_path(file.path()).unwrap();
        let metadata = &deployment.metadata;

        assert_eq!(metadata.hosted_sp_name(), Some(EntityId::new("https://sp.example.org")));
        assert_eq!(
            metadata.entity_id_for_alias(&EntityAlias::new("acme")).unwrap(),
            Some(EntityId::new("https://sp.example.org"))
        );
        let idp = metadata
            .role(&EntityId::new("https://idp.example.org"), EntityRole::IdentityProvider, SAML20P_NS)
            .unwrap()
            .unwrap();
        assert_eq!(idp.key_descriptors[0].key_info.key_values, vec![vec![1, 1]]);

        let apollo = deployment.keys.default_credential().unwrap();
        assert_eq!(apollo.public_key(), &[4, 5]);
        assert_eq!(apollo.certificates()[0].der(), &[1, 2, 3]);
        assert_eq!(apollo.certificates()[0].signature(), &[2, 2]);
        assert_eq!(deployment.keys.len(), 2);
    }

    #[test]
    fn test_deployment_into_provider() {
        let deployment = DeploymentConfig::from_json_str(CONFIG)
            .unwrap()
            .into_deployment()
            .unwrap();
        let provider = deployment.into_provider().unwrap();
        assert_eq!(provider.metadata().entity_ids().len(), 2);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(&dir.path().join(CONFIG_FILE)).unwrap_err();
        assert!(err.to_string().starts_with("reading"));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: the variable name is unique to this test.
        unsafe { env::set_var("SAML_CONTEXT_TEST_PRIVATE_KEY", "AAEC") };

        assert_eq!(expand_env_vars("${SAML_CONTEXT_TEST_PRIVATE_KEY}"), "AAEC");
        assert_eq!(expand_env_vars("x-${SAML_CONTEXT_TEST_UNSET}-y"), "x-${SAML_CONTEXT_TEST_UNSET}-y");
        assert_eq!(expand_env_vars("$HOME"), "$HOME");

        let config = DeploymentConfig::from_json_str(
            r#"{ "keys": { "k": { "public_key": "AQ==", "private_key": "${SAML_CONTEXT_TEST_PRIVATE_KEY}" } } }"#,
        )
        .unwrap();
        let deployment = config.into_deployment().unwrap();
        let key = deployment.keys.credential(&KeyName::new("k")).unwrap();
        assert_eq!(key.private_key().map(|k| k.as_bytes().to_vec()), Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_rejects_undefined_key_reference() {
        let config = DeploymentConfig::from_json_str(
            r#"{ "entities": [{ "entity_id": "https://sp", "extended": { "encryption_key": "nope" } }] }"#,
        )
        .unwrap();
        let err = config.into_deployment().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKeyReference { ref key, .. } if key == "nope"));
    }

    #[test]
    fn test_rejects_unknown_default_key_and_hosted_sp() {
        let err = DeploymentConfig::from_json_str(r#"{ "default_key": "ghost" }"#)
            .unwrap()
            .into_deployment()
            .unwrap_err();
        assert_eq!(err.to_string(), "Default key ghost is not defined");

        let err = DeploymentConfig::from_json_str(r#"{ "hosted_sp": "https://sp" }"#)
            .unwrap()
            .into_deployment()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHostedSp(_)));
    }

    #[test]
    fn test_key_without_public_key() {
        let err = DeploymentConfig::from_json_str(r#"{ "keys": { "k": {} } }"#)
            .unwrap()
            .into_deployment()
            .unwrap_err();
        assert_eq!(err.to_string(), "Key k has neither a public key nor a certificate");
    }

    #[test]
    fn test_bad_base64() {
        let err = DeploymentConfig::from_json_str(r#"{ "keys": { "k": { "public_key": "%%%" } } }"#)
            .unwrap()
            .into_deployment()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Base64 { .. }));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = DeploymentConfig::from_json_str(
            r#"{ "entities": [
                { "entity_id": "https://a", "extended": { "alias": "x" } },
                { "entity_id": "https://b", "extended": { "alias": "x" } }
            ] }"#,
        )
        .unwrap()
        .into_deployment()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Metadata(MetadataError::DuplicateAlias { .. })));
    }
}
