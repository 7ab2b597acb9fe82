//! XML Encryption structures and the strategies that locate the
//! `EncryptedKey` protecting an `EncryptedData`.
//!
//! Strategies are combined in a [`ChainingEncryptedKeyResolver`]: each one is
//! tried in order and the first that finds at least one key wins. A strategy
//! that finds nothing is skipped silently; it is not an error for a message
//! to use only one of the three linking styles.

use std::collections::BTreeSet;

use tracing::debug;

use super::keyinfo::KeyInfo;
use crate::types::ElementId;

/// `Type` URI identifying a `RetrievalMethod` that points at an `EncryptedKey`.
pub const ENCRYPTED_KEY_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#EncryptedKey";

/// `xenc:EncryptedData`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedData {
    pub id: Option<ElementId>,
    pub type_uri: Option<String>,
    pub algorithm: Option<String>,
    pub key_info: Option<KeyInfo>,
    pub cipher_value: Vec<u8>,
}

/// `xenc:EncryptedKey`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedKey {
    pub id: Option<ElementId>,
    pub recipient: Option<String>,
    pub algorithm: Option<String>,
    pub key_info: Option<KeyInfo>,
    /// `DataReference` URIs with the leading `#` removed.
    pub reference_list: Vec<ElementId>,
    pub cipher_value: Vec<u8>,
}

impl EncryptedKey {
    /// Whether this key declares no data references or references `data`.
    pub fn references(&self, data: &EncryptedData) -> bool {
        if self.reference_list.is_empty() {
            return true;
        }
        match &data.id {
            Some(id) => self.reference_list.contains(id),
            None => false,
        }
    }
}

/// `ds:RetrievalMethod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalMethod {
    pub uri: String,
    pub type_uri: Option<String>,
}

/// The SAML element types that carry encrypted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedElementKind {
    Assertion,
    NameId,
    Attribute,
    NewId,
}

/// A SAML `EncryptedElementType`: one `EncryptedData` plus sibling keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedElement {
    pub kind: EncryptedElementKind,
    pub encrypted_data: EncryptedData,
    /// `EncryptedKey` children of the element itself.
    pub encrypted_keys: Vec<EncryptedKey>,
    /// `EncryptedKey` elements elsewhere in the enclosing document. They are
    /// only reachable through a same-document `RetrievalMethod`.
    pub document_keys: Vec<EncryptedKey>,
}

impl EncryptedElement {
    pub fn new(kind: EncryptedElementKind, encrypted_data: EncryptedData) -> Self {
        Self {
            kind,
            encrypted_data,
            encrypted_keys: Vec::new(),
            document_keys: Vec::new(),
        }
    }

    pub fn with_encrypted_key(mut self, key: EncryptedKey) -> Self {
        self.encrypted_keys.push(key);
        self
    }

    pub fn with_document_key(mut self, key: EncryptedKey) -> Self {
        self.document_keys.push(key);
        self
    }

    /// Dereference a same-document `Id`, siblings first.
    pub fn key_by_id(&self, id: &str) -> Option<&EncryptedKey> {
        self.encrypted_keys
            .iter()
            .chain(&self.document_keys)
            .find(|k| k.id.as_ref().is_some_and(|kid| kid.as_str() == id))
    }
}

/// A strategy locating the `EncryptedKey` elements for an encrypted element.
pub trait EncryptedKeyResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Candidate keys; empty when this strategy does not apply.
    fn resolve(&self, element: &EncryptedElement) -> Vec<EncryptedKey>;
}

/// Recipient filter shared by the concrete strategies.
///
/// An empty set accepts every key. Otherwise keys without a `Recipient`
/// attribute are accepted and keys naming another recipient are rejected.
#[derive(Debug, Clone, Default)]
pub struct RecipientFilter {
    recipients: BTreeSet<String>,
}

impl RecipientFilter {
    pub fn new<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, key: &EncryptedKey) -> bool {
        match &key.recipient {
            Some(recipient) if !self.recipients.is_empty() => self.recipients.contains(recipient),
            _ => true,
        }
    }
}

/// Keys placed directly inside the `EncryptedData`'s own `KeyInfo`.
#[derive(Debug, Clone, Default)]
pub struct InlineEncryptedKeyResolver {
    filter: RecipientFilter,
}

impl InlineEncryptedKeyResolver {
    pub fn new(filter: RecipientFilter) -> Self {
        Self { filter }
    }
}

impl EncryptedKeyResolver for InlineEncryptedKeyResolver {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn resolve(&self, element: &EncryptedElement) -> Vec<EncryptedKey> {
        let Some(key_info) = &element.encrypted_data.key_info else {
            return Vec::new();
        };
        key_info
            .encrypted_keys
            .iter()
            .filter(|k| self.filter.matches(k))
            .cloned()
            .collect()
    }
}

/// Keys carried as siblings of the `EncryptedData` inside a SAML
/// `EncryptedElementType`.
#[derive(Debug, Clone, Default)]
pub struct EncryptedElementTypeEncryptedKeyResolver {
    filter: RecipientFilter,
}

impl EncryptedElementTypeEncryptedKeyResolver {
    pub fn new(filter: RecipientFilter) -> Self {
        Self { filter }
    }
}

impl EncryptedKeyResolver for EncryptedElementTypeEncryptedKeyResolver {
    fn name(&self) -> &'static str {
        "encrypted-element-type"
    }

    fn resolve(&self, element: &EncryptedElement) -> Vec<EncryptedKey> {
        element
            .encrypted_keys
            .iter()
            .filter(|k| self.filter.matches(k) && k.references(&element.encrypted_data))
            .cloned()
            .collect()
    }
}

/// Keys reached through a same-document `RetrievalMethod` of type
/// [`ENCRYPTED_KEY_TYPE`]. The target may be a sibling or any other
/// `EncryptedKey` in the document.
#[derive(Debug, Clone, Default)]
pub struct SimpleRetrievalMethodEncryptedKeyResolver {
    filter: RecipientFilter,
}

impl SimpleRetrievalMethodEncryptedKeyResolver {
    pub fn new(filter: RecipientFilter) -> Self {
        Self { filter }
    }
}

impl EncryptedKeyResolver for SimpleRetrievalMethodEncryptedKeyResolver {
    fn name(&self) -> &'static str {
        "retrieval-method"
    }

    fn resolve(&self, element: &EncryptedElement) -> Vec<EncryptedKey> {
        let Some(key_info) = &element.encrypted_data.key_info else {
            return Vec::new();
        };

        let mut keys = Vec::new();
        for method in &key_info.retrieval_methods {
            if method.type_uri.as_deref() != Some(ENCRYPTED_KEY_TYPE) {
                continue;
            }
            let Some(id) = method.uri.strip_prefix('#') else {
                debug!("Skipping non same-document RetrievalMethod {}", method.uri);
                continue;
            };
            match element.key_by_id(id) {
                Some(key) if self.filter.matches(key) => keys.push(key.clone()),
                Some(_) => debug!("EncryptedKey {} is addressed to another recipient", id),
                None => debug!("RetrievalMethod target {} not found", id),
            }
        }
        keys
    }
}

/// Tries each strategy in order; the first non-empty result wins.
pub struct ChainingEncryptedKeyResolver {
    chain: Vec<Box<dyn EncryptedKeyResolver>>,
}

impl ChainingEncryptedKeyResolver {
    pub fn new(chain: Vec<Box<dyn EncryptedKeyResolver>>) -> Self {
        Self { chain }
    }

    /// Inline, then encrypted-element type, then retrieval method.
    pub fn standard() -> Self {
        Self::with_recipients(RecipientFilter::default())
    }

    /// The standard chain with every strategy restricted to `filter`.
    pub fn with_recipients(filter: RecipientFilter) -> Self {
        Self::new(vec![
            Box::new(InlineEncryptedKeyResolver::new(filter.clone())),
            Box::new(EncryptedElementTypeEncryptedKeyResolver::new(filter.clone())),
            Box::new(SimpleRetrievalMethodEncryptedKeyResolver::new(filter)),
        ])
    }

    /// Strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|r| r.name()).collect()
    }
}

impl EncryptedKeyResolver for ChainingEncryptedKeyResolver {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn resolve(&self, element: &EncryptedElement) -> Vec<EncryptedKey> {
        for resolver in &self.chain {
            let keys = resolver.resolve(element);
            if !keys.is_empty() {
                debug!("EncryptedKey located by {} strategy", resolver.name());
                return keys;
            }
            debug!("No EncryptedKey from {} strategy, trying next", resolver.name());
        }
        Vec::new()
    }
}

impl std::fmt::Debug for ChainingEncryptedKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainingEncryptedKeyResolver")
            .field("chain", &self.strategy_names())
            .finish()
    }
}
