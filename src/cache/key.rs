//! Key Hasher Module
//!
//! Turns ordered compound keys into a canonical string form, a compact stable
//! digest used as the primary key, and a prefix used to group entries.

use serde_json::{Map, Value};

use crate::error::Result;

/// Hex characters kept from the digest (64 bits).
const DIGEST_LEN: usize = 16;

// == Compound Key ==
/// An ordered list of plain values identifying one cached query result.
///
/// ```ignore
/// let key = CompoundKey::from(json!(["docs", 42, { "archived": false }]));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompoundKey(Vec<Value>);

impl CompoundKey {
    // == Constructor ==
    /// Builds a key from its parts in order.
    pub fn new<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the key's parts.
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    // == Canonical ==
    /// Serializes the key into its canonical string form.
    ///
    /// Object members are emitted with sorted keys, so two keys holding
    /// equal maps built in different insertion orders serialize identically.
    pub fn canonical(&self) -> String {
        let parts = self.0.iter().map(canonicalize).collect();
        Value::Array(parts).to_string()
    }

    // == Parse Canonical ==
    /// Recovers a key from its canonical form.
    ///
    /// Fails when the text is not JSON or is not an array.
    pub fn parse_canonical(canonical: &str) -> Result<Self> {
        let parts: Vec<Value> = serde_json::from_str(canonical)?;
        Ok(Self(parts))
    }

    // == Hash ==
    /// Returns the compact digest of the canonical form.
    pub fn hash(&self) -> String {
        hash_canonical(&self.canonical())
    }

    // == Prefix ==
    /// Returns the classifier derived from the first element.
    ///
    /// Strings are used verbatim, any other value by its canonical JSON text.
    /// An empty key has an empty prefix.
    pub fn prefix(&self) -> String {
        match self.0.first() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => canonicalize(other).to_string(),
            None => String::new(),
        }
    }
}

impl From<Value> for CompoundKey {
    /// Arrays become the key's parts; any other value becomes a one-part key.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(parts) => Self(parts),
            other => Self(vec![other]),
        }
    }
}

impl From<Vec<Value>> for CompoundKey {
    fn from(parts: Vec<Value>) -> Self {
        Self(parts)
    }
}

// == Hash Canonical ==
/// Digests a canonical key string with BLAKE3, truncated to 64 bits of hex.
pub fn hash_canonical(canonical: &str) -> String {
    let hash = blake3::hash(canonical.as_bytes());
    hash.to_hex().as_str()[..DIGEST_LEN].to_string()
}

/// Rebuilds a value with every object's members in sorted key order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
