use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use stow_types::{attributes, Attributes, Key};

use crate::error::{StoreError, StoreResult};
use crate::traits::StoreAdapter;

/// Raw storage shared by memory adapters: encoded key to encoded value.
///
/// Cloning a client shares the underlying map, so two adapters built over
/// the same client see the same data.
#[derive(Clone, Default)]
pub struct MemoryClient {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes stored under an encoded key.
    pub fn get(&self, raw_key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().map_err(poisoned)?;
        Ok(map.get(raw_key).cloned())
    }

    /// Number of entries across every adapter sharing this client.
    ///
    /// Still counts the entries after a writer panicked and poisoned the
    /// lock; reads and writes report that as a backend error instead.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) -> StoreResult<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("entry_count", &self.len())
            .finish()
    }
}

/// In-memory, HashMap-based store adapter.
///
/// Intended for tests and embedding. Values are JSON-encoded on write and
/// decoded on every read, so callers never share a stored map.
pub struct InMemoryStore {
    client: MemoryClient,
    namespace: Option<String>,
}

impl InMemoryStore {
    /// Create a store over a fresh, private client.
    pub fn new() -> Self {
        Self::with_client(MemoryClient::new())
    }

    /// Create a store over an existing client.
    pub fn with_client(client: MemoryClient) -> Self {
        Self {
            client,
            namespace: None,
        }
    }

    /// Prefix every raw key with `namespace:`.
    pub fn namespaced(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The raw client backing this adapter.
    pub fn client(&self) -> &MemoryClient {
        &self.client
    }

    /// Raw client key a model key is stored under.
    pub fn key_for(&self, key: &Key) -> String {
        let encoded = match key {
            Key::Str(s) => format!("s:{s}"),
            Key::Int(n) => format!("i:{n}"),
        };
        match &self.namespace {
            Some(ns) => format!("{ns}:{encoded}"),
            None => encoded,
        }
    }

    pub fn encode(&self, attrs: &Attributes) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(attrs)?)
    }

    pub fn decode(&self, bytes: &[u8]) -> StoreResult<Attributes> {
        let value: Value = serde_json::from_slice(bytes)?;
        attributes::from_object(value)
            .ok_or_else(|| StoreError::Serialization("stored value is not an object".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreAdapter for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, key: &Key) -> StoreResult<Option<Attributes>> {
        match self.client.get(&self.key_for(key))? {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &Key, attrs: &Attributes) -> StoreResult<()> {
        let bytes = self.encode(attrs)?;
        let mut map = self.client.entries.write().map_err(poisoned)?;
        map.insert(self.key_for(key), bytes);
        Ok(())
    }

    fn delete(&self, key: &Key) -> StoreResult<bool> {
        let mut map = self.client.entries.write().map_err(poisoned)?;
        Ok(map.remove(&self.key_for(key)).is_some())
    }

    fn key_exists(&self, key: &Key) -> StoreResult<bool> {
        let map = self.client.entries.read().map_err(poisoned)?;
        Ok(map.contains_key(&self.key_for(key)))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("namespace", &self.namespace)
            .field("entry_count", &self.client.len())
            .finish()
    }
}

fn poisoned<T>(e: PoisonError<T>) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {e}"))
}
