use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryStore, MemoryClient};
use crate::traits::StoreAdapter;

/// Opaque handle an adapter drives (connection, shared map, ...).
pub type Client = Arc<dyn Any + Send + Sync>;

/// Adapter-specific options, e.g. `namespace` for the memory adapter.
pub type AdapterOptions = BTreeMap<String, Value>;

type Constructor = Box<dyn Fn(&Client, &AdapterOptions) -> StoreResult<Arc<dyn StoreAdapter>> + Send + Sync>;

/// Request for a store: adapter name, the client it drives, and options.
///
/// Name and client must be given together; giving neither means "no store".
#[derive(Clone, Default)]
pub struct StoreSpec {
    pub adapter: Option<String>,
    pub client: Option<Client>,
    pub options: AdapterOptions,
}

impl StoreSpec {
    pub fn new(adapter: impl Into<String>, client: Client) -> Self {
        Self {
            adapter: Some(adapter.into()),
            client: Some(client),
            options: AdapterOptions::new(),
        }
    }

    /// A memory adapter spec over `client`.
    pub fn memory(client: MemoryClient) -> Self {
        Self::new("memory", Arc::new(client))
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }
}

impl std::fmt::Debug for StoreSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSpec")
            .field("adapter", &self.adapter)
            .field("has_client", &self.client.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Named store adapter constructors.
///
/// [`AdapterRegistry::default`] knows the `"memory"` adapter; backends
/// living in other crates register themselves with [`AdapterRegistry::register`].
pub struct AdapterRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl AdapterRegistry {
    /// A registry with no adapters at all.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Client, &AdapterOptions) -> StoreResult<Arc<dyn StoreAdapter>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered adapter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Resolve a spec to an adapter.
    ///
    /// Returns `Ok(None)` when `spec` names neither adapter nor client.
    pub fn open(&self, spec: &StoreSpec) -> StoreResult<Option<Arc<dyn StoreAdapter>>> {
        match (&spec.adapter, &spec.client) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(StoreError::ClientRequired),
            (None, Some(_)) => Err(StoreError::AdapterRequired),
            (Some(name), Some(client)) => {
                let constructor = self
                    .constructors
                    .get(name)
                    .ok_or_else(|| StoreError::UnknownAdapter(name.clone()))?;
                let adapter = constructor(client, &spec.options)?;
                debug!(adapter = %name, options = spec.options.len(), "store adapter opened");
                Ok(Some(adapter))
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", memory_adapter);
        registry
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

fn memory_adapter(client: &Client, options: &AdapterOptions) -> StoreResult<Arc<dyn StoreAdapter>> {
    let client = client
        .downcast_ref::<MemoryClient>()
        .ok_or(StoreError::InvalidClient {
            adapter: "memory".into(),
            expected: "MemoryClient",
        })?;
    let mut store = InMemoryStore::with_client(client.clone());
    if let Some(ns) = options.get("namespace").and_then(Value::as_str) {
        store = store.namespaced(ns);
    }
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stow_types::{attributes, Key};

    #[test]
    fn empty_spec_opens_nothing() {
        let registry = AdapterRegistry::default();
        assert!(registry.open(&StoreSpec::default()).unwrap().is_none());
    }

    #[test]
    fn adapter_without_client_is_rejected() {
        let registry = AdapterRegistry::default();
        let spec = StoreSpec {
            adapter: Some("memory".into()),
            ..Default::default()
        };
        let err = registry.open(&spec).err().unwrap();
        assert!(matches!(err, StoreError::ClientRequired));
        assert_eq!(err.to_string(), "client is required");
    }

    #[test]
    fn client_without_adapter_is_rejected() {
        let registry = AdapterRegistry::default();
        let spec = StoreSpec {
            client: Some(Arc::new(MemoryClient::new())),
            ..Default::default()
        };
        assert!(matches!(registry.open(&spec), Err(StoreError::AdapterRequired)));
    }

    #[test]
    fn unknown_adapter_is_rejected() {
        let registry = AdapterRegistry::default();
        let spec = StoreSpec::new("redis", Arc::new(MemoryClient::new()));
        match registry.open(&spec) {
            Err(StoreError::UnknownAdapter(name)) => assert_eq!(name, "redis"),
            other => panic!("expected UnknownAdapter, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wrong_client_kind_is_rejected() {
        let registry = AdapterRegistry::default();
        let spec = StoreSpec::new("memory", Arc::new(42u32));
        assert!(matches!(
            registry.open(&spec),
            Err(StoreError::InvalidClient { .. })
        ));
    }

    #[test]
    fn memory_spec_opens_adapter_over_client() {
        let registry = AdapterRegistry::default();
        let client = MemoryClient::new();
        let store = registry
            .open(&StoreSpec::memory(client.clone()))
            .unwrap()
            .expect("adapter");
        assert_eq!(store.name(), "memory");

        store.write(&Key::from("a"), &attributes! { "x" => 1 }).unwrap();
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn namespace_option_is_applied() {
        let registry = AdapterRegistry::default();
        let client = MemoryClient::new();
        let spec = StoreSpec::memory(client.clone()).with_option("namespace", json!("users"));
        let store = registry.open(&spec).unwrap().unwrap();
        store.write(&Key::from("a"), &attributes! { "x" => 1 }).unwrap();

        assert!(client.get("users:s:a").unwrap().is_some());
    }

    #[test]
    fn custom_adapters_can_be_registered() {
        let mut registry = AdapterRegistry::empty();
        assert!(!registry.contains("memory"));
        registry.register("scratch", |_client: &Client, _options: &AdapterOptions| {
            Ok(Arc::new(InMemoryStore::new()) as Arc<dyn StoreAdapter>)
        });
        assert_eq!(registry.names(), vec!["scratch"]);

        let spec = StoreSpec::new("scratch", Arc::new(()));
        assert!(registry.open(&spec).unwrap().is_some());
    }
}
