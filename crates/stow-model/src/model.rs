//! Model type descriptors.
//!
//! A [`ModelType`] is the process-lifetime description of one kind of
//! record: its name, bound key factory, store, declared attributes,
//! associations and validation hooks. It is shared (`Arc`) across threads;
//! the records it describes are not.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use stow_store::{AdapterRegistry, StoreAdapter, StoreSpec};
use stow_types::{Attributes, Key, KeyType};
use tracing::debug;

use crate::config::StowConfig;
use crate::embedded::EmbeddedList;
use crate::error::{ModelError, ModelResult};
use crate::identity::{Identity, KeyFactory, KeySpec};
use crate::naming;
use crate::record::Record;
use crate::reference::Reference;
use crate::validation::{EmbeddedValid, Hook, Validator};

/// Name of the identifier attribute.
pub const ID: &str = "id";

/// A declared attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    /// Set for `id` and foreign keys; values are cast to this key type.
    pub key_type: Option<KeyType>,
    /// Virtual attributes live on the instance but are never persisted.
    pub is_virtual: bool,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_type: None,
            is_virtual: false,
        }
    }

    pub fn key(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            key_type: Some(key_type),
            ..Self::new(name)
        }
    }

    pub fn virtual_attribute(name: impl Into<String>) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(name)
        }
    }
}

/// Process-unique identity of a built [`ModelType`].
///
/// Names are labels only; two types built with the same name still get
/// distinct ids and never share identity-map entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelTypeId(u64);

impl ModelTypeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Description of one model type.
pub struct ModelType {
    type_id: ModelTypeId,
    name: String,
    identity: Identity,
    store: RwLock<Option<Arc<dyn StoreAdapter>>>,
    identity_map_on: AtomicBool,
    attributes: RwLock<BTreeMap<String, AttributeDef>>,
    references: RwLock<BTreeMap<String, Arc<Reference>>>,
    embedded_lists: RwLock<BTreeMap<String, Arc<EmbeddedList>>>,
    validators: RwLock<Vec<Arc<dyn Validator>>>,
    before_validation: RwLock<Vec<Hook>>,
}

impl ModelType {
    /// Start declaring a model type with defaults taken from `config`.
    pub fn builder(name: impl Into<String>, config: &StowConfig) -> ModelTypeBuilder<'_> {
        ModelTypeBuilder {
            name: name.into(),
            config,
            key: None,
            store: None,
            identity_map: None,
            attributes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_id(&self) -> ModelTypeId {
        self.type_id
    }

    // ---- Identity ----

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn key_factory(&self) -> &Arc<dyn KeyFactory> {
        self.identity.factory()
    }

    pub fn key_type(&self) -> KeyType {
        self.identity.key_type()
    }

    /// Generate a key for a new instance of this type.
    pub fn next_key(&self, hint: Option<&Attributes>) -> ModelResult<Key> {
        self.identity.next_key(&self.name, hint)
    }

    // ---- Store ----

    /// The configured store, or `NoStore` if none has been set.
    pub fn store(&self) -> ModelResult<Arc<dyn StoreAdapter>> {
        read(&self.store).clone().ok_or_else(|| ModelError::NoStore {
            model: self.name.clone(),
        })
    }

    pub fn has_store(&self) -> bool {
        read(&self.store).is_some()
    }

    /// Swap the store adapter. Records already loaded keep their state.
    pub fn set_store(&self, store: Arc<dyn StoreAdapter>) {
        debug!(model = %self.name, store = store.name(), "store set");
        *write(&self.store) = Some(store);
    }

    /// Open `spec` through `registry` and use it as this type's store.
    ///
    /// An empty spec leaves the store unchanged and returns the current one,
    /// failing with `NoStore` if none was ever set.
    pub fn use_store(
        &self,
        registry: &AdapterRegistry,
        spec: &StoreSpec,
    ) -> ModelResult<Arc<dyn StoreAdapter>> {
        if let Some(store) = registry.open(spec)? {
            self.set_store(Arc::clone(&store));
        }
        self.store()
    }

    pub(crate) fn store_name(&self) -> String {
        read(&self.store)
            .as_ref()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "none".into())
    }

    // ---- Identity map flag ----

    pub fn is_identity_map_on(&self) -> bool {
        self.identity_map_on.load(Ordering::SeqCst)
    }

    pub fn identity_map_on(&self) {
        self.identity_map_on.store(true, Ordering::SeqCst);
    }

    pub fn identity_map_off(&self) {
        self.identity_map_on.store(false, Ordering::SeqCst);
    }

    pub(crate) fn swap_identity_map(&self, enabled: bool) -> bool {
        self.identity_map_on.swap(enabled, Ordering::SeqCst)
    }

    // ---- Attributes ----

    /// Declare (or redeclare) an attribute.
    pub fn declare_attribute(&self, def: AttributeDef) {
        write(&self.attributes).insert(def.name.clone(), def);
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeDef> {
        read(&self.attributes).get(name).cloned()
    }

    /// Declared attribute names, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        read(&self.attributes).keys().cloned().collect()
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        read(&self.attributes)
            .get(name)
            .is_some_and(|def| def.is_virtual)
    }

    /// Cast a value written to `name` according to its declaration.
    ///
    /// Key-typed attributes (`id` and foreign keys) are cast to their key
    /// type; every other value passes through untouched.
    pub(crate) fn coerce(&self, name: &str, value: Value) -> ModelResult<Value> {
        let key_type = read(&self.attributes).get(name).and_then(|def| def.key_type);
        match key_type {
            Some(key_type) => match Key::from_value(&value)? {
                Some(key) => Ok(key.cast(key_type)?.to_value()),
                None => Ok(Value::Null),
            },
            None => Ok(value),
        }
    }

    // ---- References ----

    /// Declare a reference to `target`, backed by `<singular name>_id`.
    pub fn reference(&self, name: &str, target: &Arc<ModelType>) -> Arc<Reference> {
        self.reference_with_key(name, target, &naming::foreign_key(name))
    }

    /// Declare a reference to `target` backed by the attribute `key`.
    pub fn reference_with_key(
        &self,
        name: &str,
        target: &Arc<ModelType>,
        key: &str,
    ) -> Arc<Reference> {
        let reference = Arc::new(Reference::new(&self.name, name, key, Arc::clone(target)));
        self.declare_attribute(AttributeDef::key(key, target.key_type()));
        write(&self.references).insert(name.to_string(), Arc::clone(&reference));
        debug!(model = %self.name, reference = name, target = target.name(), key, "reference declared");
        reference
    }

    pub fn reference_named(&self, name: &str) -> Option<Arc<Reference>> {
        read(&self.references).get(name).cloned()
    }

    pub fn is_reference(&self, name: &str) -> bool {
        read(&self.references).contains_key(name)
    }

    pub fn references(&self) -> Vec<Arc<Reference>> {
        read(&self.references).values().cloned().collect()
    }

    // ---- Embedded lists ----

    /// Declare a list of `child` records stored inside this type's records.
    pub fn embedded_list(&self, name: &str, child: &Arc<ModelType>) -> Arc<EmbeddedList> {
        let list = Arc::new(EmbeddedList::new(&self.name, name, Arc::clone(child)));
        write(&self.embedded_lists).insert(name.to_string(), Arc::clone(&list));
        list
    }

    pub fn embedded_list_named(&self, name: &str) -> Option<Arc<EmbeddedList>> {
        read(&self.embedded_lists).get(name).cloned()
    }

    pub fn is_embedded_list(&self, name: &str) -> bool {
        read(&self.embedded_lists).contains_key(name)
    }

    pub fn embedded_lists(&self) -> Vec<Arc<EmbeddedList>> {
        read(&self.embedded_lists).values().cloned().collect()
    }

    pub(crate) fn embedded_list_for_attribute(&self, attribute: &str) -> Option<Arc<EmbeddedList>> {
        read(&self.embedded_lists)
            .values()
            .find(|list| list.attribute() == attribute)
            .cloned()
    }

    // ---- Validation hooks ----

    pub fn validate(&self, validator: impl Validator + 'static) {
        write(&self.validators).push(Arc::new(validator));
    }

    /// Mark the record invalid whenever a child in list `name` is invalid.
    pub fn validates_embedded(&self, name: &str) {
        self.validate(EmbeddedValid::new(name));
    }

    pub fn before_validation<F>(&self, hook: F)
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        write(&self.before_validation).push(Arc::new(hook));
    }

    pub(crate) fn validators(&self) -> Vec<Arc<dyn Validator>> {
        read(&self.validators).clone()
    }

    pub(crate) fn before_validation_hooks(&self) -> Vec<Hook> {
        read(&self.before_validation).clone()
    }
}

impl std::fmt::Debug for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("key_type", &self.key_type())
            .field("store", &self.store_name())
            .field("identity_map_on", &self.is_identity_map_on())
            .field("references", &read(&self.references).keys().collect::<Vec<_>>())
            .field("embedded_lists", &read(&self.embedded_lists).keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder returned by [`ModelType::builder`].
pub struct ModelTypeBuilder<'a> {
    name: String,
    config: &'a StowConfig,
    key: Option<KeySpec>,
    store: Option<Arc<dyn StoreAdapter>>,
    identity_map: Option<bool>,
    attributes: Vec<AttributeDef>,
}

impl ModelTypeBuilder<'_> {
    /// Bind a key factory instead of the config's default.
    pub fn key(mut self, spec: impl Into<KeySpec>) -> Self {
        self.key = Some(spec.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn StoreAdapter>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the config's identity map default for this type.
    pub fn identity_map(mut self, enabled: bool) -> Self {
        self.identity_map = Some(enabled);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeDef::new(name));
        self
    }

    pub fn virtual_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeDef::virtual_attribute(name));
        self
    }

    pub fn build(self) -> ModelResult<Arc<ModelType>> {
        let identity = match self.key {
            Some(spec) => Identity::from_spec(spec)?,
            None => Identity::new(self.config.key_factory()?),
        };

        let mut attributes = BTreeMap::new();
        attributes.insert(ID.to_string(), AttributeDef::key(ID, identity.key_type()));
        for def in self.attributes {
            attributes.insert(def.name.clone(), def);
        }

        let model = ModelType {
            type_id: ModelTypeId::next(),
            name: self.name,
            identity,
            store: RwLock::new(self.store),
            identity_map_on: AtomicBool::new(self.identity_map.unwrap_or(self.config.identity_map)),
            attributes: RwLock::new(attributes),
            references: RwLock::new(BTreeMap::new()),
            embedded_lists: RwLock::new(BTreeMap::new()),
            validators: RwLock::new(Vec::new()),
            before_validation: RwLock::new(Vec::new()),
        };
        debug!(model = %model.name, key_type = %model.key_type(), "model type built");
        Ok(Arc::new(model))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
