//! Scoped identity map.
//!
//! An [`IdentityScope`] is owned by one unit of work (a request, a job) and
//! passed by `&mut` into every load and save. Within a scope at most one
//! live [`Record`] exists per `(model type, key)` while the map is enabled
//! for that type. Scopes are never shared between units of work: create one
//! per unit, and `clear` or drop it when the unit ends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use stow_types::{Attributes, Key};

use crate::error::ModelResult;
use crate::logging::{log_operation, Operation};
use crate::model::{ModelType, ModelTypeId, ID};
use crate::record::{Lifecycle, Record};

/// Cache of live records for one unit of work, keyed by model type and key.
///
/// Model types are told apart by [`ModelTypeId`], so two types sharing a
/// name never see each other's records.
#[derive(Default)]
pub struct IdentityScope {
    entries: HashMap<ModelTypeId, TypeEntries>,
}

struct TypeEntries {
    name: String,
    records: HashMap<Key, Record>,
}

impl IdentityScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &ModelType, id: &Key) -> Option<Record> {
        self.entries.get(&model.model_id())?.records.get(id).cloned()
    }

    /// Cache `record` under its model type and id, returning the record it
    /// displaced. Records without an id are not cached.
    pub fn insert(&mut self, record: &Record) -> Option<Record> {
        let id = record.id()?;
        let model = record.model();
        self.entries
            .entry(model.model_id())
            .or_insert_with(|| TypeEntries {
                name: model.name().to_string(),
                records: HashMap::new(),
            })
            .records
            .insert(id, record.clone())
    }

    pub fn remove(&mut self, model: &ModelType, id: &Key) -> Option<Record> {
        let type_id = model.model_id();
        let entries = self.entries.get_mut(&type_id)?;
        let removed = entries.records.remove(id);
        if entries.records.is_empty() {
            self.entries.remove(&type_id);
        }
        removed
    }

    pub fn contains(&self, model: &ModelType, id: &Key) -> bool {
        self.entries
            .get(&model.model_id())
            .is_some_and(|entries| entries.records.contains_key(id))
    }

    /// Number of cached records across all model types.
    pub fn len(&self) -> usize {
        self.entries.values().map(|entries| entries.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every cached record.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for IdentityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<_> = self
            .entries
            .values()
            .map(|entries| (entries.name.as_str(), entries.records.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("IdentityScope").field("records", &counts).finish()
    }
}

/// Restores a model type's identity map flag when dropped.
struct IdentityMapGuard<'a> {
    model: &'a ModelType,
    previous: bool,
}

impl Drop for IdentityMapGuard<'_> {
    fn drop(&mut self) {
        self.model.swap_identity_map(self.previous);
    }
}

impl ModelType {
    /// The cached record for `id`, if the map is on and holds one.
    pub fn get_from_identity_map(&self, scope: &IdentityScope, id: &Key) -> Option<Record> {
        if !self.is_identity_map_on() {
            return None;
        }
        let record = scope.get(self, id)?;
        log_operation(Operation::MapGet, self, id, None);
        Some(record)
    }

    /// Turn `attrs` read for `id` into a record.
    ///
    /// `None` attributes mean the record does not exist. When the map is on
    /// and already holds `id`, the cached record is returned as-is and
    /// `attrs` are ignored: the live instance wins over the store.
    pub fn load(
        self: &Arc<Self>,
        scope: &mut IdentityScope,
        id: &Key,
        attrs: Option<Attributes>,
    ) -> ModelResult<Option<Record>> {
        let Some(mut attrs) = attrs else {
            return Ok(None);
        };
        if self.is_identity_map_on() {
            if let Some(record) = scope.get(self, id) {
                return Ok(Some(record));
            }
        }
        attrs.insert(ID.to_string(), id.to_value());
        let record = Record::instantiate(self, attrs, Lifecycle::Persisted)?;
        record.add_to_identity_map(scope);
        Ok(Some(record))
    }

    /// Run `f` with the identity map off for this type.
    ///
    /// The previous flag is restored when `f` returns, including when it
    /// returns an error or panics.
    pub fn without_identity_map<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = IdentityMapGuard {
            model: self,
            previous: self.swap_identity_map(false),
        };
        f()
    }
}

impl Record {
    /// Cache this record in `scope`. No-op when the map is off for its type.
    pub fn add_to_identity_map(&self, scope: &mut IdentityScope) {
        let model = self.model();
        if !model.is_identity_map_on() {
            return;
        }
        let Some(id) = self.id() else {
            return;
        };
        scope.insert(self);
        log_operation(Operation::MapSet, &model, &id, None);
    }

    /// Drop this record from `scope`. No-op when the map is off for its type.
    pub fn remove_from_identity_map(&self, scope: &mut IdentityScope) {
        let model = self.model();
        if !model.is_identity_map_on() {
            return;
        }
        let Some(id) = self.id() else {
            return;
        };
        scope.remove(&model, &id);
        log_operation(Operation::MapDelete, &model, &id, None);
    }
}
