//! Create, read, update and delete against a model type's store.
//!
//! Each persistence action issues exactly one store operation for the
//! record itself. Embedded children ride along in their parent's write and
//! only have their lifecycle flipped afterwards.

use std::sync::Arc;

use serde::Serialize;
use stow_types::attributes::from_object;
use stow_types::{Attributes, Key};
use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};
use crate::identity_map::IdentityScope;
use crate::logging::{log_operation, Operation};
use crate::model::{ModelType, ID};
use crate::record::{Lifecycle, Record};

/// Options for [`Record::save_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run validation first; an invalid record is not written.
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

impl ModelType {
    /// A new, unsaved record with `attrs` assigned.
    pub fn build(self: &Arc<Self>, attrs: Attributes) -> ModelResult<Record> {
        Record::instantiate(self, attrs, Lifecycle::New)
    }

    /// A new, unsaved record from any value serializing to an object.
    pub fn build_with<T: Serialize>(self: &Arc<Self>, value: &T) -> ModelResult<Record> {
        let attrs = from_object(serde_json::to_value(value)?).ok_or_else(|| {
            ModelError::Serialization(format!("{} attributes must be an object", self.name()))
        })?;
        self.build(attrs)
    }

    /// Build and save a record. Check `is_persisted` to see whether it was
    /// valid; use [`ModelType::create_strict`] to get an error instead.
    pub fn create(self: &Arc<Self>, scope: &mut IdentityScope, attrs: Attributes) -> ModelResult<Record> {
        let record = self.build(attrs)?;
        record.save(scope)?;
        Ok(record)
    }

    /// Like [`ModelType::create`], failing with `RecordInvalid`.
    pub fn create_strict(
        self: &Arc<Self>,
        scope: &mut IdentityScope,
        attrs: Attributes,
    ) -> ModelResult<Record> {
        let record = self.build(attrs)?;
        record.save_strict(scope)?;
        Ok(record)
    }

    /// Load the record stored under `id`; `Ok(None)` when there is none.
    ///
    /// The identity map is consulted first, so repeated gets within one
    /// scope return the same instance.
    pub fn get(self: &Arc<Self>, scope: &mut IdentityScope, id: impl Into<Key>) -> ModelResult<Option<Record>> {
        let id = id.into().cast(self.key_type())?;
        if let Some(record) = self.get_from_identity_map(scope, &id) {
            return Ok(Some(record));
        }
        let attrs = self.store()?.read(&id)?;
        log_operation(Operation::Get, self, &id, attrs.as_ref());
        self.load(scope, &id, attrs)
    }

    /// Like [`ModelType::get`], failing with `NotFound`.
    pub fn get_strict(self: &Arc<Self>, scope: &mut IdentityScope, id: impl Into<Key>) -> ModelResult<Record> {
        let id = id.into();
        self.get(scope, id.clone())?.ok_or_else(|| ModelError::NotFound {
            model: self.name().to_string(),
            id: id.to_string(),
        })
    }

    /// Load several ids; missing ones come back as `None` in place.
    pub fn get_many<I, K>(self: &Arc<Self>, scope: &mut IdentityScope, ids: I) -> ModelResult<Vec<Option<Record>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        ids.into_iter().map(|id| self.get(scope, id)).collect()
    }

    /// Whether the store holds a record under `id`.
    pub fn key_exists(&self, id: &Key) -> ModelResult<bool> {
        Ok(self.store()?.key_exists(id)?)
    }

    /// Delete every record in `ids`; ids with no record are skipped.
    pub fn delete_ids<I, K>(self: &Arc<Self>, scope: &mut IdentityScope, ids: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        for id in ids {
            if let Some(record) = self.get(scope, id)? {
                record.delete(scope)?;
            }
        }
        Ok(())
    }

    /// Destroy every record in `ids`; ids with no record are skipped.
    pub fn destroy_ids<I, K>(self: &Arc<Self>, scope: &mut IdentityScope, ids: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        for id in ids {
            if let Some(record) = self.get(scope, id)? {
                record.destroy(scope)?;
            }
        }
        Ok(())
    }
}

impl Record {
    /// Validate and write this record.
    ///
    /// Returns `Ok(false)` without writing when validation fails. Embedded
    /// children save their parent, and only while it still lists them.
    pub fn save(&self, scope: &mut IdentityScope) -> ModelResult<bool> {
        self.save_with(scope, SaveOptions::default())
    }

    pub fn save_with(&self, scope: &mut IdentityScope, options: SaveOptions) -> ModelResult<bool> {
        if self.is_destroyed() {
            return Err(self.destroyed_error());
        }
        if options.validate && !self.is_valid() {
            debug!(model = %self.model_name(), errors = ?self.errors(), "save rejected");
            return Ok(false);
        }
        if let Some(parent) = self.parent() {
            if !parent.holds_embedded(self) {
                debug!(model = %self.model_name(), parent = %parent.model_name(), "save rejected: not in parent's lists");
                let message = format!("{} is not embedded in {}", self.model_name(), parent.model_name());
                self.doc_mut().errors.push(message);
                return Ok(false);
            }
            return parent.save_with(scope, options);
        }
        if !self.save_pending(scope, options)? {
            return Ok(false);
        }
        self.persist()?;
        self.add_to_identity_map(scope);
        Ok(true)
    }

    /// Like [`Record::save`], failing with `RecordInvalid`.
    pub fn save_strict(&self, scope: &mut IdentityScope) -> ModelResult<()> {
        if self.save(scope)? {
            Ok(())
        } else {
            Err(ModelError::RecordInvalid {
                model: self.model_name(),
                errors: self.errors(),
            })
        }
    }

    /// Merge `attrs` into the record, then save it.
    pub fn update_attributes(&self, scope: &mut IdentityScope, attrs: Attributes) -> ModelResult<bool> {
        self.set_attributes(attrs)?;
        self.save(scope)
    }

    /// Remove the record from its store and mark it destroyed.
    ///
    /// A record that was never saved is only marked. Deleting twice is a
    /// no-op. An embedded child is detached from its parent instead; the
    /// parent's next save drops it from the store.
    pub fn delete(&self, scope: &mut IdentityScope) -> ModelResult<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        if let Some(parent) = self.parent() {
            parent.detach_embedded(self);
        } else if let (Lifecycle::Persisted, Some(id)) = (self.state(), self.id()) {
            let model = self.model();
            let existed = model.store()?.delete(&id)?;
            log_operation(Operation::Delete, &model, &id, None);
            if !existed {
                debug!(model = %model.name(), key = %id, "deleted key was not stored");
            }
        }
        self.mark(Lifecycle::Destroyed);
        self.remove_from_identity_map(scope);
        Ok(())
    }

    pub fn destroy(&self, scope: &mut IdentityScope) -> ModelResult<()> {
        self.delete(scope)
    }

    /// Re-read this record's attributes from the store in place.
    ///
    /// Cached reference targets and unsaved built targets are dropped, and
    /// the record becomes the scope's instance for its id. If the stored
    /// snapshot cannot be applied the record is left as it was.
    pub fn reload(&self, scope: &mut IdentityScope) -> ModelResult<()> {
        let model = self.model();
        let not_found = || ModelError::NotFound {
            model: model.name().to_string(),
            id: self.id().map(|id| id.to_string()).unwrap_or_default(),
        };
        let id = self.id().ok_or_else(not_found)?;
        let attrs = model.store()?.read(&id)?;
        log_operation(Operation::Get, &model, &id, attrs.as_ref());
        let mut attrs = attrs.ok_or_else(not_found)?;
        attrs.insert(ID.to_string(), id.to_value());

        let fresh = Record::instantiate(&model, attrs, Lifecycle::Persisted)?;
        let (attributes, embedded) = {
            let mut doc = fresh.doc_mut();
            (
                std::mem::take(&mut doc.attributes),
                std::mem::take(&mut doc.embedded),
            )
        };
        for child in embedded.values().flatten() {
            child.set_parent(self);
        }
        {
            let mut doc = self.doc_mut();
            doc.attributes = attributes;
            doc.embedded = embedded;
            doc.memo.clear();
            doc.pending.clear();
            doc.state = Lifecycle::Persisted;
        }
        self.add_to_identity_map(scope);
        Ok(())
    }

    fn destroyed_error(&self) -> ModelError {
        ModelError::Destroyed {
            model: self.model_name(),
            id: self.id().map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    /// The record's id, generating one if it has none yet.
    fn ensure_id(&self) -> ModelResult<Key> {
        if let Some(id) = self.id() {
            return Ok(id);
        }
        let model = self.model();
        let hint = self.doc().attributes.clone();
        let id = model.next_key(Some(&hint))?;
        self.doc_mut().id = Some(id.clone());
        Ok(id)
    }

    /// Write the persisted snapshot and flip the lifecycle of this record
    /// and its embedded children.
    fn persist(&self) -> ModelResult<()> {
        let model = self.model();
        let store = model.store()?;
        let id = self.ensure_id()?;
        let attrs = self.persisted_attributes();
        store.write(&id, &attrs)?;
        log_operation(Operation::Set, &model, &id, Some(&attrs));
        self.mark_persisted();
        Ok(())
    }

    fn mark_persisted(&self) {
        self.mark(Lifecycle::Persisted);
        for child in self.each_embedded_object() {
            child.mark_persisted();
        }
    }

    /// Save targets built through this record's references.
    ///
    /// A built target is only saved while the foreign key still points at
    /// it. Returns `false` if a target failed validation.
    fn save_pending(&self, scope: &mut IdentityScope, options: SaveOptions) -> ModelResult<bool> {
        let pending = std::mem::take(&mut self.doc_mut().pending);
        let model = self.model();
        let mut remaining = pending.clone();
        for (name, target) in pending {
            let Some(reference) = model.reference_named(&name) else {
                remaining.remove(&name);
                continue;
            };
            let points_at_target = self
                .get(reference.key())
                .map(|fk| Some(fk) == target.id().map(|id| id.to_value()))
                .unwrap_or(false);
            if !points_at_target {
                warn!(model = %model.name(), reference = %name, "dropping built target no longer referenced");
                remaining.remove(&name);
                continue;
            }
            if !target.save_with(scope, options)? {
                self.doc_mut().errors.push(format!("{name} is invalid"));
                self.doc_mut().pending = remaining;
                return Ok(false);
            }
            remaining.remove(&name);
        }
        Ok(true)
    }
}
