//! Live model instances.
//!
//! A [`Record`] is a cheap, clonable handle to one in-memory instance.
//! Clones share state, so a record cached in an identity scope and the copy
//! a caller holds are the same object. Records are `!Send`: they live in
//! the execution context that loaded them.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use stow_types::attributes::to_object;
use stow_types::{Attributes, Key};

use crate::embedded::{take_embedded, EmbeddedList};
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelType, ID};

/// Persistence lifecycle of a record.
///
/// `New -> Persisted` on save, `New | Persisted -> Destroyed` on delete.
/// `Destroyed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    New,
    Persisted,
    Destroyed,
}

pub(crate) struct Document {
    pub(crate) model: Arc<ModelType>,
    pub(crate) id: Option<Key>,
    /// Plain attributes. `id` and embedded children are held separately.
    pub(crate) attributes: Attributes,
    pub(crate) state: Lifecycle,
    /// Embedded children by list name.
    pub(crate) embedded: BTreeMap<String, Vec<Record>>,
    /// Resolved reference targets by reference name. Weak, so records that
    /// reference each other do not keep each other alive.
    pub(crate) memo: HashMap<String, Weak<RefCell<Document>>>,
    /// Built reference targets saved before the owner's next save. Strong
    /// until then, since nothing else may hold them.
    pub(crate) pending: BTreeMap<String, Record>,
    pub(crate) parent: Option<Weak<RefCell<Document>>>,
    pub(crate) errors: Vec<String>,
}

/// Handle to one live model instance.
#[derive(Clone)]
pub struct Record(Rc<RefCell<Document>>);

impl Record {
    /// Materialize a record of `model` from an attribute snapshot.
    ///
    /// `id` is read out of `attrs` when present; otherwise the model's key
    /// factory is asked for one. A factory that yields no key leaves the
    /// record without an id until its first save.
    pub(crate) fn instantiate(
        model: &Arc<ModelType>,
        attrs: Attributes,
        state: Lifecycle,
    ) -> ModelResult<Record> {
        let record = Record(Rc::new(RefCell::new(Document {
            model: Arc::clone(model),
            id: None,
            attributes: Attributes::new(),
            state: Lifecycle::New,
            embedded: BTreeMap::new(),
            memo: HashMap::new(),
            pending: BTreeMap::new(),
            parent: None,
            errors: Vec::new(),
        })));
        record.assign(attrs, state)?;
        if record.id().is_none() {
            let hint = record.doc().attributes.clone();
            let key = model.identity().try_next_key(Some(&hint));
            record.doc_mut().id = key;
        }
        record.mark(state);
        Ok(record)
    }

    pub(crate) fn doc(&self) -> Ref<'_, Document> {
        self.0.borrow()
    }

    pub(crate) fn doc_mut(&self) -> RefMut<'_, Document> {
        self.0.borrow_mut()
    }

    pub fn model(&self) -> Arc<ModelType> {
        Arc::clone(&self.doc().model)
    }

    pub fn model_name(&self) -> String {
        self.doc().model.name().to_string()
    }

    pub fn id(&self) -> Option<Key> {
        self.doc().id.clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Document>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<Document>>) -> Option<Record> {
        weak.upgrade().map(Record)
    }

    /// Whether `self` and `other` are handles to the same instance.
    pub fn same_instance(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ---- Attributes ----

    /// Value of attribute `name`; absent and `null` both read as `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == ID {
            return self.id().map(|id| id.to_value());
        }
        let model = self.model();
        if let Some(list) = model.embedded_list_for_attribute(name) {
            return Some(self.embedded_value(&list, Record::attributes));
        }
        self.doc()
            .attributes
            .get(name)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Attribute `name` deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> ModelResult<Option<T>> {
        self.get(name)
            .map(serde_json::from_value)
            .transpose()
            .map_err(ModelError::from)
    }

    /// Write attribute `name`.
    ///
    /// `id` and foreign keys are cast to their key type. Writing a list's
    /// `<singular>_attributes` attribute replaces that embedded list.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        let value = value.into();
        if name == ID {
            return self.set_id(&value);
        }
        let model = self.model();
        if let Some(list) = model.embedded_list_for_attribute(name) {
            return self.assign_embedded(&list, value, Lifecycle::New);
        }
        let value = model.coerce(name, value)?;
        self.doc_mut().attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Write every attribute in `attrs`.
    pub fn set_attributes(&self, attrs: Attributes) -> ModelResult<()> {
        for (name, value) in attrs {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Snapshot of every attribute including `id` and embedded children.
    pub fn attributes(&self) -> Attributes {
        let model = self.model();
        let mut attrs = self.doc().attributes.clone();
        if let Some(id) = self.id() {
            attrs.insert(ID.to_string(), id.to_value());
        }
        for list in model.embedded_lists() {
            attrs.insert(
                list.attribute().to_string(),
                self.embedded_value(&list, Record::attributes),
            );
        }
        attrs
    }

    /// The snapshot written to the store.
    ///
    /// Excludes `id`, which is the store key, and virtual attributes.
    /// Embedded children are included with their own ids.
    pub fn persisted_attributes(&self) -> Attributes {
        let model = self.model();
        let mut attrs: Attributes = self
            .doc()
            .attributes
            .iter()
            .filter(|(name, _)| !model.is_virtual(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for list in model.embedded_lists() {
            attrs.insert(
                list.attribute().to_string(),
                self.embedded_value(&list, |child| {
                    let mut child_attrs = child.persisted_attributes();
                    if let Some(id) = child.id() {
                        child_attrs.insert(ID.to_string(), id.to_value());
                    }
                    child_attrs
                }),
            );
        }
        attrs
    }

    /// The whole record deserialized into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(to_object(&self.attributes()))?)
    }

    fn set_id(&self, value: &Value) -> ModelResult<()> {
        let model = self.model();
        let key = Key::from_value(value)?
            .map(|key| key.cast(model.key_type()))
            .transpose()?;
        let mut doc = self.doc_mut();
        if doc.id == key {
            return Ok(());
        }
        if doc.state != Lifecycle::New {
            return Err(ModelError::IdReassignment {
                model: model.name().to_string(),
                id: doc.id.as_ref().map(Key::to_string).unwrap_or_default(),
            });
        }
        doc.id = key;
        Ok(())
    }

    /// Apply a snapshot whose embedded children start out in `state`.
    pub(crate) fn assign(&self, attrs: Attributes, state: Lifecycle) -> ModelResult<()> {
        let model = self.model();
        for (name, value) in attrs {
            if let Some(list) = model.embedded_list_for_attribute(&name) {
                self.assign_embedded(&list, value, state)?;
            } else {
                self.set(&name, value)?;
            }
        }
        Ok(())
    }

    pub(crate) fn assign_embedded(
        &self,
        list: &EmbeddedList,
        value: Value,
        state: Lifecycle,
    ) -> ModelResult<()> {
        let children = take_embedded(list.attribute(), value)?
            .into_iter()
            .map(|attrs| Record::instantiate(list.child(), attrs, state))
            .collect::<ModelResult<Vec<_>>>()?;
        for child in &children {
            child.set_parent(self);
        }
        self.doc_mut()
            .embedded
            .insert(list.name().to_string(), children);
        Ok(())
    }

    fn embedded_value(&self, list: &EmbeddedList, snapshot: impl Fn(&Record) -> Attributes) -> Value {
        let children = self
            .doc()
            .embedded
            .get(list.name())
            .cloned()
            .unwrap_or_default();
        Value::Array(children.iter().map(|child| to_object(&snapshot(child))).collect())
    }

    // ---- Lifecycle ----

    pub fn state(&self) -> Lifecycle {
        self.doc().state
    }

    pub fn is_new(&self) -> bool {
        self.state() == Lifecycle::New
    }

    /// True only between a successful save and a delete.
    pub fn is_persisted(&self) -> bool {
        self.state() == Lifecycle::Persisted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == Lifecycle::Destroyed
    }

    pub(crate) fn mark(&self, state: Lifecycle) {
        self.doc_mut().state = state;
    }

    // ---- Embedding ----

    /// The record this one is embedded in, if it is still alive.
    pub fn parent(&self) -> Option<Record> {
        self.doc().parent.as_ref().and_then(Record::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: &Record) {
        self.doc_mut().parent = Some(parent.downgrade());
    }

    // ---- Validation ----

    /// Run `before_validation` hooks and validators, recording the errors.
    pub fn is_valid(&self) -> bool {
        let model = self.model();
        for hook in model.before_validation_hooks() {
            hook(self);
        }
        let mut errors = Vec::new();
        for validator in model.validators() {
            validator.validate(self, &mut errors);
        }
        let valid = errors.is_empty();
        self.doc_mut().errors = errors;
        valid
    }

    /// Errors from the last validation run.
    pub fn errors(&self) -> Vec<String> {
        self.doc().errors.clone()
    }
}

/// Records are equal when they are of the same model type with the same id.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.same_instance(other) {
            return true;
        }
        let (a, b) = (self.doc(), other.doc());
        Arc::ptr_eq(&a.model, &b.model) && a.id.is_some() && a.id == b.id
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(doc) => f
                .debug_struct("Record")
                .field("model", &doc.model.name())
                .field("id", &doc.id)
                .field("state", &doc.state)
                .field("attributes", &doc.attributes)
                .finish(),
            Err(_) => f.write_str("Record(<in use>)"),
        }
    }
}
