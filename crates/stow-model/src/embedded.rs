//! Embedded lists: child records stored inside their parent's record.
//!
//! A list named `moves` is written to the parent's snapshot as
//! `move_attributes`, an array of child snapshots each carrying the child's
//! own id. Children have no store entry of their own; saving a child saves
//! its parent.

use std::sync::Arc;

use serde_json::Value;
use stow_types::attributes::from_object;
use stow_types::Attributes;

use crate::error::{ModelError, ModelResult};
use crate::identity_map::IdentityScope;
use crate::model::ModelType;
use crate::naming;
use crate::record::{Lifecycle, Record};

/// Descriptor of one embedded list declared on a model type.
#[derive(Debug)]
pub struct EmbeddedList {
    owner: String,
    name: String,
    attribute: String,
    child: Arc<ModelType>,
}

impl EmbeddedList {
    pub(crate) fn new(owner: &str, name: &str, child: Arc<ModelType>) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            attribute: naming::embedded_attribute(name),
            child,
        }
    }

    /// Name of the model type that declared the list.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute the children are stored under.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn child(&self) -> &Arc<ModelType> {
        &self.child
    }
}

impl PartialEq for EmbeddedList {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name
    }
}

/// Child snapshots from a stored list value.
///
/// Accepts an array of objects or an object keyed by position
/// (`{"0": {...}, "1": {...}}`), which is ordered numerically.
pub(crate) fn take_embedded(attribute: &str, value: Value) -> ModelResult<Vec<Attributes>> {
    let invalid = || ModelError::Serialization(format!("{attribute} must be a list of objects"));
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut indexed = map
                .into_iter()
                .map(|(index, item)| index.parse::<usize>().map(|i| (i, item)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            indexed.sort_by_key(|(i, _)| *i);
            indexed.into_iter().map(|(_, item)| item).collect()
        }
        _ => return Err(invalid()),
    };
    items
        .into_iter()
        .map(|item| from_object(item).ok_or_else(invalid))
        .collect()
}

impl Record {
    fn embedded_list(&self, name: &str) -> ModelResult<Arc<EmbeddedList>> {
        let model = self.model();
        model
            .embedded_list_named(name)
            .ok_or_else(|| ModelError::UnknownEmbeddedList {
                model: model.name().to_string(),
                name: name.to_string(),
            })
    }

    fn assert_child_type(list: &EmbeddedList, child: &Record) -> ModelResult<()> {
        if Arc::ptr_eq(&child.model(), list.child()) {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                expected: list.child().name().to_string(),
                actual: child.model_name(),
            })
        }
    }

    /// Children in list `name`, in order.
    pub fn embedded(&self, name: &str) -> ModelResult<Vec<Record>> {
        self.embedded_list(name)?;
        Ok(self.doc().embedded.get(name).cloned().unwrap_or_default())
    }

    /// Append `child` to list `name`. The child must be of the list's type.
    pub fn push_embedded(&self, name: &str, child: &Record) -> ModelResult<()> {
        let list = self.embedded_list(name)?;
        Self::assert_child_type(&list, child)?;
        child.set_parent(self);
        self.doc_mut()
            .embedded
            .entry(name.to_string())
            .or_default()
            .push(child.clone());
        Ok(())
    }

    /// Replace list `name` with `children`.
    ///
    /// Nothing changes unless every child is of the list's type.
    pub fn set_embedded(&self, name: &str, children: &[Record]) -> ModelResult<()> {
        let list = self.embedded_list(name)?;
        for child in children {
            Self::assert_child_type(&list, child)?;
        }
        for child in children {
            child.set_parent(self);
        }
        self.doc_mut()
            .embedded
            .insert(name.to_string(), children.to_vec());
        Ok(())
    }

    /// Build a child from `attrs`, append it and save this record.
    ///
    /// An invalid child is returned unsaved; the list and this record are
    /// left untouched.
    pub fn create_embedded(
        &self,
        scope: &mut IdentityScope,
        name: &str,
        attrs: Attributes,
    ) -> ModelResult<Record> {
        let list = self.embedded_list(name)?;
        let child = Record::instantiate(list.child(), attrs, Lifecycle::New)?;
        child.set_parent(self);
        if !child.is_valid() {
            return Ok(child);
        }
        self.push_embedded(name, &child)?;
        self.save(scope)?;
        Ok(child)
    }

    /// Every embedded child across all lists, in declaration order.
    pub fn each_embedded_object(&self) -> Vec<Record> {
        let model = self.model();
        let doc = self.doc();
        model
            .embedded_lists()
            .iter()
            .filter_map(|list| doc.embedded.get(list.name()))
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether any of this record's lists holds `child`.
    pub(crate) fn holds_embedded(&self, child: &Record) -> bool {
        self.doc()
            .embedded
            .values()
            .flatten()
            .any(|c| c.same_instance(child))
    }

    /// Remove `child` from whichever list holds it.
    pub(crate) fn detach_embedded(&self, child: &Record) {
        for children in self.doc_mut().embedded.values_mut() {
            children.retain(|c| !c.same_instance(child));
        }
    }
}
