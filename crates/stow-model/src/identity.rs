//! Key factories and the per-model-type identity binding.
//!
//! Every model type binds exactly one [`KeyFactory`] when it is built. The
//! factory's [`KeyType`] types the `id` attribute and every foreign key that
//! points at the model type.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use stow_types::{Attributes, Key, KeyType};
use tracing::warn;

use crate::error::{ModelError, ModelResult};

/// Strategy producing new unique keys.
pub trait KeyFactory: Send + Sync + fmt::Debug {
    /// Semantic type of every key this factory produces.
    fn key_type(&self) -> KeyType;

    /// Produce a key for a new instance.
    ///
    /// `hint` carries the instance's attributes when available so that
    /// derived-key factories can build keys from fields. `None` means the
    /// factory could not produce a key.
    fn next_key(&self, hint: Option<&Attributes>) -> Option<Key>;
}

/// Random, time-ordered UUID v7 string keys. The default factory.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidKeyFactory;

impl KeyFactory for UuidKeyFactory {
    fn key_type(&self) -> KeyType {
        KeyType::String
    }

    fn next_key(&self, _hint: Option<&Attributes>) -> Option<Key> {
        Some(Key::Str(uuid::Uuid::now_v7().to_string()))
    }
}

/// Monotonic integer keys from an in-process counter.
#[derive(Debug)]
pub struct SequenceKeyFactory {
    next: AtomicI64,
}

impl SequenceKeyFactory {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for SequenceKeyFactory {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl KeyFactory for SequenceKeyFactory {
    fn key_type(&self) -> KeyType {
        KeyType::Integer
    }

    fn next_key(&self, _hint: Option<&Attributes>) -> Option<Key> {
        Some(Key::Int(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}

/// String keys derived from attribute values, e.g. `"Rook-1"` from
/// `name` and `number` joined with `-`.
///
/// Yields no key when any field is missing, null or not a scalar.
#[derive(Clone, Debug)]
pub struct CompositeKeyFactory {
    fields: Vec<String>,
    separator: String,
}

impl CompositeKeyFactory {
    pub fn new<I, S>(fields: I, separator: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            separator: separator.into(),
        }
    }
}

impl KeyFactory for CompositeKeyFactory {
    fn key_type(&self) -> KeyType {
        KeyType::String
    }

    fn next_key(&self, hint: Option<&Attributes>) -> Option<Key> {
        let attrs = hint?;
        let parts = self
            .fields
            .iter()
            .map(|field| match attrs.get(field)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Key::Str(parts.join(&self.separator)))
    }
}

/// How a model type picks its key factory.
#[derive(Clone, Debug)]
pub enum KeySpec {
    /// A built-in factory by name: `"uuid"` or `"sequence"`.
    Named(String),
    /// A caller-provided factory.
    Factory(Arc<dyn KeyFactory>),
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<Arc<dyn KeyFactory>> for KeySpec {
    fn from(factory: Arc<dyn KeyFactory>) -> Self {
        Self::Factory(factory)
    }
}

/// Resolve a built-in key factory by name.
pub fn factory_named(name: &str) -> ModelResult<Arc<dyn KeyFactory>> {
    match name {
        "uuid" => Ok(Arc::new(UuidKeyFactory)),
        "sequence" => Ok(Arc::new(SequenceKeyFactory::default())),
        other => Err(ModelError::InvalidKeyFactory(other.to_string())),
    }
}

/// The key factory bound to one model type.
#[derive(Clone, Debug)]
pub struct Identity {
    factory: Arc<dyn KeyFactory>,
}

impl Identity {
    pub fn new(factory: Arc<dyn KeyFactory>) -> Self {
        Self { factory }
    }

    pub fn from_spec(spec: KeySpec) -> ModelResult<Self> {
        match spec {
            KeySpec::Named(name) => Ok(Self::new(factory_named(&name)?)),
            KeySpec::Factory(factory) => Ok(Self::new(factory)),
        }
    }

    pub fn factory(&self) -> &Arc<dyn KeyFactory> {
        &self.factory
    }

    pub fn key_type(&self) -> KeyType {
        self.factory.key_type()
    }

    /// A key from the factory cast to its declared key type, or `None` if it
    /// produced none, a blank one, or one that does not cast.
    pub fn try_next_key(&self, hint: Option<&Attributes>) -> Option<Key> {
        let key = self.factory.next_key(hint)?;
        match key.clone().cast(self.key_type()) {
            Ok(key) if !key.is_blank() => Some(key),
            Ok(_) => None,
            Err(err) => {
                warn!(key = ?key, error = %err, "key factory produced an uncastable key");
                None
            }
        }
    }

    /// A key from the factory; a missing or blank key is an error.
    pub fn next_key(&self, model: &str, hint: Option<&Attributes>) -> ModelResult<Key> {
        self.try_next_key(hint).ok_or_else(|| ModelError::InvalidKey {
            model: model.to_string(),
        })
    }
}
