use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Semantic type of the keys a key factory produces.
///
/// A model type's key type is fixed when its key factory is bound and is
/// used to type the `id` attribute and every foreign key pointing at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Integer,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Integer => write!(f, "Integer"),
        }
    }
}

/// Unique identifier of a model instance within its store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// The semantic type of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Int(_) => KeyType::Integer,
            Self::Str(_) => KeyType::String,
        }
    }

    /// A key is blank when it is an empty or whitespace-only string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Int(_) => false,
            Self::Str(s) => s.trim().is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    /// JSON representation used when the key is written into an attribute.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::String(s.clone()),
        }
    }

    /// Read a key back out of an attribute value.
    ///
    /// `null` and blank strings mean "no key" and yield `Ok(None)`.
    pub fn from_value(value: &Value) -> Result<Option<Self>, TypeError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(Self::Str(s.clone()))),
            Value::Number(n) => n
                .as_i64()
                .map(|n| Some(Self::Int(n)))
                .ok_or_else(|| TypeError::InvalidKey(n.to_string())),
            other => Err(TypeError::InvalidKey(other.to_string())),
        }
    }

    /// Convert this key to the given key type.
    ///
    /// Integers always convert to strings; strings convert to integers only
    /// when they parse as one.
    pub fn cast(self, key_type: KeyType) -> Result<Self, TypeError> {
        match (self, key_type) {
            (key @ Self::Str(_), KeyType::String) | (key @ Self::Int(_), KeyType::Integer) => {
                Ok(key)
            }
            (Self::Int(n), KeyType::String) => Ok(Self::Str(n.to_string())),
            (Self::Str(s), KeyType::Integer) => {
                s.trim()
                    .parse::<i64>()
                    .map(Self::Int)
                    .map_err(|_| TypeError::KeyTypeMismatch {
                        expected: KeyType::Integer.to_string(),
                        actual: format!("{s:?}"),
                    })
            }
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "Key({n})"),
            Self::Str(s) => write!(f, "Key({s:?})"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}
