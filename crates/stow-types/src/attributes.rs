use std::collections::BTreeMap;

use serde_json::Value;

/// Attribute snapshot: attribute name to opaque JSON value.
///
/// This is the unit exchanged with store adapters and with the attribute
/// layer. Ordered so that snapshots compare and print deterministically.
pub type Attributes = BTreeMap<String, Value>;

/// Returns `true` for `null`, `false`, whitespace-only strings and empty
/// arrays or objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Convert a JSON object into an attribute map. Non-objects yield `None`.
pub fn from_object(value: Value) -> Option<Attributes> {
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}

/// Convert an attribute map into a JSON object.
pub fn to_object(attrs: &Attributes) -> Value {
    Value::Object(
        attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// Build an [`Attributes`] map from `name => value` pairs.
///
/// ```
/// let attrs = stow_types::attributes! { "name" => "John", "age" => 50 };
/// assert_eq!(attrs["age"], 50);
/// ```
#[macro_export]
macro_rules! attributes {
    () => { $crate::Attributes::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut attrs = $crate::Attributes::new();
        $( attrs.insert(::std::string::String::from($name), $crate::__json::json!($value)); )+
        attrs
    }};
}
