//! Attribute naming conventions for associations.

/// Singular form of an association name: `moves` -> `move`,
/// `categories` -> `category`, `addresses` -> `address`.
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "shes", "ches", "xes", "zzes"] {
        if name.ends_with(suffix) {
            return name[..name.len() - 2].to_string();
        }
    }
    if name.ends_with("ss") || name.ends_with("us") || name.ends_with("is") {
        return name.to_string();
    }
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Foreign-key attribute backing a reference: `user` -> `user_id`.
pub fn foreign_key(association: &str) -> String {
    format!("{}_id", singularize(association))
}

/// Attribute holding an embedded list's children: `moves` -> `move_attributes`.
pub fn embedded_attribute(list: &str) -> String {
    format!("{}_attributes", singularize(list))
}
