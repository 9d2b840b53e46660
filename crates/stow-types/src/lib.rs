//! Foundation types for stow.
//!
//! Every other stow crate depends on `stow-types`.
//!
//! # Key Types
//!
//! - [`Key`] -- identifier of a model instance within its store
//! - [`KeyType`] -- semantic type reported by key factories
//! - [`Attributes`] -- opaque attribute snapshot exchanged with stores

pub mod attributes;
pub mod error;
pub mod key;

pub use attributes::Attributes;
pub use error::TypeError;
pub use key::{Key, KeyType};

#[doc(hidden)]
pub use serde_json as __json;
