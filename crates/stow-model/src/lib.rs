//! Object-document mapping over pluggable key-value stores.
//!
//! `stow-model` gives in-memory records identity, persistence and
//! references to one another on top of any [`stow_store::StoreAdapter`].
//!
//! # Overview
//!
//! - [`ModelType`] -- declared once per kind of record with
//!   [`ModelType::builder`]; binds a key factory and a store
//! - [`Record`] -- handle to one live instance; clones share state
//! - [`IdentityScope`] -- per-unit-of-work cache guaranteeing one live
//!   instance per `(model type, key)`
//! - [`Association`] / [`ReferenceProxy`] -- lazy, typed single references
//!   backed by a foreign-key attribute
//! - [`EmbeddedList`] -- child records stored inside their parent
//!
//! ```
//! use std::sync::Arc;
//! use stow_model::{IdentityScope, ModelType, StowConfig};
//! use stow_store::InMemoryStore;
//! use stow_types::attributes;
//!
//! let config = StowConfig::default();
//! let user = ModelType::builder("User", &config)
//!     .attribute("name")
//!     .store(Arc::new(InMemoryStore::new()))
//!     .build()?;
//!
//! let mut scope = IdentityScope::new();
//! let john = user.create(&mut scope, attributes! { "name" => "John" })?;
//! let again = user.get(&mut scope, john.id().unwrap())?.unwrap();
//! assert!(again.same_instance(&john));
//! # Ok::<(), stow_model::ModelError>(())
//! ```

pub mod config;
pub mod embedded;
pub mod error;
pub mod identity;
pub mod identity_map;
mod logging;
pub mod model;
pub mod naming;
pub mod persistence;
pub mod record;
pub mod reference;
pub mod validation;

pub use config::{StoreSettings, StowConfig};
pub use embedded::EmbeddedList;
pub use error::{ModelError, ModelResult};
pub use identity::{
    CompositeKeyFactory, Identity, KeyFactory, KeySpec, SequenceKeyFactory, UuidKeyFactory,
};
pub use identity_map::IdentityScope;
pub use model::{AttributeDef, ModelType, ModelTypeBuilder, ModelTypeId};
pub use persistence::SaveOptions;
pub use record::{Lifecycle, Record};
pub use reference::{Association, Reference, ReferenceProxy};
pub use validation::{Presence, Validator};
