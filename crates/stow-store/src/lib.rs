//! Key-value store adapters for stow.
//!
//! The persistence layer needs very little from a backend: read, write and
//! delete an attribute map by key, and check whether a key exists. This
//! crate defines that contract and ships an in-memory backend.
//!
//! # Storage Backends
//!
//! All backends implement the [`StoreAdapter`] trait:
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//!
//! Backends are opened by name through an [`AdapterRegistry`] from a
//! [`StoreSpec`] naming the adapter and the client it drives.
//!
//! # Design Rules
//!
//! 1. One store operation per persistence action; no multi-key transactions.
//! 2. Single-key operations are atomic relative to themselves.
//! 3. Deletes are idempotent.
//! 4. The store never interprets attribute values.
//! 5. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod registry;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, MemoryClient};
pub use registry::{AdapterOptions, AdapterRegistry, Client, StoreSpec};
pub use traits::StoreAdapter;
