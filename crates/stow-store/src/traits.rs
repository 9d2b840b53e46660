use stow_types::{Attributes, Key};

use crate::error::StoreResult;

/// Minimal key-value contract the persistence layer depends on.
///
/// All implementations must satisfy these invariants:
/// - A single-key read, write or delete is atomic relative to itself.
/// - `write` replaces the whole attribute map stored under the key.
/// - `delete` is idempotent: deleting a missing key is not an error.
/// - The adapter never interprets attribute values.
/// - Timeouts and cancellation are the adapter's own concern.
pub trait StoreAdapter: Send + Sync {
    /// Adapter name used in logs (e.g. `"memory"`).
    fn name(&self) -> &str;

    /// Read the attributes stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    fn read(&self, key: &Key) -> StoreResult<Option<Attributes>>;

    /// Store `attrs` under `key`, overwriting any previous value.
    fn write(&self, key: &Key, attrs: &Attributes) -> StoreResult<()>;

    /// Delete `key`. Returns `true` if a value was stored there.
    fn delete(&self, key: &Key) -> StoreResult<bool>;

    /// Check whether a value is stored under `key`.
    fn key_exists(&self, key: &Key) -> StoreResult<bool>;

    /// Read several keys.
    ///
    /// Default implementation calls `read()` for each key. Backends may
    /// override for fewer round-trips.
    fn read_many(&self, keys: &[Key]) -> StoreResult<Vec<Option<Attributes>>> {
        keys.iter().map(|key| self.read(key)).collect()
    }
}
