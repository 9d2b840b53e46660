use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stow_store::{AdapterOptions, Client, StoreSpec};

use crate::error::{ModelError, ModelResult};
use crate::identity::{self, KeyFactory};

/// Defaults injected into every model type registration.
///
/// A config is read when a model type is built; changing it afterwards only
/// affects model types built later.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StowConfig {
    /// Name of the built-in key factory used when a model type names none.
    pub key_factory: String,
    /// Whether the identity map starts enabled for new model types.
    pub identity_map: bool,
    /// Store adapter new model types are opened against.
    pub store: Option<StoreSettings>,
    /// Explicit default factory, taking precedence over `key_factory`.
    #[serde(skip)]
    factory: Option<Arc<dyn KeyFactory>>,
}

/// The `[store]` section: which adapter to open and its options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreSettings {
    pub adapter: String,
    #[serde(default)]
    pub options: AdapterOptions,
}

impl Default for StowConfig {
    fn default() -> Self {
        Self {
            key_factory: "uuid".into(),
            identity_map: true,
            store: None,
            factory: None,
        }
    }
}

impl StowConfig {
    pub fn from_toml_str(s: &str) -> ModelResult<Self> {
        toml::from_str(s).map_err(|e| ModelError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Use `factory` as the default key factory.
    pub fn with_key_factory(mut self, factory: Arc<dyn KeyFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_identity_map(mut self, enabled: bool) -> Self {
        self.identity_map = enabled;
        self
    }

    /// The default key factory for model types that do not bind their own.
    pub fn key_factory(&self) -> ModelResult<Arc<dyn KeyFactory>> {
        match &self.factory {
            Some(factory) => Ok(Arc::clone(factory)),
            None => identity::factory_named(&self.key_factory),
        }
    }

    /// Store spec for the configured adapter driving `client`.
    ///
    /// Returns a spec naming only the client when no `[store]` section is
    /// configured, which the adapter registry rejects.
    pub fn store_spec(&self, client: Client) -> StoreSpec {
        match &self.store {
            Some(settings) => StoreSpec {
                adapter: Some(settings.adapter.clone()),
                client: Some(client),
                options: settings.options.clone(),
            },
            None => StoreSpec {
                client: Some(client),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequenceKeyFactory;
    use serde_json::json;
    use stow_store::{AdapterRegistry, MemoryClient, StoreError};
    use stow_types::KeyType;

    #[test]
    fn default_config() {
        let c = StowConfig::default();
        assert_eq!(c.key_factory, "uuid");
        assert!(c.identity_map);
        assert!(c.store.is_none());
        assert_eq!(c.key_factory().unwrap().key_type(), KeyType::String);
    }

    #[test]
    fn parses_toml() {
        let c = StowConfig::from_toml_str(
            r#"
            key_factory = "sequence"
            identity_map = false

            [store]
            adapter = "memory"
            options = { namespace = "app" }
            "#,
        )
        .unwrap();
        assert_eq!(c.key_factory, "sequence");
        assert!(!c.identity_map);
        let store = c.store.as_ref().unwrap();
        assert_eq!(store.adapter, "memory");
        assert_eq!(store.options["namespace"], json!("app"));
        assert_eq!(c.key_factory().unwrap().key_type(), KeyType::Integer);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c = StowConfig::from_toml_str("identity_map = false").unwrap();
        assert_eq!(c.key_factory, "uuid");
        assert!(!c.identity_map);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            StowConfig::from_toml_str("identity_map = \"maybe\""),
            Err(ModelError::Config(_))
        ));
    }

    #[test]
    fn unknown_factory_name_fails_on_use() {
        let c = StowConfig::from_toml_str("key_factory = \"taco\"").unwrap();
        assert!(matches!(
            c.key_factory(),
            Err(ModelError::InvalidKeyFactory(_))
        ));
    }

    #[test]
    fn explicit_factory_wins() {
        let c = StowConfig::default().with_key_factory(Arc::new(SequenceKeyFactory::default()));
        assert_eq!(c.key_factory().unwrap().key_type(), KeyType::Integer);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stow.toml");
        std::fs::write(&path, "key_factory = \"sequence\"\n").unwrap();
        let c = StowConfig::from_toml_file(&path).unwrap();
        assert_eq!(c.key_factory, "sequence");

        assert!(matches!(
            StowConfig::from_toml_file(dir.path().join("missing.toml")),
            Err(ModelError::Config(_))
        ));
    }

    #[test]
    fn store_spec_from_settings() {
        let c = StowConfig::from_toml_str("[store]\nadapter = \"memory\"\n").unwrap();
        let registry = AdapterRegistry::default();
        let spec = c.store_spec(Arc::new(MemoryClient::new()));
        assert!(registry.open(&spec).unwrap().is_some());
    }

    #[test]
    fn store_spec_without_settings_is_rejected() {
        let registry = AdapterRegistry::default();
        let spec = StowConfig::default().store_spec(Arc::new(MemoryClient::new()));
        assert!(matches!(registry.open(&spec), Err(StoreError::AdapterRequired)));
    }
}
