//! Single-valued references between independently stored records.
//!
//! A [`Reference`] is declared once per model type and names a target type
//! and the foreign-key attribute holding the target's id. The foreign key
//! is the single source of truth: proxies and the owner's memo only cache
//! the record that key points at.
//!
//! Callers go through [`Record::association`], which returns an
//! [`Association`] accessor for one owner and one reference.

use std::sync::Arc;

use serde_json::Value;
use stow_types::{Attributes, Key};

use crate::error::{ModelError, ModelResult};
use crate::identity_map::IdentityScope;
use crate::model::ModelType;
use crate::record::Record;

/// Declaration of a reference from one model type to another.
#[derive(Debug)]
pub struct Reference {
    owner: String,
    name: String,
    key: String,
    target: Arc<ModelType>,
}

impl Reference {
    pub(crate) fn new(owner: &str, name: &str, key: &str, target: Arc<ModelType>) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            key: key.to_string(),
            target,
        }
    }

    /// Name of the model type that declared the reference.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Foreign-key attribute on the owner.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &Arc<ModelType> {
        &self.target
    }

    /// A fresh proxy for `owner`'s side of this reference.
    pub fn new_proxy(self: &Arc<Self>, owner: &Record) -> ReferenceProxy {
        ReferenceProxy {
            reference: Arc::clone(self),
            owner: owner.clone(),
            target: None,
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name
    }
}

/// One owner's view of a reference, caching the resolved target until
/// [`ReferenceProxy::reset`].
#[derive(Debug)]
pub struct ReferenceProxy {
    reference: Arc<Reference>,
    owner: Record,
    target: Option<Record>,
}

impl ReferenceProxy {
    pub fn reference(&self) -> &Arc<Reference> {
        &self.reference
    }

    pub fn owner(&self) -> &Record {
        &self.owner
    }

    /// The id held in the owner's foreign key, `None` when blank.
    pub fn target_id(&self) -> ModelResult<Option<Key>> {
        match self.owner.get(self.reference.key()) {
            Some(value) => Ok(Key::from_value(&value)?),
            None => Ok(None),
        }
    }

    fn set_target_id(&self, id: Option<Key>) -> ModelResult<()> {
        let value = id.map(|id| id.to_value()).unwrap_or(Value::Null);
        self.owner.set(self.reference.key(), value)
    }

    /// The referenced record, loaded through the target type's `get`.
    ///
    /// Blank foreign keys resolve to `None` without touching the store.
    pub fn target(&mut self, scope: &mut IdentityScope) -> ModelResult<Option<Record>> {
        let Some(id) = self.target_id()? else {
            return Ok(None);
        };
        if let Some(target) = &self.target {
            return Ok(Some(target.clone()));
        }
        self.target = self.reference.target().get(scope, id)?;
        Ok(self.target.clone())
    }

    /// Point the reference at `record`, or clear it with `None`.
    ///
    /// `record` must be exactly of the target type; on mismatch the foreign
    /// key is left untouched.
    pub fn replace(&mut self, record: Option<&Record>) -> ModelResult<()> {
        match record {
            None => {
                self.reset();
                self.set_target_id(None)
            }
            Some(record) => {
                self.assert_type(record)?;
                self.set_target_id(record.id())?;
                self.target = Some(record.clone());
                Ok(())
            }
        }
    }

    /// Build an unsaved target and point the foreign key at its id.
    pub fn build(&mut self, attrs: Attributes) -> ModelResult<Record> {
        let record = self.reference.target().build(attrs)?;
        self.set_target_id(record.id())?;
        self.reset();
        Ok(record)
    }

    /// Create a target. Only if it was saved is the foreign key set and the
    /// owner saved.
    pub fn create(&mut self, scope: &mut IdentityScope, attrs: Attributes) -> ModelResult<Record> {
        let record = self.reference.target().create(scope, attrs)?;
        if record.is_persisted() {
            self.set_target_id(record.id())?;
            self.owner.save(scope)?;
            self.reset();
        }
        Ok(record)
    }

    /// Forget the cached target. The foreign key is kept.
    pub fn reset(&mut self) {
        self.target = None;
    }

    /// The target, failing with `UnresolvedTarget` when there is none.
    pub fn resolve(&mut self, scope: &mut IdentityScope) -> ModelResult<Record> {
        self.target(scope)?
            .ok_or_else(|| ModelError::UnresolvedTarget {
                model: self.reference.owner().to_string(),
                reference: self.reference.name().to_string(),
            })
    }

    /// Run `f` against the resolved target.
    pub fn with_target<R>(
        &mut self,
        scope: &mut IdentityScope,
        f: impl FnOnce(&Record) -> R,
    ) -> ModelResult<R> {
        let target = self.resolve(scope)?;
        Ok(f(&target))
    }

    fn assert_type(&self, record: &Record) -> ModelResult<()> {
        if Arc::ptr_eq(&record.model(), self.reference.target()) {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                expected: self.reference.target().name().to_string(),
                actual: record.model_name(),
            })
        }
    }
}

/// Accessor for one reference on one owner record.
///
/// Resolved targets are memoized on the owner, separately from any proxy,
/// for as long as the foreign key still points at them and something else
/// (a scope or the caller) keeps them alive.
#[derive(Clone, Debug)]
pub struct Association {
    owner: Record,
    reference: Arc<Reference>,
}

impl Association {
    pub fn reference(&self) -> &Arc<Reference> {
        &self.reference
    }

    pub fn proxy(&self) -> ReferenceProxy {
        self.reference.new_proxy(&self.owner)
    }

    fn name(&self) -> &str {
        self.reference.name()
    }

    /// The referenced record, memoized on the owner.
    pub fn get(&self, scope: &mut IdentityScope) -> ModelResult<Option<Record>> {
        let mut proxy = self.proxy();
        let Some(id) = proxy.target_id()? else {
            return Ok(None);
        };
        let cached = {
            let doc = self.owner.doc();
            doc.memo
                .get(self.name())
                .and_then(Record::upgrade)
                .or_else(|| doc.pending.get(self.name()).cloned())
        };
        if let Some(target) = cached.filter(|t| t.id().as_ref() == Some(&id)) {
            return Ok(Some(target));
        }
        let target = proxy.target(scope)?;
        if let Some(target) = &target {
            self.owner
                .doc_mut()
                .memo
                .insert(self.name().to_string(), target.downgrade());
        }
        Ok(target)
    }

    /// Point the reference at `record` or clear it.
    pub fn set(&self, record: Option<&Record>) -> ModelResult<()> {
        self.proxy().replace(record)?;
        let mut doc = self.owner.doc_mut();
        doc.pending.remove(self.name());
        match record {
            Some(record) => {
                doc.memo.insert(self.name().to_string(), record.downgrade());
            }
            None => {
                doc.memo.remove(self.name());
            }
        }
        Ok(())
    }

    /// Whether the reference resolves to a record.
    pub fn exists(&self, scope: &mut IdentityScope) -> ModelResult<bool> {
        Ok(self.get(scope)?.is_some())
    }

    /// Build an unsaved target. It is saved before the owner's next save.
    pub fn build(&self, attrs: Attributes) -> ModelResult<Record> {
        let record = self.proxy().build(attrs)?;
        let mut doc = self.owner.doc_mut();
        doc.memo.remove(self.name());
        doc.pending.insert(self.name().to_string(), record.clone());
        Ok(record)
    }

    /// Create a target and, if it saved, point at it and save the owner.
    pub fn create(&self, scope: &mut IdentityScope, attrs: Attributes) -> ModelResult<Record> {
        {
            let mut doc = self.owner.doc_mut();
            doc.memo.remove(self.name());
            doc.pending.remove(self.name());
        }
        self.proxy().create(scope, attrs)
    }

    /// Forget the memoized target. The foreign key is kept.
    pub fn reset(&self) {
        self.owner.doc_mut().memo.remove(self.name());
    }
}

impl Record {
    /// The accessor for reference `name`.
    pub fn association(&self, name: &str) -> ModelResult<Association> {
        let model = self.model();
        let reference = model
            .reference_named(name)
            .ok_or_else(|| ModelError::UnknownReference {
                model: model.name().to_string(),
                name: name.to_string(),
            })?;
        Ok(Association {
            owner: self.clone(),
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StowConfig;
    use crate::validation::Presence;
    use serde_json::json;
    use stow_store::InMemoryStore;
    use stow_types::attributes;

    struct Blog {
        user: Arc<ModelType>,
        post: Arc<ModelType>,
        game: Arc<ModelType>,
    }

    fn blog() -> Blog {
        let config = StowConfig::default();
        let store = Arc::new(InMemoryStore::new());
        let user = ModelType::builder("User", &config)
            .attribute("name")
            .store(store.clone())
            .build()
            .unwrap();
        let post = ModelType::builder("Post", &config)
            .attribute("title")
            .store(store.clone())
            .build()
            .unwrap();
        let game = ModelType::builder("Game", &config).store(store).build().unwrap();
        post.reference("user", &user);
        Blog { user, post, game }
    }

    // -----------------------------------------------------------------------
    // Declaration
    // -----------------------------------------------------------------------

    #[test]
    fn reference_descriptor() {
        let Blog { user, post, .. } = blog();
        let reference = post.reference_named("user").unwrap();
        assert_eq!(reference.owner(), "Post");
        assert_eq!(reference.name(), "user");
        assert_eq!(reference.key(), "user_id");
        assert!(Arc::ptr_eq(reference.target(), &user));
        assert_eq!(*reference, *post.reference_named("user").unwrap());
    }

    #[test]
    fn custom_key() {
        let Blog { user, post, .. } = blog();
        let reference = post.reference_with_key("author", &user, "writer_id");
        assert_eq!(reference.key(), "writer_id");
    }

    #[test]
    fn unknown_association() {
        let Blog { post, .. } = blog();
        let record = post.build(attributes! {}).unwrap();
        assert!(matches!(
            record.association("nope"),
            Err(ModelError::UnknownReference { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Proxy
    // -----------------------------------------------------------------------

    #[test]
    fn proxy_target_is_none_for_blank_key() {
        let Blog { post, .. } = blog();
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! { "user_id" => "" }).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();
        assert_eq!(proxy.target_id().unwrap(), None);
        assert!(proxy.target(&mut scope).unwrap().is_none());
    }

    #[test]
    fn proxy_replace_and_target() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let john = user.create(&mut scope, attributes! { "name" => "John" }).unwrap();
        let record = post.build(attributes! {}).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();

        proxy.replace(Some(&john)).unwrap();
        assert_eq!(record.get("user_id"), john.id().map(|id| id.to_value()));
        assert!(proxy.target(&mut scope).unwrap().unwrap().same_instance(&john));

        proxy.replace(None).unwrap();
        assert_eq!(record.get("user_id"), None);
        assert!(proxy.target(&mut scope).unwrap().is_none());
    }

    #[test]
    fn proxy_rejects_wrong_type() {
        let Blog { user, post, game } = blog();
        let mut scope = IdentityScope::new();
        let john = user.create(&mut scope, attributes! {}).unwrap();
        let record = post.build(attributes! {}).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();
        proxy.replace(Some(&john)).unwrap();

        let chess = game.build(attributes! {}).unwrap();
        let err = proxy.replace(Some(&chess)).unwrap_err();
        assert_eq!(err.to_string(), "User expected, but was Game");
        assert_eq!(record.get("user_id"), john.id().map(|id| id.to_value()));
    }

    #[test]
    fn proxy_build_sets_key_without_saving() {
        let Blog { user, post, .. } = blog();
        let record = post.build(attributes! {}).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();
        let built = proxy.build(attributes! { "name" => "John" }).unwrap();

        assert!(built.is_new());
        assert_eq!(proxy.target_id().unwrap(), built.id());
        assert!(!user.key_exists(&built.id().unwrap()).unwrap());
    }

    #[test]
    fn proxy_create_saves_owner() {
        let Blog { post, .. } = blog();
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();
        let created = proxy.create(&mut scope, attributes! { "name" => "John" }).unwrap();

        assert!(created.is_persisted());
        assert!(record.is_persisted());
        assert_eq!(proxy.target_id().unwrap(), created.id());
    }

    #[test]
    fn resolve_and_with_target() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        let mut proxy = record.association("user").unwrap().proxy();
        match proxy.resolve(&mut scope) {
            Err(err @ ModelError::UnresolvedTarget { .. }) => {
                assert_eq!(err.to_string(), "Post.user has no target")
            }
            other => panic!("expected UnresolvedTarget, got {other:?}"),
        }

        let john = user.create(&mut scope, attributes! { "name" => "John" }).unwrap();
        proxy.replace(Some(&john)).unwrap();
        let name = proxy
            .with_target(&mut scope, |target| target.get("name"))
            .unwrap();
        assert_eq!(name, Some(json!("John")));
    }

    // -----------------------------------------------------------------------
    // Association accessor
    // -----------------------------------------------------------------------

    #[test]
    fn set_get_exists() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let john = user.create(&mut scope, attributes! {}).unwrap();
        let record = post.build(attributes! {}).unwrap();
        let author = record.association("user").unwrap();

        assert!(!author.exists(&mut scope).unwrap());
        author.set(Some(&john)).unwrap();
        assert!(author.exists(&mut scope).unwrap());
        assert!(author.get(&mut scope).unwrap().unwrap().same_instance(&john));

        author.set(None).unwrap();
        assert!(author.get(&mut scope).unwrap().is_none());
    }

    #[test]
    fn get_follows_foreign_key_changes() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let john = user.create(&mut scope, attributes! {}).unwrap();
        let steve = user.create(&mut scope, attributes! {}).unwrap();
        let record = post.build(attributes! {}).unwrap();
        let author = record.association("user").unwrap();

        author.set(Some(&john)).unwrap();
        record.set("user_id", steve.id().unwrap().to_value()).unwrap();
        assert!(author.get(&mut scope).unwrap().unwrap().same_instance(&steve));
    }

    #[test]
    fn build_is_saved_with_owner() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        let built = record
            .association("user")
            .unwrap()
            .build(attributes! { "name" => "John" })
            .unwrap();
        assert!(record
            .association("user")
            .unwrap()
            .get(&mut scope)
            .unwrap()
            .unwrap()
            .same_instance(&built));

        assert!(record.save(&mut scope).unwrap());
        assert!(built.is_persisted());
        assert!(user.key_exists(&built.id().unwrap()).unwrap());
    }

    #[test]
    fn replaced_build_is_not_saved() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        let author = record.association("user").unwrap();
        let built = author.build(attributes! {}).unwrap();
        author.set(None).unwrap();

        assert!(record.save(&mut scope).unwrap());
        assert!(built.is_new());
        assert!(!user.key_exists(&built.id().unwrap()).unwrap());
    }

    #[test]
    fn invalid_build_blocks_owner_save() {
        let Blog { user, post, .. } = blog();
        user.validate(Presence::of("name"));
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        record.association("user").unwrap().build(attributes! {}).unwrap();

        assert!(!record.save(&mut scope).unwrap());
        assert!(record.is_new());
        assert_eq!(record.errors(), vec!["user is invalid"]);
    }

    #[test]
    fn create_with_invalid_target_changes_nothing() {
        let Blog { user, post, .. } = blog();
        user.validate(Presence::of("name"));
        let mut scope = IdentityScope::new();
        let record = post.build(attributes! {}).unwrap();
        let created = record
            .association("user")
            .unwrap()
            .create(&mut scope, attributes! {})
            .unwrap();

        assert!(created.is_new());
        assert_eq!(record.get("user_id"), None);
        assert!(record.is_new());
    }

    #[test]
    fn memo_does_not_keep_records_alive() {
        let config = StowConfig::default();
        let user = ModelType::builder("User", &config)
            .store(Arc::new(InMemoryStore::new()))
            .build()
            .unwrap();
        user.reference("manager", &user);
        user.reference("buddy", &user);

        let (alice, bob) = {
            let mut scope = IdentityScope::new();
            let alice = user.create(&mut scope, attributes! {}).unwrap();
            let bob = user.create(&mut scope, attributes! {}).unwrap();
            alice.association("manager").unwrap().set(Some(&alice)).unwrap();
            alice.association("buddy").unwrap().set(Some(&bob)).unwrap();
            bob.association("buddy").unwrap().set(Some(&alice)).unwrap();
            assert!(alice
                .association("manager")
                .unwrap()
                .get(&mut scope)
                .unwrap()
                .unwrap()
                .same_instance(&alice));
            (alice.downgrade(), bob.downgrade())
        };
        assert!(alice.upgrade().is_none());
        assert!(bob.upgrade().is_none());
    }

    #[test]
    fn reset_keeps_foreign_key() {
        let Blog { user, post, .. } = blog();
        let mut scope = IdentityScope::new();
        let john = user.create(&mut scope, attributes! {}).unwrap();
        let record = post.build(attributes! {}).unwrap();
        let author = record.association("user").unwrap();
        author.set(Some(&john)).unwrap();
        author.reset();
        assert_eq!(record.get("user_id"), john.id().map(|id| id.to_value()));
        assert!(author.get(&mut scope).unwrap().unwrap().same_instance(&john));
    }
}
