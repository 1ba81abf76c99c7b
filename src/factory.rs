//! Configuration factory: loads the object graph and reloads it in place.
//!
//! A load merges the configured sources, builds the spec set, registers
//! every spec with the container, and wraps each indirection id in a handle.
//! A reload first removes the previous build's registrations, then does the
//! same; handles issued earlier are retargeted at the fresh instances.
//!
//! Loads and reloads take `&mut self` and are therefore never reentrant.
//! Callers that trigger reloads from several places must serialize them,
//! e.g. through [`SharedFactory`].
//!
//! A failure midway through a reload leaves the container partially
//! cleared; nothing is rolled back. Handles keep their last good targets.

use crate::config::{ConfigTree, FactorySettings, SourceMerger, SourceProvider};
use crate::container::ObjectContainer;
use crate::error::Result;
use crate::indirection::{IndirectionHandle, IndirectionRegistry};
use crate::spec::{IdGenerator, ObjectDeclaration, SpecSet, build_specs};
use indexmap::IndexSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A factory shared between a reload trigger and the rest of the process.
pub type SharedFactory<C> = Arc<Mutex<ConfigurationFactory<C>>>;

/// Per-factory build state, mutated only by loads and reloads.
pub struct BuildSession<S: ?Sized> {
    /// Ids registered with the container by the current build.
    registered_ids: IndexSet<String>,
    /// Ids flagged for indirection by the current build.
    indirection_ids: IndexSet<String>,
    /// Handles issued so far; survives across builds.
    handles: IndirectionRegistry<S>,
    /// Anonymous child ids; restarts with every build.
    ids: IdGenerator,
    /// Successful loads so far.
    generation: u64,
}

impl<S: ?Sized + Send + Sync + 'static> BuildSession<S> {
    fn new() -> Self {
        Self {
            registered_ids: IndexSet::new(),
            indirection_ids: IndexSet::new(),
            handles: IndirectionRegistry::new(),
            ids: IdGenerator::new(),
            generation: 0,
        }
    }
}

/// Reload coordinator over a container `C`.
pub struct ConfigurationFactory<C: ObjectContainer> {
    base_name: String,
    profiles: Vec<String>,
    declarations: Vec<ObjectDeclaration>,
    merger: SourceMerger,
    container: C,
    session: BuildSession<C::Surface>,
    specs: SpecSet,
}

impl<C: ObjectContainer + std::fmt::Debug> std::fmt::Debug for ConfigurationFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationFactory")
            .field("base_name", &self.base_name)
            .field("profiles", &self.profiles)
            .field("container", &self.container)
            .field("generation", &self.session.generation)
            .finish_non_exhaustive()
    }
}

impl<C: ObjectContainer> ConfigurationFactory<C> {
    pub fn builder(container: C) -> FactoryBuilder<C> {
        FactoryBuilder::new(container)
    }

    /// Initial load. On an already loaded factory this is a [`reload`].
    ///
    /// Safe to retry after a failure: whatever a failed attempt registered
    /// is removed first.
    ///
    /// [`reload`]: ConfigurationFactory::reload
    pub fn load_configuration(&mut self) -> Result<()> {
        if self.session.generation > 0 {
            return self.reload();
        }
        info!(base = %self.base_name, profiles = ?self.profiles, "Loading configuration");
        self.clear_session();
        self.build()
    }

    /// Rebuild the graph from the sources and retarget issued handles.
    pub fn reload(&mut self) -> Result<()> {
        info!(
            base = %self.base_name,
            generation = self.session.generation,
            "Reloading configuration"
        );
        self.clear_session();
        self.build()
    }

    /// Drop the previous attempt's registrations and restart child ids.
    fn clear_session(&mut self) {
        for id in self.session.registered_ids.drain(..) {
            self.container.unregister_spec(&id);
        }
        self.session.indirection_ids.clear();
        self.session.ids.reset();
        self.specs = SpecSet::new();
    }

    fn build(&mut self) -> Result<()> {
        let tree = self.merged_tree()?;
        let specs = build_specs(&tree, &self.declarations, &mut self.session.ids)?;

        for spec in specs.iter() {
            debug!(id = %spec.id, "Registering object spec");
            self.container.register_spec(spec)?;
            self.session.registered_ids.insert(spec.id.clone());
            if spec.indirection {
                self.session.indirection_ids.insert(spec.id.clone());
            }
        }
        self.container.finish_registration()?;

        for id in &self.session.indirection_ids {
            let instance = self.container.instance(id)?;
            self.session.handles.wrap(id, instance)?;
        }

        self.session.generation += 1;
        info!(
            objects = specs.len(),
            handles = self.session.indirection_ids.len(),
            generation = self.session.generation,
            "Configuration applied"
        );
        self.specs = specs;
        Ok(())
    }

    /// Merge the sources without building or registering anything.
    pub fn merged_tree(&self) -> Result<ConfigTree> {
        self.merger.merge(&self.base_name, &self.profiles)
    }

    /// Handle for an id that was flagged for indirection by some build.
    ///
    /// Ids dropped by a later build keep their last target.
    pub fn get_handle(&self, id: &str) -> Option<IndirectionHandle<C::Surface>> {
        self.session.handles.get(id)
    }

    /// Specs of the last successful build.
    pub fn specs(&self) -> &SpecSet {
        &self.specs
    }

    pub fn registered_ids(&self) -> impl Iterator<Item = &str> {
        self.session.registered_ids.iter().map(String::as_str)
    }

    pub fn indirection_ids(&self) -> impl Iterator<Item = &str> {
        self.session.indirection_ids.iter().map(String::as_str)
    }

    /// Number of successful loads and reloads.
    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    /// Wrap the factory for sharing with a reload trigger.
    pub fn into_shared(self) -> SharedFactory<C> {
        Arc::new(Mutex::new(self))
    }
}

/// Builder for [`ConfigurationFactory`].
pub struct FactoryBuilder<C: ObjectContainer> {
    container: C,
    settings: FactorySettings,
    source: Option<Box<dyn SourceProvider>>,
    declarations: Vec<ObjectDeclaration>,
}

impl<C: ObjectContainer> FactoryBuilder<C> {
    pub fn new(container: C) -> Self {
        Self {
            container,
            settings: FactorySettings::default(),
            source: None,
            declarations: Vec::new(),
        }
    }

    /// Use `settings` for base name, profiles, and search directories.
    pub fn settings(mut self, settings: FactorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn base_name(mut self, base_name: impl Into<String>) -> Self {
        self.settings.base_name = base_name.into();
        self
    }

    pub fn profiles(mut self, profiles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.settings.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    /// Read sources from `source` instead of the settings' search directories.
    pub fn source(mut self, source: impl SourceProvider + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Build the entry at `declaration.key` as an object.
    pub fn declare(mut self, declaration: ObjectDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Create the factory without loading it.
    pub fn build(self) -> ConfigurationFactory<C> {
        let merger = match self.source {
            Some(source) => SourceMerger::from_boxed(source),
            None => SourceMerger::new(self.settings.directory_source()),
        };
        ConfigurationFactory {
            base_name: self.settings.base_name,
            profiles: self.settings.profiles,
            declarations: self.declarations,
            merger,
            container: self.container,
            session: BuildSession::new(),
            specs: SpecSet::new(),
        }
    }

    /// Create the factory and run the initial load.
    pub fn load(self) -> Result<ConfigurationFactory<C>> {
        let mut factory = self.build();
        factory.load_configuration()?;
        Ok(factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemorySource;
    use crate::container::{Instance, TypeContainer};
    use crate::error::{ConfError, ConstructionError};
    use crate::spec::ObjectSpec;

    trait Value: Send + Sync {
        fn get(&self) -> String;
    }

    struct Text(String);

    impl Value for Text {
        fn get(&self) -> String {
            self.0.clone()
        }
    }

    fn container() -> TypeContainer<dyn Value> {
        TypeContainer::new()
            .with_type("Text", |p: &crate::container::ResolvedProperties<dyn Value>| {
                Ok(Instance::Surface(
                    Arc::new(Text(p.string("text").unwrap_or_default())) as Arc<dyn Value>,
                ))
            })
            .with_type("Blob", |_: &crate::container::ResolvedProperties<dyn Value>| {
                Ok(Instance::opaque(vec![0u8]))
            })
    }

    #[test]
    fn test_load_registers_specs() {
        let source = MemorySource::new().with("conf", "a: {_type: Text, text: x}\nb: 1\n");
        let factory = ConfigurationFactory::builder(container())
            .source(source)
            .load()
            .unwrap();
        assert_eq!(factory.registered_ids().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(factory.generation(), 1);
        assert!(factory.container().is_registered("a"));
        assert!(factory.get_handle("a").is_none());
    }

    #[test]
    fn test_reload_unregisters_dropped_specs() {
        let source = MemorySource::new().with("conf", "a: {_type: Text}\nb: {_type: Text}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .load()
            .unwrap();

        source.set("conf", "b: {_type: Text}\n");
        factory.reload().unwrap();
        assert!(!factory.container().is_registered("a"));
        assert_eq!(factory.registered_ids().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(factory.generation(), 2);
    }

    #[test]
    fn test_handle_survives_reload() {
        let source =
            MemorySource::new().with("conf", "a: {_type: Text, _proxy: true, text: one}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .load()
            .unwrap();
        let handle = factory.get_handle("a").unwrap();
        assert_eq!(handle.with(|v| v.get()), "one");

        source.set("conf", "a: {_type: Text, _proxy: true, text: two}\n");
        factory.reload().unwrap();
        assert_eq!(handle.with(|v| v.get()), "two");
        assert!(handle.same_handle(&factory.get_handle("a").unwrap()));
    }

    #[test]
    fn test_dropped_indirection_keeps_last_target() {
        let source =
            MemorySource::new().with("conf", "a: {_type: Text, _proxy: true, text: one}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .load()
            .unwrap();
        let handle = factory.get_handle("a").unwrap();

        source.set("conf", "other: {_type: Text}\n");
        factory.reload().unwrap();
        assert_eq!(handle.with(|v| v.get()), "one");
        assert_eq!(factory.indirection_ids().count(), 0);
    }

    #[test]
    fn test_child_counter_restarts_each_build() {
        let source = MemorySource::new().with("conf", "a: {_type: Text, c: {_type: Text}}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source)
            .load()
            .unwrap();
        factory.reload().unwrap();
        assert!(factory.specs().contains("child-1"));
        assert!(!factory.specs().contains("child-2"));
    }

    #[test]
    fn test_opaque_indirection_fails_with_id() {
        let source = MemorySource::new().with("conf", "blob: {_type: Blob, _proxy: true}\n");
        let err = ConfigurationFactory::builder(container())
            .source(source)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfError::IndirectionUnsupported { ref id } if id == "blob"));
    }

    #[test]
    fn test_construction_error_propagates() {
        let source = MemorySource::new().with("conf", "a: {_type: Missing}\n");
        let err = ConfigurationFactory::builder(container())
            .source(source)
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfError::Construction(ConstructionError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_failed_reload_keeps_handle_target() {
        let source =
            MemorySource::new().with("conf", "a: {_type: Text, _proxy: true, text: good}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .load()
            .unwrap();
        let handle = factory.get_handle("a").unwrap();

        source.set("conf", "a: [broken\n");
        assert!(matches!(factory.reload(), Err(ConfError::SourceParse { .. })));
        assert_eq!(handle.with(|v| v.get()), "good");
        // The previous generation was already unregistered.
        assert!(!factory.container().is_registered("a"));

        source.set("conf", "a: {_type: Text, _proxy: true, text: fixed}\n");
        factory.reload().unwrap();
        assert_eq!(handle.with(|v| v.get()), "fixed");
    }

    #[test]
    fn test_second_load_is_reload() {
        let source = MemorySource::new().with("conf", "a: {_type: Text}\n");
        let mut factory = ConfigurationFactory::builder(container())
            .source(source)
            .build();
        factory.load_configuration().unwrap();
        factory.load_configuration().unwrap();
        assert_eq!(factory.generation(), 2);
        assert_eq!(factory.registered_ids().count(), 1);
    }

    #[test]
    fn test_registration_order_matches_specs() {
        let source = MemorySource::new().with("conf", "a: {_type: Text, c: {_type: Text}}\n");
        let factory = ConfigurationFactory::builder(container())
            .source(source)
            .load()
            .unwrap();
        let ids: Vec<&str> = factory
            .specs()
            .iter()
            .map(|s: &ObjectSpec| s.id.as_str())
            .collect();
        assert_eq!(ids, factory.registered_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_retry_after_failed_load_clears_registrations() {
        let source = MemorySource::new().with(
            "conf",
            "a: {_type: Text, c: {_type: Text}}\nz: {_type: Text, _parent: ghost}\n",
        );
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .build();
        let err = factory.load_configuration().unwrap_err();
        assert!(matches!(
            err,
            ConfError::Construction(ConstructionError::UnknownParent { .. })
        ));
        assert_eq!(factory.generation(), 0);

        source.set("conf", "a: {_type: Text, c: {_type: Text}}\n");
        factory.load_configuration().unwrap();
        assert!(!factory.container().is_registered("z"));
        assert_eq!(
            factory.registered_ids().collect::<Vec<_>>(),
            vec!["child-1", "a"]
        );
        assert_eq!(factory.generation(), 1);
    }

    #[test]
    fn test_retry_after_failed_build_restarts_child_ids() {
        let source = MemorySource::new().with(
            "conf",
            "a: {_type: Text, c: {_type: Text}}\nbad: {_type: ''}\n",
        );
        let mut factory = ConfigurationFactory::builder(container())
            .source(source.clone())
            .build();
        let err = factory.load_configuration().unwrap_err();
        assert!(matches!(err, ConfError::MissingTypeOrParent { ref id } if id == "bad"));

        source.set("conf", "a: {_type: Text, c: {_type: Text}}\n");
        factory.load_configuration().unwrap();
        assert_eq!(factory.specs().ids().collect::<Vec<_>>(), vec!["child-1", "a"]);
    }
}
