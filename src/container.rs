//! Object container interface and a constructor-table implementation.
//!
//! The reload coordinator never instantiates anything itself: it registers
//! [`ObjectSpec`]s with an [`ObjectContainer`] and asks it for instances.
//! [`TypeContainer`] is a small container that maps type names to
//! constructor closures; [`DryRunContainer`] only records specs.

use crate::config::{ConfigValue, Scalar};
use crate::error::ConstructionError;
use crate::spec::{ObjectKind, ObjectSpec, PropertyValue};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A constructed object.
///
/// `Surface` instances expose the container's capability surface and can be
/// placed behind an indirection handle. `Opaque` instances cannot.
pub enum Instance<S: ?Sized> {
    Surface(Arc<S>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl<S: ?Sized> Instance<S> {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Instance::Opaque(Arc::new(value))
    }

    pub fn surface(&self) -> Option<&Arc<S>> {
        match self {
            Instance::Surface(s) => Some(s),
            Instance::Opaque(_) => None,
        }
    }

    pub fn into_surface(self) -> Option<Arc<S>> {
        match self {
            Instance::Surface(s) => Some(s),
            Instance::Opaque(_) => None,
        }
    }

    /// Downcast an opaque instance to its concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Instance::Opaque(any) => Arc::clone(any).downcast::<T>().ok(),
            Instance::Surface(_) => None,
        }
    }
}

impl<S: ?Sized> Clone for Instance<S> {
    fn clone(&self) -> Self {
        match self {
            Instance::Surface(s) => Instance::Surface(Arc::clone(s)),
            Instance::Opaque(o) => Instance::Opaque(Arc::clone(o)),
        }
    }
}

impl<S: ?Sized> fmt::Debug for Instance<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Surface(_) => f.write_str("Instance::Surface(..)"),
            Instance::Opaque(_) => f.write_str("Instance::Opaque(..)"),
        }
    }
}

/// The container that turns specs into live instances.
pub trait ObjectContainer {
    /// Capability surface shared by instances that may sit behind handles.
    type Surface: ?Sized + Send + Sync + 'static;

    /// Register (or replace) a spec under its id.
    fn register_spec(&mut self, spec: &ObjectSpec) -> Result<(), ConstructionError>;

    /// Remove a registration. Unknown ids are ignored.
    fn unregister_spec(&mut self, id: &str);

    /// Called once after every spec of a build is registered.
    fn finish_registration(&mut self) -> Result<(), ConstructionError> {
        Ok(())
    }

    /// The instance currently registered under `id`.
    fn instance(&mut self, id: &str) -> Result<Instance<Self::Surface>, ConstructionError>;
}

/// A property resolved for a constructor.
pub enum Resolved<S: ?Sized> {
    Value(ConfigValue),
    Object(Instance<S>),
}

/// Properties handed to a constructor, with references already instantiated.
pub struct ResolvedProperties<S: ?Sized> {
    id: String,
    type_name: String,
    values: IndexMap<String, Resolved<S>>,
}

impl<S: ?Sized> ResolvedProperties<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Resolved<S>> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Literal value of a property.
    pub fn value(&self, name: &str) -> Option<&ConfigValue> {
        match self.values.get(name)? {
            Resolved::Value(v) => Some(v),
            Resolved::Object(_) => None,
        }
    }

    /// Literal scalar rendered as a string.
    pub fn string(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            ConfigValue::Scalar(Scalar::Null) => None,
            ConfigValue::Scalar(scalar) => Some(scalar.to_string()),
            _ => None,
        }
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name)?.as_i64()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name)?.as_bool()
    }

    /// Instance behind a reference property.
    pub fn object(&self, name: &str) -> Option<&Instance<S>> {
        match self.values.get(name)? {
            Resolved::Object(instance) => Some(instance),
            Resolved::Value(_) => None,
        }
    }

    /// Capability surface behind a reference property.
    pub fn surface(&self, name: &str) -> Option<Arc<S>> {
        self.object(name)?.surface().cloned()
    }

    /// Literal value of a required property.
    pub fn require(&self, name: &str) -> Result<&ConfigValue, ConstructionError> {
        self.value(name).ok_or_else(|| {
            ConstructionError::failed(&self.id, format!("missing property '{}'", name))
        })
    }
}

/// Constructs an instance from resolved properties.
pub type Constructor<S> =
    Box<dyn Fn(&ResolvedProperties<S>) -> Result<Instance<S>, ConstructionError> + Send + Sync>;

/// Container backed by a table of named constructors.
///
/// Parent specs are resolved at instantiation: a spec inherits its
/// ancestor's type and properties, its own properties winning. Every
/// registration change drops cached instances; [`finish_registration`]
/// instantiates all registered specs so construction errors surface
/// during the build.
///
/// [`finish_registration`]: ObjectContainer::finish_registration
pub struct TypeContainer<S: ?Sized> {
    constructors: HashMap<String, Constructor<S>>,
    specs: IndexMap<String, ObjectSpec>,
    instances: HashMap<String, Instance<S>>,
    constructing: HashSet<String>,
}

impl<S: ?Sized + Send + Sync + 'static> Default for TypeContainer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized + Send + Sync + 'static> TypeContainer<S> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            specs: IndexMap::new(),
            instances: HashMap::new(),
            constructing: HashSet::new(),
        }
    }

    /// Register a constructor for `type_name`.
    pub fn with_type<F>(mut self, type_name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ResolvedProperties<S>) -> Result<Instance<S>, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(type_name.into(), Box::new(constructor));
        self
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    pub fn registered_ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn spec(&self, id: &str) -> Option<&ObjectSpec> {
        self.specs.get(id)
    }

    /// Type and merged properties after walking the parent chain.
    fn effective(
        &self,
        id: &str,
    ) -> Result<(String, IndexMap<String, PropertyValue>), ConstructionError> {
        let mut chain: Vec<&ObjectSpec> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = self
            .specs
            .get(id)
            .ok_or_else(|| ConstructionError::NotRegistered(id.to_string()))?;

        let type_name = loop {
            if !seen.insert(current.id.as_str()) {
                return Err(ConstructionError::ParentCycle { id: id.to_string() });
            }
            chain.push(current);
            match &current.kind {
                ObjectKind::Type(type_name) => break type_name.clone(),
                ObjectKind::Parent(parent_id) => {
                    current = self.specs.get(parent_id).ok_or_else(|| {
                        ConstructionError::UnknownParent {
                            id: current.id.clone(),
                            parent_id: parent_id.clone(),
                        }
                    })?;
                }
            }
        };

        // Ancestors first so descendants override.
        let mut properties = IndexMap::new();
        for spec in chain.iter().rev() {
            for (name, value) in &spec.properties {
                properties.insert(name.clone(), value.clone());
            }
        }
        Ok((type_name, properties))
    }

    fn construct(&mut self, id: &str) -> Result<Instance<S>, ConstructionError> {
        let (type_name, properties) = self.effective(id)?;

        let mut values = IndexMap::new();
        for (name, value) in properties {
            let resolved = match value {
                PropertyValue::Literal(v) => Resolved::Value(v),
                PropertyValue::Reference(target) => Resolved::Object(self.instance_of(&target)?),
            };
            values.insert(name, resolved);
        }

        let resolved = ResolvedProperties {
            id: id.to_string(),
            type_name: type_name.clone(),
            values,
        };
        let constructor = self.constructors.get(&type_name).ok_or_else(|| {
            ConstructionError::UnknownType {
                id: id.to_string(),
                type_name: type_name.clone(),
            }
        })?;
        debug!(id = %id, type_name = %type_name, "Constructing object");
        constructor(&resolved)
    }

    fn instance_of(&mut self, id: &str) -> Result<Instance<S>, ConstructionError> {
        if let Some(instance) = self.instances.get(id) {
            return Ok(instance.clone());
        }
        if !self.constructing.insert(id.to_string()) {
            return Err(ConstructionError::failed(id, "circular reference"));
        }
        let result = self.construct(id);
        self.constructing.remove(id);

        let instance = result?;
        self.instances.insert(id.to_string(), instance.clone());
        Ok(instance)
    }
}

impl<S: ?Sized + Send + Sync + 'static> ObjectContainer for TypeContainer<S> {
    type Surface = S;

    fn register_spec(&mut self, spec: &ObjectSpec) -> Result<(), ConstructionError> {
        if let ObjectKind::Type(type_name) = &spec.kind
            && !self.has_type(type_name)
        {
            return Err(ConstructionError::UnknownType {
                id: spec.id.clone(),
                type_name: type_name.clone(),
            });
        }
        self.instances.clear();
        self.specs.insert(spec.id.clone(), spec.clone());
        Ok(())
    }

    fn unregister_spec(&mut self, id: &str) {
        if self.specs.shift_remove(id).is_some() {
            self.instances.clear();
        }
    }

    fn finish_registration(&mut self) -> Result<(), ConstructionError> {
        let ids: Vec<String> = self.specs.keys().cloned().collect();
        for id in ids {
            self.instance_of(&id)?;
        }
        Ok(())
    }

    fn instance(&mut self, id: &str) -> Result<Instance<S>, ConstructionError> {
        self.instance_of(id)
    }
}

impl<S: ?Sized> fmt::Debug for TypeContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeContainer")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .field("registered", &self.specs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Container that constructs nothing: each registered spec is its own
/// instance. Used to validate configuration without any real types.
#[derive(Debug, Default)]
pub struct DryRunContainer {
    specs: IndexMap<String, Arc<ObjectSpec>>,
}

impl DryRunContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl ObjectContainer for DryRunContainer {
    type Surface = ObjectSpec;

    fn register_spec(&mut self, spec: &ObjectSpec) -> Result<(), ConstructionError> {
        self.specs.insert(spec.id.clone(), Arc::new(spec.clone()));
        Ok(())
    }

    fn unregister_spec(&mut self, id: &str) {
        self.specs.shift_remove(id);
    }

    /// Every parent named by a registered spec must itself be registered.
    fn finish_registration(&mut self) -> Result<(), ConstructionError> {
        for spec in self.specs.values() {
            if let Some(parent_id) = spec.parent_id()
                && !self.specs.contains_key(parent_id)
            {
                return Err(ConstructionError::UnknownParent {
                    id: spec.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn instance(&mut self, id: &str) -> Result<Instance<ObjectSpec>, ConstructionError> {
        self.specs
            .get(id)
            .map(|spec| Instance::Surface(Arc::clone(spec)))
            .ok_or_else(|| ConstructionError::NotRegistered(id.to_string()))
    }
}
