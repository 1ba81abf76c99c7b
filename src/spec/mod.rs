//! Object specifications: what the container should construct.
//!
//! A merged [`ConfigTree`](crate::config::ConfigTree) is interpreted into a
//! [`SpecSet`] by [`builder::build_specs`]. Specs carry literal property
//! values through untouched and point at nested objects by id.

pub mod builder;

use crate::config::ConfigValue;
use indexmap::IndexMap;
use serde::Serialize;

pub use builder::{IdGenerator, build_specs, is_object_like};

/// Reserved key carrying an explicit object id.
pub const ID_KEY: &str = "_id";
/// Reserved key naming the concrete type to construct.
pub const TYPE_KEY: &str = "_type";
/// Reserved key naming a parent spec to inherit from.
pub const PARENT_KEY: &str = "_parent";
/// Reserved key requesting an indirection handle.
pub const PROXY_KEY: &str = "_proxy";

/// Keys that never appear as regular properties.
pub const RESERVED_KEYS: &[&str] = &[ID_KEY, TYPE_KEY, PARENT_KEY, PROXY_KEY];

/// Prefix of generated ids for anonymous children.
pub const CHILD_ID_PREFIX: &str = "child-";

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// How an object is constructed: from a concrete type, or by inheriting
/// from another spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Type(String),
    Parent(String),
}

/// A property value: passed through as-is, or a reference to another spec
/// in the same build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Literal(ConfigValue),
    Reference(String),
}

impl PropertyValue {
    pub fn as_literal(&self) -> Option<&ConfigValue> {
        match self {
            PropertyValue::Literal(v) => Some(v),
            PropertyValue::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            PropertyValue::Reference(id) => Some(id),
            PropertyValue::Literal(_) => None,
        }
    }
}

/// Abstract description of one object to construct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSpec {
    pub id: String,
    pub kind: ObjectKind,
    pub indirection: bool,
    pub properties: IndexMap<String, PropertyValue>,
}

impl ObjectSpec {
    pub fn new(id: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            kind,
            indirection: false,
            properties: IndexMap::new(),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Type(t) => Some(t),
            ObjectKind::Parent(_) => None,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Parent(p) => Some(p),
            ObjectKind::Type(_) => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Ids this spec references through its properties.
    pub fn references(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .filter_map(|(name, value)| value.as_reference().map(|target| (name.as_str(), target)))
    }
}

/// Specs of one build, keyed by id, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SpecSet(IndexMap<String, ObjectSpec>);

impl SpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a spec; returns the spec it replaced, if any.
    pub fn insert(&mut self, spec: ObjectSpec) -> Option<ObjectSpec> {
        self.0.insert(spec.id.clone(), spec)
    }

    pub fn get(&self, id: &str) -> Option<&ObjectSpec> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectSpec> {
        self.0.values()
    }

    /// Ids of specs flagged for indirection.
    pub fn indirection_ids(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|s| s.indirection).map(|s| s.id.as_str())
    }
}

/// An object declared in code rather than by markers in configuration.
///
/// The top-level entry at `key` is built as an object even without
/// markers; markers present in configuration override these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDeclaration {
    pub key: String,
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub indirection: bool,
}

impl ObjectDeclaration {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_name: None,
            id: None,
            indirection: false,
        }
    }

    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn indirect(mut self) -> Self {
        self.indirection = true;
        self
    }
}
