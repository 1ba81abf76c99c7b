//! Recursive interpretation of a merged tree into object specs.
//!
//! An entry is object-like when its value is a mapping that carries a type
//! or parent marker. Object-like property values become anonymous children
//! referenced by generated id; everything else is passed through literally.

use super::{
    CHILD_ID_PREFIX, ID_KEY, ObjectDeclaration, ObjectKind, ObjectSpec, PARENT_KEY, PROXY_KEY,
    PropertyValue, SpecSet, TYPE_KEY, is_reserved,
};
use crate::config::{ConfigTree, ConfigValue, Scalar};
use crate::error::{ConfError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Generates `child-<n>` ids for anonymous children.
///
/// Numbering starts at 1 and restarts after [`IdGenerator::reset`].
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_child_id(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", CHILD_ID_PREFIX, self.counter)
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Number of ids issued since the last reset.
    pub fn issued(&self) -> u64 {
        self.counter
    }
}

/// True when `value` is a mapping carrying a type or parent marker.
pub fn is_object_like(value: &ConfigValue) -> bool {
    value
        .as_mapping()
        .is_some_and(|tree| tree.contains_key(TYPE_KEY) || tree.contains_key(PARENT_KEY))
}

/// Build the spec set for `tree`.
///
/// Top-level entries that are not object-like are ignored, except for keys
/// named by `declarations`, which are always built. Anonymous children draw
/// ids from `ids`; the caller decides when to reset it.
pub fn build_specs(
    tree: &ConfigTree,
    declarations: &[ObjectDeclaration],
    ids: &mut IdGenerator,
) -> Result<SpecSet> {
    let declared: HashSet<&str> = declarations.iter().map(|d| d.key.as_str()).collect();
    let mut builder = SpecBuilder {
        ids,
        specs: SpecSet::new(),
    };

    for (key, value) in tree.iter() {
        if declared.contains(key) || !is_object_like(value) {
            continue;
        }
        if let ConfigValue::Mapping(entry) = value {
            builder.build_object(Origin::TopLevel(key), entry, None)?;
        }
    }

    let empty = ConfigTree::new();
    for declaration in declarations {
        let entry = match tree.get(&declaration.key) {
            None => &empty,
            Some(ConfigValue::Mapping(entry)) => entry,
            Some(_) => {
                return Err(ConfError::InvalidObjectEntry {
                    key: declaration.key.clone(),
                    reason: "declared object must be a mapping".to_string(),
                });
            }
        };
        builder.build_object(Origin::TopLevel(&declaration.key), entry, Some(declaration))?;
    }

    let specs = builder.specs;
    validate_references(&specs)?;
    debug!(objects = specs.len(), "Object specs built");
    Ok(specs)
}

enum Origin<'t> {
    TopLevel(&'t str),
    Child,
}

struct SpecBuilder<'g> {
    ids: &'g mut IdGenerator,
    specs: SpecSet,
}

impl SpecBuilder<'_> {
    /// Build one object and its children; returns the object's id.
    fn build_object(
        &mut self,
        origin: Origin<'_>,
        entry: &ConfigTree,
        declaration: Option<&ObjectDeclaration>,
    ) -> Result<String> {
        let explicit_id =
            marker_text(entry, ID_KEY)?.or_else(|| declaration.and_then(|d| d.id.clone()));
        let id = match (explicit_id, origin) {
            (Some(id), _) => id,
            (None, Origin::TopLevel(key)) => key.to_string(),
            (None, Origin::Child) => self.ids.next_child_id(),
        };
        debug!(id = %id, "Building object spec");

        let parent = marker_text(entry, PARENT_KEY)?;
        let type_name = marker_text(entry, TYPE_KEY)?
            .or_else(|| declaration.and_then(|d| d.type_name.clone()));
        let kind = match (parent, type_name) {
            (Some(parent), Some(type_name)) => {
                warn!(
                    id = %id,
                    type_name = %type_name,
                    parent = %parent,
                    "Type marker ignored, parent marker takes precedence"
                );
                ObjectKind::Parent(parent)
            }
            (Some(parent), None) => ObjectKind::Parent(parent),
            (None, Some(type_name)) => ObjectKind::Type(type_name),
            (None, None) => return Err(ConfError::MissingTypeOrParent { id }),
        };

        let indirection = match entry.get(PROXY_KEY) {
            Some(flag) => is_truthy(flag),
            None => declaration.is_some_and(|d| d.indirection),
        };

        let mut spec = ObjectSpec::new(id, kind);
        spec.indirection = indirection;

        for (name, value) in entry.iter() {
            if is_reserved(name) {
                continue;
            }
            let property = match value {
                ConfigValue::Mapping(child) if is_object_like(value) => {
                    PropertyValue::Reference(self.build_object(Origin::Child, child, None)?)
                }
                _ => PropertyValue::Literal(value.clone()),
            };
            spec.properties.insert(name.to_string(), property);
        }

        let id = spec.id.clone();
        if self.specs.insert(spec).is_some() {
            warn!(id = %id, "Duplicate object id, later declaration replaces earlier one");
        }
        Ok(id)
    }
}

/// Text of a scalar marker; blank or null markers count as absent.
fn marker_text(entry: &ConfigTree, key: &str) -> Result<Option<String>> {
    match entry.get(key) {
        None | Some(ConfigValue::Scalar(Scalar::Null)) => Ok(None),
        Some(ConfigValue::Scalar(scalar)) => {
            let text = scalar.to_string();
            let text = text.trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
        Some(_) => Err(ConfError::InvalidObjectEntry {
            key: key.to_string(),
            reason: format!("marker '{}' must be a scalar", key),
        }),
    }
}

fn is_truthy(flag: &ConfigValue) -> bool {
    match flag {
        ConfigValue::Scalar(Scalar::Bool(b)) => *b,
        ConfigValue::Scalar(Scalar::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn validate_references(specs: &SpecSet) -> Result<()> {
    for spec in specs.iter() {
        for (property, target) in spec.references() {
            if !specs.contains(target) {
                return Err(ConfError::UnresolvedReference {
                    id: spec.id.clone(),
                    property: property.to_string(),
                    target: target.to_string(),
                });
            }
        }
    }
    Ok(())
}
