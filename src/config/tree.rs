//! Generic configuration tree: scalars, sequences, and key-ordered mappings.
//!
//! Every source document is converted into a [`ConfigTree`] before merging,
//! so the rest of the crate never sees format-specific values.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(Scalar),
    Sequence(Vec<ConfigValue>),
    Mapping(ConfigTree),
}

impl ConfigValue {
    pub fn null() -> Self {
        ConfigValue::Scalar(Scalar::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        ConfigValue::Scalar(Scalar::String(s.into()))
    }

    pub fn as_mapping(&self) -> Option<&ConfigTree> {
        match self {
            ConfigValue::Mapping(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// String content of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Scalar(Scalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Scalar(Scalar::Null))
    }

    /// Convert a parsed YAML document node.
    pub fn from_yaml(value: serde_yaml::Value) -> Result<Self, String> {
        use serde_yaml::Value as Y;
        Ok(match value {
            Y::Null => ConfigValue::null(),
            Y::Bool(b) => ConfigValue::Scalar(Scalar::Bool(b)),
            Y::Number(n) => ConfigValue::Scalar(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Y::String(s) => ConfigValue::string(s),
            Y::Sequence(items) => ConfigValue::Sequence(
                items
                    .into_iter()
                    .map(ConfigValue::from_yaml)
                    .collect::<Result<_, _>>()?,
            ),
            Y::Mapping(map) => {
                let mut tree = ConfigTree::new();
                for (key, value) in map {
                    let key = match ConfigValue::from_yaml(key)? {
                        ConfigValue::Scalar(s) => s.to_string(),
                        other => return Err(format!("unsupported mapping key: {:?}", other)),
                    };
                    tree.insert(key, ConfigValue::from_yaml(value)?);
                }
                ConfigValue::Mapping(tree)
            }
            Y::Tagged(tagged) => ConfigValue::from_yaml(tagged.value)?,
        })
    }

    /// Convert a parsed JSON document node.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match value {
            J::Null => ConfigValue::null(),
            J::Bool(b) => ConfigValue::Scalar(Scalar::Bool(b)),
            J::Number(n) => ConfigValue::Scalar(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            J::String(s) => ConfigValue::string(s),
            J::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from_json).collect())
            }
            J::Object(map) => ConfigValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::string(s)
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::string(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Scalar(Scalar::Int(i))
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Scalar(Scalar::Bool(b))
    }
}

impl From<ConfigTree> for ConfigValue {
    fn from(tree: ConfigTree) -> Self {
        ConfigValue::Mapping(tree)
    }
}

/// An ordered mapping from key to [`ConfigValue`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigTree(IndexMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Parse a YAML document. An empty document is an empty tree.
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        Self::from_root(ConfigValue::from_yaml(value)?)
    }

    /// Parse a JSON document. An empty document is an empty tree.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        Self::from_root(ConfigValue::from_json(value))
    }

    fn from_root(root: ConfigValue) -> Result<Self, String> {
        match root {
            ConfigValue::Mapping(tree) => Ok(tree),
            ConfigValue::Scalar(Scalar::Null) => Ok(Self::new()),
            other => Err(format!(
                "document root must be a mapping, found {}",
                kind_name(&other)
            )),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.0.get_mut(key)
    }

    /// Look up a dotted path such as `server.port`.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_mapping()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value. An existing key keeps its position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.0.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for ConfigTree {
    type Item = (String, ConfigValue);
    type IntoIter = indexmap::map::IntoIter<String, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigTree {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn kind_name(value: &ConfigValue) -> &'static str {
    match value {
        ConfigValue::Scalar(_) => "a scalar",
        ConfigValue::Sequence(_) => "a sequence",
        ConfigValue::Mapping(_) => "a mapping",
    }
}
