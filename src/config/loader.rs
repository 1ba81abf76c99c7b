//! Configuration sources and the profile-aware source merger.
//!
//! Four tiers are merged, highest precedence first:
//! 1. `<base>-<profile>` for each active profile (last profile wins)
//! 2. `<base>`
//! 3. `<base>-<profile>.def` for each active profile
//! 4. `<base>.def`
//!
//! Tiers 1-2 form the "dev" tree and tiers 3-4 the "defaults" tree; any
//! value in the dev tree wins over any value in the defaults tree.

use super::merge::with_fallback;
use super::tree::ConfigTree;
use crate::error::{ConfError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Suffix appended to a resource name to address its defaults source.
pub const DEFAULTS_SUFFIX: &str = "def";

/// File extensions tried, in order, when resolving a resource name.
pub const SOURCE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Provides configuration trees by resource name.
pub trait SourceProvider: Send + Sync {
    /// Load the tree for `resource`.
    ///
    /// A resource that does not exist is an empty tree, never an error.
    /// Content that exists but cannot be parsed is a `SourceParse` error.
    fn load_tree(&self, resource: &str) -> Result<ConfigTree>;
}

/// Name of the profile-specific source for `base`.
pub fn profile_resource(base: &str, profile: &str) -> String {
    format!("{}-{}", base, profile)
}

/// Name of the defaults source for `resource`.
pub fn defaults_resource(resource: &str) -> String {
    format!("{}.{}", resource, DEFAULTS_SUFFIX)
}

/// Resolves resources to `.yaml`, `.yml`, or `.json` files in a list of
/// search directories. Earlier directories take priority.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    search_dirs: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn new(search_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_dirs: search_dirs.into_iter().collect(),
        }
    }

    pub fn single(dir: impl Into<PathBuf>) -> Self {
        Self::new([dir.into()])
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Find the file backing `resource`, if any.
    pub fn resolve(&self, resource: &str) -> Option<PathBuf> {
        for dir in &self.search_dirs {
            if has_known_extension(resource) {
                let candidate = dir.join(resource);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            for ext in SOURCE_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", resource, ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl SourceProvider for DirectorySource {
    fn load_tree(&self, resource: &str) -> Result<ConfigTree> {
        let Some(path) = self.resolve(resource) else {
            debug!(resource = %resource, "Configuration source not found, using empty tree");
            return Ok(ConfigTree::new());
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfError::SourceIo {
            path: path.clone(),
            source,
        })?;

        let parsed = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            ConfigTree::from_json_str(&content)
        } else {
            ConfigTree::from_yaml_str(&content)
        };

        let tree = parsed.map_err(|reason| ConfError::parse(resource, &path, reason))?;
        debug!(
            resource = %resource,
            path = %path.display(),
            keys = tree.len(),
            "Loaded configuration source"
        );
        Ok(tree)
    }
}

fn has_known_extension(resource: &str) -> bool {
    Path::new(resource)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// In-memory YAML documents keyed by resource name.
///
/// Clones share the same documents, so a caller can keep a clone and edit
/// sources after handing one to a factory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemorySource::set`].
    pub fn with(self, resource: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.set(resource, yaml);
        self
    }

    /// Create or replace a document.
    pub fn set(&self, resource: impl Into<String>, yaml: impl Into<String>) {
        let mut docs = self.documents.write().unwrap_or_else(|e| e.into_inner());
        docs.insert(resource.into(), yaml.into());
    }

    /// Remove a document. Returns `true` if it existed.
    pub fn remove(&self, resource: &str) -> bool {
        let mut docs = self.documents.write().unwrap_or_else(|e| e.into_inner());
        docs.remove(resource).is_some()
    }
}

impl SourceProvider for MemorySource {
    fn load_tree(&self, resource: &str) -> Result<ConfigTree> {
        let docs = self.documents.read().unwrap_or_else(|e| e.into_inner());
        match docs.get(resource) {
            Some(content) => ConfigTree::from_yaml_str(content)
                .map_err(|reason| ConfError::parse(resource, PathBuf::from("<memory>"), reason)),
            None => Ok(ConfigTree::new()),
        }
    }
}

/// Merges the base, profile, and defaults sources into one tree.
pub struct SourceMerger {
    provider: Box<dyn SourceProvider>,
}

impl SourceMerger {
    pub fn new(provider: impl SourceProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
        }
    }

    pub fn from_boxed(provider: Box<dyn SourceProvider>) -> Self {
        Self { provider }
    }

    /// Load and merge every tier for `base` under `profiles`.
    pub fn merge(&self, base: &str, profiles: &[String]) -> Result<ConfigTree> {
        debug!(base = %base, profiles = ?profiles, "Loading configuration");

        let dev = self.layered(base, profiles, |name| name.to_string())?;
        let defaults = self.layered(base, profiles, defaults_resource)?;

        let merged = with_fallback(dev, defaults);
        debug!(keys = merged.len(), "Configuration loaded");
        Ok(merged)
    }

    /// Base resource overridden by each profile resource in turn.
    fn layered(
        &self,
        base: &str,
        profiles: &[String],
        name: impl Fn(&str) -> String,
    ) -> Result<ConfigTree> {
        let mut tree = self.provider.load_tree(&name(base))?;
        for profile in profiles {
            let overlay = self
                .provider
                .load_tree(&name(&profile_resource(base, profile)))?;
            tree = with_fallback(overlay, tree);
        }
        Ok(tree)
    }
}

impl std::fmt::Debug for SourceMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMerger").finish_non_exhaustive()
    }
}
