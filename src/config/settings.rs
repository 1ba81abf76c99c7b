//! Settings for the configuration factory itself.
//!
//! ## Environment Variables
//! - `CONFGRAPH_BASE_NAME` - Base resource name (default: `conf`)
//! - `CONFGRAPH_PROFILES` - Comma-separated active profiles
//! - `CONFGRAPH_CONF_DIR` - Primary search directory (default: `./conf`)
//! - `CONFGRAPH_USER_DIR` - User search directory (default: `~/.confgraph`)

use super::loader::DirectorySource;
use std::path::PathBuf;

/// Default base resource name.
pub const DEFAULT_BASE_NAME: &str = "conf";

/// Where sources live and which of them are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorySettings {
    /// Base resource name; profile and defaults names derive from it.
    pub base_name: String,
    /// Active profiles in ascending precedence.
    pub profiles: Vec<String>,
    /// Search directories, highest priority first.
    pub search_dirs: Vec<PathBuf>,
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            base_name: DEFAULT_BASE_NAME.to_string(),
            profiles: Vec::new(),
            search_dirs: vec![PathBuf::from("conf")],
        }
    }
}

impl FactorySettings {
    /// Discover settings from environment and defaults.
    pub fn discover() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Discover settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_name = lookup("CONFGRAPH_BASE_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());

        let profiles = lookup("CONFGRAPH_PROFILES")
            .map(|raw| parse_profiles(&raw))
            .unwrap_or_default();

        // Project dir: CONFGRAPH_CONF_DIR or $CWD/conf
        let conf_dir = lookup("CONFGRAPH_CONF_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("conf"));

        // User dir: CONFGRAPH_USER_DIR or ~/.confgraph
        let user_dir = lookup("CONFGRAPH_USER_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".confgraph")));

        let mut search_dirs = vec![conf_dir];
        search_dirs.extend(user_dir);

        Self {
            base_name,
            profiles,
            search_dirs,
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = base_name.into();
        self
    }

    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_dirs = dirs.into_iter().collect();
        self
    }

    /// A directory source over the configured search directories.
    pub fn directory_source(&self) -> DirectorySource {
        DirectorySource::new(self.search_dirs.iter().cloned())
    }
}

/// Split a comma-separated profile list, dropping blanks.
pub fn parse_profiles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
