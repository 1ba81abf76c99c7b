//! Layered configuration sources.
//!
//! Sources are merged from four tiers, highest precedence first:
//! 1. **Profile overrides** - `<base>-<profile>` (last active profile wins)
//! 2. **Base overrides** - `<base>`
//! 3. **Profile defaults** - `<base>-<profile>.def`
//! 4. **Base defaults** - `<base>.def`
//!
//! ## Merge Strategy
//! - Mappings: deep merge key-by-key
//! - Sequences and scalars: the higher tier replaces the lower one
//!
//! ## Environment Variables
//! See [`settings`] for the variables read by [`FactorySettings::discover`].

mod loader;
mod merge;
pub mod settings;
mod tree;
pub mod watcher;

pub use loader::{
    DEFAULTS_SUFFIX, DirectorySource, MemorySource, SOURCE_EXTENSIONS, SourceMerger,
    SourceProvider, defaults_resource, profile_resource,
};
pub use merge::{merge_all, with_fallback};
pub use settings::FactorySettings;
pub use tree::{ConfigTree, ConfigValue, Scalar};
