//! Layered configuration to live object graph, with hot reload.
//!
//! Configuration sources are merged by profile precedence into one tree,
//! the tree is interpreted into object specifications, and a container
//! turns those into instances. Instances flagged for indirection are handed
//! out behind handles that keep working, pointing at new state, across
//! reloads.

pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod factory;
pub mod indirection;
pub mod reloader;
pub mod spec;

pub use container::{DryRunContainer, Instance, ObjectContainer, TypeContainer};
pub use error::{ConfError, ConstructionError, ErrorCode, Result};
pub use factory::{ConfigurationFactory, FactoryBuilder, SharedFactory};
pub use indirection::{IndirectionHandle, IndirectionRegistry};
pub use spec::{ObjectDeclaration, ObjectKind, ObjectSpec, PropertyValue, SpecSet};
