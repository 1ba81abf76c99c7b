//! Override merge for configuration trees.
//!
//! A key present in the override shadows the same key in the fallback.
//! Nested mappings merge recursively; sequences and scalars are replaced
//! entirely, not concatenated.

use super::tree::{ConfigTree, ConfigValue};

/// Merge `fallback` underneath `overlay`, with `overlay` taking precedence.
///
/// Keys of the fallback keep their position; keys only present in the
/// overlay are appended in overlay order.
///
/// # Example
/// ```
/// use confgraph::config::{ConfigTree, with_fallback};
///
/// let base = ConfigTree::from_yaml_str("server: { port: 8080, host: localhost }").unwrap();
/// let overlay = ConfigTree::from_yaml_str("server: { port: 9000 }").unwrap();
/// let merged = with_fallback(overlay, base);
/// assert_eq!(merged.get_path("server.port").and_then(|v| v.as_i64()), Some(9000));
/// assert_eq!(merged.get_path("server.host").and_then(|v| v.as_str()), Some("localhost"));
/// ```
pub fn with_fallback(overlay: ConfigTree, fallback: ConfigTree) -> ConfigTree {
    let mut merged = fallback;
    for (key, overlay_value) in overlay {
        let value = match (merged.get_mut(&key), overlay_value) {
            (Some(ConfigValue::Mapping(base)), ConfigValue::Mapping(over)) => {
                ConfigValue::Mapping(with_fallback(over, std::mem::take(base)))
            }
            (_, overlay_value) => overlay_value,
        };
        merged.insert(key, value);
    }
    merged
}

/// Merge trees in order, with later trees taking precedence.
///
/// Equivalent to folding [`with_fallback`] over the list.
pub fn merge_all(trees: impl IntoIterator<Item = ConfigTree>) -> ConfigTree {
    trees
        .into_iter()
        .fold(ConfigTree::new(), |acc, tree| with_fallback(tree, acc))
}
