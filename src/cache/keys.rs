//! Cache key construction.
//!
//! Keys are plain strings built from a prefix, positional segments and named
//! options. Options are sorted by name so the call-site order never leaks into
//! the key.

use std::collections::BTreeMap;
use std::fmt::Display;

/// Separator between key parts. Raw values must not contain it.
pub const DELIMITER: char = ':';

const LOCK_PREFIX: &str = "lock";
const INDEX_PREFIX: &str = "__index__";

/// Builder for deterministic cache keys.
///
/// ```
/// use storefront::cache::KeyBuilder;
///
/// let key = KeyBuilder::new("products")
///     .segment("list")
///     .option("skip", 0)
///     .option("limit", 100)
///     .build();
/// assert_eq!(key, "products:list:limit:100:skip:0");
/// ```
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
    segments: Vec<String>,
    options: BTreeMap<String, String>,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            segments: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    /// Append a positional segment. Segments keep their call order.
    pub fn segment(mut self, value: impl Display) -> Self {
        self.segments.push(value.to_string());
        self
    }

    /// Add a named option. Setting the same name twice keeps the last value.
    pub fn option(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.options.insert(name.into(), value.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut parts = Vec::with_capacity(1 + self.segments.len() + self.options.len() * 2);
        parts.push(self.prefix);
        parts.extend(self.segments);
        for (name, value) in self.options {
            parts.push(name);
            parts.push(value);
        }
        parts.join(&DELIMITER.to_string())
    }
}

/// Replace the delimiter in a raw value so it can be used as a key part.
pub fn sanitize(value: &str) -> String {
    value.replace(DELIMITER, "_")
}

/// Key of the recompute lock paired with `key`.
pub fn lock_key(key: &str) -> String {
    format!("{LOCK_PREFIX}{DELIMITER}{key}")
}

/// First delimiter-separated segment of a key or prefix.
pub fn scope_of(key: &str) -> &str {
    key.split(DELIMITER).next().unwrap_or(key)
}

/// Index entry listing every key written under `scope`.
pub fn index_key(scope: &str) -> String {
    format!("{INDEX_PREFIX}{DELIMITER}{scope}")
}

/// Whether `key` is internal bookkeeping rather than a cached value.
pub fn is_internal(key: &str) -> bool {
    let scope = scope_of(key);
    scope == LOCK_PREFIX || scope == INDEX_PREFIX
}

/// Glob pattern matching every key that starts with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}
