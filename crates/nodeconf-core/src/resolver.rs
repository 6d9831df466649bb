//! Key resolution over the metadata tree
//!
//! A lookup walks the tree one token per level and stops as soon as it cannot
//! descend further. If it stopped on a mapping tagged with
//! [`INDIRECTION_KEY`], the tag's tokens replace the consumed prefix and the
//! lookup starts over from the document root. This lets one part of the tree
//! alias another.
//!
//! Indirection cycles are not detected unless
//! [`ResolverOptions::max_indirections`] is set. Without a limit, a cyclic
//! document makes `resolve` loop forever.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::key::{KeyInput, KeyPath};
use crate::store::ConfigStore;
use crate::value::Value;

/// Reserved mapping key marking an indirection
pub const INDIRECTION_KEY: &str = "bdvlibrefkey";

/// The result of a successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Null,
    String(String),
    Bool(bool),
    Integer(i64),
    /// An array, returned as-is without checking its elements
    List(Vec<Value>),
    /// The keys of a mapping, in document order
    Keys(Vec<String>),
}

impl ResolvedValue {
    /// True for `List` and `Keys`
    pub fn is_sequence(&self) -> bool {
        matches!(self, ResolvedValue::List(_) | ResolvedValue::Keys(_))
    }

    /// Whether this is a sequence containing `token` as an element or key
    pub fn contains(&self, token: &str) -> bool {
        match self {
            ResolvedValue::List(items) => items.iter().any(|v| v.as_str() == Some(token)),
            ResolvedValue::Keys(keys) => keys.iter().any(|k| k == token),
            _ => false,
        }
    }

    /// String elements of a `List`, or the keys of a `Keys`.
    ///
    /// Empty for scalars. Non-string list elements are skipped.
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            ResolvedValue::List(items) => items.iter().filter_map(Value::as_str).collect(),
            ResolvedValue::Keys(keys) => keys.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Get as str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of elements of a sequence; `None` for scalars
    pub fn len(&self) -> Option<usize> {
        match self {
            ResolvedValue::List(items) => Some(items.len()),
            ResolvedValue::Keys(keys) => Some(keys.len()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ResolvedValue::Null => "null",
            ResolvedValue::String(_) => "string",
            ResolvedValue::Bool(_) => "boolean",
            ResolvedValue::Integer(_) => "integer",
            ResolvedValue::List(_) => "sequence",
            ResolvedValue::Keys(_) => "keys",
        }
    }
}

/// Resolver tuning
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Maximum number of indirections followed by a single lookup.
    /// `None` follows indirections without limit.
    pub max_indirections: Option<usize>,
}

/// Answers key lookups and leaf searches against a loaded document
#[derive(Debug, Clone)]
pub struct Resolver {
    root: Arc<Value>,
    options: ResolverOptions,
}

impl Resolver {
    /// Create a resolver with default options
    pub fn new(store: &ConfigStore) -> Self {
        Self::with_options(store, ResolverOptions::default())
    }

    /// Create a resolver with custom options
    pub fn with_options(store: &ConfigStore, options: ResolverOptions) -> Self {
        Self {
            root: store.shared_root(),
            options,
        }
    }

    /// Resolve `key`, following indirections.
    pub fn resolve(&self, key: impl Into<KeyInput>) -> Result<ResolvedValue> {
        self.resolve_path(key.into().into_key_path())
    }

    fn resolve_path(&self, mut path: KeyPath) -> Result<ResolvedValue> {
        let mut hops = 0usize;

        loop {
            if path.is_empty() {
                return Err(Error::empty_key_path());
            }

            let (node, consumed) = walk(&self.root, path.tokens());
            let remaining = &path.tokens()[consumed..];

            let map = match node {
                Value::Mapping(map) => map,
                _ if !remaining.is_empty() => {
                    return Err(Error::key_tokens_remaining(
                        path.to_string(),
                        remaining.to_vec(),
                    ));
                }
                Value::Null => return Ok(ResolvedValue::Null),
                Value::Bool(b) => return Ok(ResolvedValue::Bool(*b)),
                Value::Integer(i) => return Ok(ResolvedValue::Integer(*i)),
                Value::String(s) => return Ok(ResolvedValue::String(s.clone())),
                Value::Sequence(items) => return Ok(ResolvedValue::List(items.clone())),
                Value::Float(_) => {
                    return Err(Error::unknown_value_type(
                        path.to_string(),
                        node.type_name(),
                        node.to_string(),
                    ));
                }
            };

            let Some(marker) = map.get(INDIRECTION_KEY) else {
                if remaining.is_empty() {
                    return Ok(ResolvedValue::Keys(map.keys().cloned().collect()));
                }
                return Err(Error::key_tokens_remaining(
                    path.to_string(),
                    remaining.to_vec(),
                ));
            };

            hops += 1;
            if let Some(limit) = self.options.max_indirections {
                if hops > limit {
                    return Err(Error::indirection_depth_exceeded(path.to_string(), limit));
                }
            }

            let target = indirection_target(&path, consumed, marker)?;
            let next = target.join(remaining);
            log::trace!("Indirection at '{}' redirects to '{}'", path, next);
            path = next;
        }
    }

    /// Find every path below `start` whose value is, or contains, `leaf`.
    ///
    /// Candidates are expanded breadth-first from a FIFO queue: a candidate
    /// resolving to a sequence without `leaf` enqueues one child path per
    /// element. A candidate resolving to `leaf`, or to a sequence containing
    /// it, contributes `candidate + [leaf]` to the result. Candidates with
    /// leftover tokens are dead ends.
    pub fn search(&self, start: impl Into<KeyInput>, leaf: &str) -> Result<Vec<KeyPath>> {
        let mut queue = VecDeque::from([start.into().into_key_path()]);
        let mut found = Vec::new();

        while let Some(candidate) = queue.pop_front() {
            let value = match self.resolve_path(candidate.clone()) {
                Ok(value) => value,
                Err(e) if e.is_key_tokens_remaining() => continue,
                Err(e) => return Err(e),
            };

            if value.as_str() == Some(leaf) || value.contains(leaf) {
                log::trace!("Search for '{}' matched at '{}'", leaf, candidate);
                found.push(candidate.child(leaf));
            } else if value.is_sequence() {
                queue.extend(value.tokens().into_iter().map(|t| candidate.child(t)));
            }
        }

        Ok(found)
    }
}

/// Descend while the current node is a mapping holding the next token.
/// Returns the node reached and the number of tokens consumed.
fn walk<'a>(root: &'a Value, tokens: &[String]) -> (&'a Value, usize) {
    let mut current = root;
    for (consumed, token) in tokens.iter().enumerate() {
        match current {
            Value::Mapping(map) if map.contains_key(token.as_str()) => {
                current = &map[token.as_str()];
            }
            _ => return (current, consumed),
        }
    }
    (current, tokens.len())
}

fn indirection_target(path: &KeyPath, consumed: usize, marker: &Value) -> Result<KeyPath> {
    let at = || KeyPath::new(path.tokens()[..consumed].to_vec()).child(INDIRECTION_KEY);
    let items = marker.as_sequence().ok_or_else(|| {
        Error::unknown_value_type(at().to_string(), marker.type_name(), marker.to_string())
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                Error::unknown_value_type(at().to_string(), item.type_name(), item.to_string())
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(KeyPath::new)
}
