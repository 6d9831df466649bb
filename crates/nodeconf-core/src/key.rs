//! Key paths into the metadata tree
//!
//! A [`KeyPath`] is the canonical form every lookup works on. Callers may hand
//! in either ready-made tokens or a delimited string; [`KeyInput`] captures
//! both and is converted exactly once at the API boundary.

use std::fmt;

/// Default delimiter for dotted keys such as `node.fqdn`
pub const DEFAULT_DELIMITER: &str = ".";

/// An ordered sequence of key tokens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Create a key path from tokens
    pub fn new(tokens: Vec<String>) -> Self {
        Self(tokens)
    }

    /// Split `key` on `delim` into a key path.
    ///
    /// An empty `key` yields an empty path (which lookups reject).
    pub fn parse(key: &str, delim: &str) -> Self {
        if key.is_empty() {
            return Self::default();
        }
        Self(key.split(delim).map(str::to_string).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return a new path with `token` appended
    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.0.clone();
        tokens.push(token.into());
        Self(tokens)
    }

    /// Return a new path with `tail` appended
    pub fn join(&self, tail: &[String]) -> Self {
        let mut tokens = self.0.clone();
        tokens.extend_from_slice(tail);
        Self(tokens)
    }

    /// The parent path, or `None` for an empty path
    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.to_vec()))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(DEFAULT_DELIMITER))
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens)
    }
}

impl From<&[&str]> for KeyPath {
    fn from(tokens: &[&str]) -> Self {
        Self(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(tokens: [&str; N]) -> Self {
        Self(tokens.iter().map(|t| t.to_string()).collect())
    }
}

/// A key as supplied by a caller: tokens, or a string still to be split
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    /// Already tokenized
    Tokens(KeyPath),
    /// A delimited string such as `node.fqdn`
    Delimited { key: String, delim: String },
}

impl KeyInput {
    /// A delimited key using a custom delimiter
    pub fn delimited(key: impl Into<String>, delim: impl Into<String>) -> Self {
        KeyInput::Delimited {
            key: key.into(),
            delim: delim.into(),
        }
    }

    /// Convert into the canonical key path
    pub fn into_key_path(self) -> KeyPath {
        match self {
            KeyInput::Tokens(path) => path,
            KeyInput::Delimited { key, delim } => KeyPath::parse(&key, &delim),
        }
    }
}

impl From<KeyPath> for KeyInput {
    fn from(path: KeyPath) -> Self {
        KeyInput::Tokens(path)
    }
}

impl From<&KeyPath> for KeyInput {
    fn from(path: &KeyPath) -> Self {
        KeyInput::Tokens(path.clone())
    }
}

impl From<Vec<String>> for KeyInput {
    fn from(tokens: Vec<String>) -> Self {
        KeyInput::Tokens(KeyPath(tokens))
    }
}

impl From<&[&str]> for KeyInput {
    fn from(tokens: &[&str]) -> Self {
        KeyInput::Tokens(tokens.into())
    }
}

impl<const N: usize> From<[&str; N]> for KeyInput {
    fn from(tokens: [&str; N]) -> Self {
        KeyInput::Tokens(tokens.into())
    }
}

impl From<&str> for KeyInput {
    fn from(key: &str) -> Self {
        KeyInput::delimited(key, DEFAULT_DELIMITER)
    }
}

impl From<String> for KeyInput {
    fn from(key: String) -> Self {
        KeyInput::delimited(key, DEFAULT_DELIMITER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_key() {
        let path = KeyPath::parse("node.fqdn", ".");
        assert_eq!(path.tokens(), ["node", "fqdn"]);
        assert_eq!(path.to_string(), "node.fqdn");
    }

    #[test]
    fn test_parse_custom_delimiter() {
        let path = KeyPath::parse("services/spark/master", "/");
        assert_eq!(path.tokens(), ["services", "spark", "master"]);
    }

    #[test]
    fn test_parse_empty_key() {
        assert!(KeyPath::parse("", ".").is_empty());
    }

    #[test]
    fn test_child_does_not_alias_parent() {
        let parent = KeyPath::from(["nodegroups"]);
        let a = parent.child("ng1");
        let b = parent.child("ng2");

        assert_eq!(parent.len(), 1);
        assert_eq!(a.tokens(), ["nodegroups", "ng1"]);
        assert_eq!(b.tokens(), ["nodegroups", "ng2"]);
    }

    #[test]
    fn test_join_and_parent() {
        let path = KeyPath::from(["a"]).join(&["b".to_string(), "c".to_string()]);
        assert_eq!(path.tokens(), ["a", "b", "c"]);
        assert_eq!(path.parent().unwrap().tokens(), ["a", "b"]);
        assert!(KeyPath::default().parent().is_none());
    }

    #[test]
    fn test_key_input_conversions() {
        let from_str: KeyInput = "node.id".into();
        let from_tokens: KeyInput = ["node", "id"].into();

        assert_eq!(from_str.into_key_path(), from_tokens.into_key_path());
        assert_eq!(
            KeyInput::delimited("a:b", ":").into_key_path().tokens(),
            ["a", "b"]
        );
    }
}
