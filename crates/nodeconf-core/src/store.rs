//! Loading the metadata document
//!
//! The document is assembled once from up to three JSON files (public,
//! platform and private metadata) and is read-only afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Default location of the public metadata document
pub const PUBLIC_METADATA_FILE: &str = "/etc/guestconfig/configmeta.json";
/// Default location of the platform metadata overlay
pub const PLATFORM_METADATA_FILE: &str = "/etc/guestconfig/.platform.json";
/// Default location of the private metadata overlay
pub const PRIVATE_METADATA_FILE: &str = "/etc/guestconfig/.priv_configmeta.json";

/// A metadata file to load, either required or optional
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSource {
    pub path: PathBuf,
    /// Failure to load a required source is fatal; optional ones are skipped
    pub required: bool,
}

impl MetadataSource {
    /// Create a required source
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    /// Create an optional source
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

/// Locations of the three metadata files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPaths {
    pub public: PathBuf,
    pub platform: PathBuf,
    pub private: PathBuf,
}

impl Default for MetadataPaths {
    fn default() -> Self {
        Self {
            public: PathBuf::from(PUBLIC_METADATA_FILE),
            platform: PathBuf::from(PLATFORM_METADATA_FILE),
            private: PathBuf::from(PRIVATE_METADATA_FILE),
        }
    }
}

impl MetadataPaths {
    /// Build the ordered source list.
    ///
    /// The platform and private overlays are only included for a privileged
    /// caller that can read the private file.
    pub fn sources(&self, privileged: bool) -> Vec<MetadataSource> {
        let mut sources = vec![MetadataSource::required(&self.public)];
        if privileged && is_readable(&self.private) {
            sources.push(MetadataSource::optional(&self.platform));
            sources.push(MetadataSource::optional(&self.private));
        }
        sources
    }
}

fn is_readable(path: &Path) -> bool {
    std::fs::File::open(path).is_ok()
}

/// Whether the current process runs with elevated privilege
#[cfg(unix)]
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether the current process runs with elevated privilege
#[cfg(not(unix))]
pub fn is_privileged() -> bool {
    false
}

/// The loaded, immutable metadata document
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: Arc<Value>,
}

impl ConfigStore {
    /// Wrap an already-built document
    pub fn from_value(value: Value) -> Self {
        Self {
            root: Arc::new(value),
        }
    }

    /// Parse a document from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value = parse_document(json).map_err(|e| Error::config_load("<string>", e))?;
        Ok(Self::from_value(value))
    }

    /// Load the default sources for the current process's privilege level
    pub fn open(paths: &MetadataPaths) -> Result<Self> {
        Self::load(&paths.sources(is_privileged()))
    }

    /// Load and shallow-merge `sources` in order.
    ///
    /// Later sources overwrite top-level keys of earlier ones. The first
    /// source is always treated as required.
    pub fn load(sources: &[MetadataSource]) -> Result<Self> {
        let mut merged = Value::Mapping(IndexMap::new());

        for (i, source) in sources.iter().enumerate() {
            let required = source.required || i == 0;
            match read_document(&source.path) {
                Ok(value) => {
                    log::debug!("Loaded metadata from {}", source.path.display());
                    merged.merge_top_level(value);
                }
                Err(cause) if required => {
                    return Err(Error::config_load(source.path.display().to_string(), cause));
                }
                Err(cause) => {
                    log::debug!(
                        "Skipping optional metadata {}: {}",
                        source.path.display(),
                        cause
                    );
                }
            }
        }

        Ok(Self::from_value(merged))
    }

    /// The document root
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// A shared handle to the document root
    pub fn shared_root(&self) -> Arc<Value> {
        Arc::clone(&self.root)
    }
}

fn read_document(path: &Path) -> std::result::Result<Value, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_document(&content)
}

fn parse_document(content: &str) -> std::result::Result<Value, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if !value.is_mapping() {
        return Err(format!(
            "Expected a JSON object at the top level, got {}",
            value.type_name()
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nodeconf_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_single_required() {
        let dir = temp_dir("store_single");
        let public = dir.join("configmeta.json");
        std::fs::write(&public, r#"{"node": {"fqdn": "h1.local"}}"#).unwrap();

        let store = ConfigStore::load(&[MetadataSource::required(&public)]).unwrap();
        let node = store.root().as_mapping().unwrap().get("node").unwrap();
        assert_eq!(node.as_mapping().unwrap()["fqdn"].as_str(), Some("h1.local"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_later_sources_overwrite_top_level_keys() {
        let dir = temp_dir("store_overlay");
        let public = dir.join("configmeta.json");
        let private = dir.join("priv.json");
        std::fs::write(&public, r#"{"node": {"fqdn": "h1", "id": "n1"}, "version": 3}"#).unwrap();
        std::fs::write(&private, r#"{"node": {"fqdn": "h2"}, "auth": {"key": "s"}}"#).unwrap();

        let store = ConfigStore::load(&[
            MetadataSource::required(&public),
            MetadataSource::optional(&private),
        ])
        .unwrap();
        let root = store.root().as_mapping().unwrap();

        // Shallow merge: the whole "node" subtree was replaced
        let node = root["node"].as_mapping().unwrap();
        assert_eq!(node["fqdn"].as_str(), Some("h2"));
        assert!(node.get("id").is_none());
        assert_eq!(root["version"].as_i64(), Some(3));
        assert!(root.contains_key("auth"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_optional_missing_is_skipped() {
        let dir = temp_dir("store_optional_missing");
        let public = dir.join("configmeta.json");
        std::fs::write(&public, r#"{"version": 1}"#).unwrap();

        let store = ConfigStore::load(&[
            MetadataSource::required(&public),
            MetadataSource::optional(dir.join("missing.json")),
        ])
        .unwrap();
        assert_eq!(store.root().as_mapping().unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_optional_malformed_is_skipped_whole() {
        let dir = temp_dir("store_optional_malformed");
        let public = dir.join("configmeta.json");
        let broken = dir.join("platform.json");
        std::fs::write(&public, r#"{"version": 1}"#).unwrap();
        std::fs::write(&broken, r#"{"platform": {"name": "x"}, "#).unwrap();

        let store = ConfigStore::load(&[
            MetadataSource::required(&public),
            MetadataSource::optional(&broken),
        ])
        .unwrap();
        assert!(!store.root().as_mapping().unwrap().contains_key("platform"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_required_missing_errors() {
        let dir = temp_dir("store_required_missing");
        let missing = dir.join("configmeta.json");

        let err = ConfigStore::load(&[MetadataSource::required(&missing)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigLoad { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_first_source_is_always_required() {
        let dir = temp_dir("store_first_required");
        let err = ConfigStore::load(&[MetadataSource::optional(dir.join("nope.json"))]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigLoad { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = ConfigStore::from_json("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("Expected a JSON object"));
    }

    #[test]
    fn test_sources_unprivileged_only_public() {
        let paths = MetadataPaths::default();
        let sources = paths.sources(false);

        assert_eq!(sources, vec![MetadataSource::required(PUBLIC_METADATA_FILE)]);
    }

    #[test]
    fn test_sources_privileged_with_readable_private() {
        let dir = temp_dir("store_privileged_sources");
        let private = dir.join("priv.json");
        std::fs::write(&private, "{}").unwrap();

        let paths = MetadataPaths {
            public: dir.join("configmeta.json"),
            platform: dir.join("platform.json"),
            private: private.clone(),
        };
        let sources = paths.sources(true);

        assert_eq!(sources.len(), 3);
        assert!(sources[0].required);
        assert_eq!(sources[1], MetadataSource::optional(dir.join("platform.json")));
        assert_eq!(sources[2], MetadataSource::optional(&private));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sources_privileged_without_private_file() {
        let dir = temp_dir("store_privileged_no_private");
        let paths = MetadataPaths {
            public: dir.join("configmeta.json"),
            platform: dir.join("platform.json"),
            private: dir.join("missing.json"),
        };
        assert_eq!(paths.sources(true).len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
