//! nodeconf-core: read-only access to a node's cluster metadata
//!
//! This crate loads the metadata document describing a virtual cluster,
//! resolves key paths through it (following `bdvlibrefkey` indirections),
//! searches it for leaf keys, and offers cluster-level macros on top.
//!
//! # Example
//!
//! ```rust
//! use nodeconf_core::{ConfigStore, Macros, Resolver};
//!
//! let json = r#"{
//!     "node": {"id": "node1", "fqdn": "h1.local", "nodegroup_id": "1"},
//!     "nodegroups": {"1": {"roles": {"controller": {
//!         "node_ids": ["node1"],
//!         "fqdns": ["h1.local"]
//!     }}}}
//! }"#;
//!
//! let store = ConfigStore::from_json(json).unwrap();
//! let resolver = Resolver::new(&store);
//! let macros = Macros::new(&resolver);
//!
//! assert_eq!(macros.get("node.fqdn").unwrap(), "h1.local");
//! assert_eq!(macros.nodegroup_fqdns("1").unwrap(), vec!["h1.local"]);
//! ```

pub mod agent;
pub mod error;
pub mod key;
pub mod macros;
pub mod resolver;
pub mod store;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use key::{KeyInput, KeyPath};
pub use macros::Macros;
pub use resolver::{ResolvedValue, Resolver, ResolverOptions};
pub use store::{ConfigStore, MetadataPaths, MetadataSource};
pub use value::Value;
