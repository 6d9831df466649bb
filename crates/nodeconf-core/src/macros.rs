//! Derived queries over the metadata
//!
//! Every macro here is built from [`Resolver::resolve`] and
//! [`Resolver::search`] alone and keeps no state of its own.

use indexmap::IndexSet;

use crate::error::{Error, Result};
use crate::key::{KeyInput, KeyPath, DEFAULT_DELIMITER};
use crate::resolver::{ResolvedValue, Resolver};
use crate::value::Value;

/// Top-level namespaces reported for the `namespaces` pseudo-key
pub const NAMESPACES: [&str; 8] = [
    "version", "node", "cluster", "distro", "services", "tenant", "auth", "platform",
];

/// Macro queries borrowing a [`Resolver`]
#[derive(Debug, Clone, Copy)]
pub struct Macros<'r> {
    resolver: &'r Resolver,
}

impl<'r> Macros<'r> {
    pub fn new(resolver: &'r Resolver) -> Self {
        Self { resolver }
    }

    /// Look up a dotted key and render the value as a string
    pub fn get(&self, key: &str) -> Result<String> {
        self.get_with_delimited_key(key, DEFAULT_DELIMITER)
    }

    /// Look up `key` split on `delim` and render the value as a string.
    ///
    /// Sequences are comma-joined, booleans are `true`/`false`, null is the
    /// empty string. The key `namespaces` (or an empty key) lists the
    /// top-level namespaces without consulting the document.
    pub fn get_with_delimited_key(&self, key: &str, delim: &str) -> Result<String> {
        if key == "namespaces" || key.is_empty() {
            return Ok(NAMESPACES.join(","));
        }

        let value = self.resolver.resolve(KeyInput::delimited(key, delim))?;
        render(key, &value)
    }

    /// FQDNs of every node in nodegroup `nodegroup_id`, deduplicated in
    /// first-seen order
    pub fn nodegroup_fqdns(&self, nodegroup_id: &str) -> Result<Vec<String>> {
        let start = KeyPath::from(["nodegroups", nodegroup_id]);
        let matches = self.resolver.search(&start, "fqdns")?;
        if matches.is_empty() {
            return Err(Error::not_found(format!("nodegroup {}", nodegroup_id))
                .with_path(start.to_string()));
        }

        let mut fqdns = IndexSet::new();
        for path in matches {
            self.collect_strings(&path, &mut fqdns)?;
        }
        Ok(fqdns.into_iter().collect())
    }

    /// FQDNs of every node in the cluster
    pub fn cluster_fqdns(&self) -> Result<Vec<String>> {
        let mut fqdns = IndexSet::new();
        for nodegroup_id in self.key_set(KeyPath::from(["nodegroups"]))? {
            fqdns.extend(self.nodegroup_fqdns(&nodegroup_id)?);
        }
        Ok(fqdns.into_iter().collect())
    }

    /// FQDNs of the nodes in this node's own nodegroup
    pub fn local_group_fqdns(&self) -> Result<Vec<String>> {
        let nodegroup_id = self.get_tokens(["node", "nodegroup_id"])?;
        self.nodegroup_fqdns(&nodegroup_id)
    }

    pub fn num_nodegroups(&self) -> Result<usize> {
        Ok(self.key_set(KeyPath::from(["nodegroups"]))?.len())
    }

    /// Zero-based position of `node_id` among all node ids of the cluster,
    /// ordered by the numeric suffix of each id
    pub fn node_index(&self, node_id: &str) -> Result<String> {
        let mut node_ids = Vec::new();
        for path in self.resolver.search(["nodegroups"], "node_ids")? {
            let value = self.resolver.resolve(&path)?;
            if value.is_sequence() {
                node_ids.extend(value.tokens().into_iter().map(str::to_string));
            } else {
                node_ids.push(render(&path.to_string(), &value)?);
            }
        }

        node_ids.sort_by_key(|id| numeric_suffix(id));
        node_ids
            .iter()
            .position(|id| id == node_id)
            .map(|index| index.to_string())
            .ok_or_else(|| Error::not_found(format!("node id {}", node_id)))
    }

    /// Node id of the node with `fqdn`, from the nodegroups' fqdn mappings
    pub fn node_id_for_fqdn(&self, fqdn: &str) -> Result<String> {
        for mapping in self.resolver.search(["nodegroups"], "fqdn_mappings")? {
            let hits = self.resolver.search(&mapping, fqdn)?;
            if let Some(first) = hits.first() {
                let value = self.resolver.resolve(first)?;
                return render(&first.to_string(), &value);
            }
        }
        Err(Error::node_not_found(fqdn))
    }

    pub fn node_index_for_fqdn(&self, fqdn: &str) -> Result<String> {
        let node_id = self.node_id_for_fqdn(fqdn)?;
        self.node_index(&node_id)
    }

    pub fn self_node_id(&self) -> Result<String> {
        self.get_tokens(["node", "id"])
    }

    pub fn self_node_index(&self) -> Result<String> {
        let node_id = self.self_node_id()?;
        self.node_index(&node_id)
    }

    /// Every tenant info entry as a `key=value` string
    pub fn tenant_info(&self) -> Result<Vec<String>> {
        self.key_set(KeyPath::from(["cluster", "tenant_info"]))?
            .into_iter()
            .map(|key| {
                let value = self.tenant_info_key(&key)?;
                Ok(format!("{}={}", key, value))
            })
            .collect()
    }

    /// A single tenant info value
    pub fn tenant_info_key(&self, key: &str) -> Result<String> {
        self.get_tokens(["cluster", "tenant_info", key])
    }

    fn get_tokens<const N: usize>(&self, tokens: [&str; N]) -> Result<String> {
        let path = KeyPath::from(tokens);
        let value = self.resolver.resolve(&path)?;
        render(&path.to_string(), &value)
    }

    /// Resolve `path` and require a sequence; returns its string tokens
    fn key_set(&self, path: KeyPath) -> Result<Vec<String>> {
        let value = self.resolver.resolve(&path)?;
        if !value.is_sequence() {
            return Err(Error::unknown_value_type(
                path.to_string(),
                value.type_name(),
                render(&path.to_string(), &value)?,
            ));
        }
        Ok(value.tokens().into_iter().map(str::to_string).collect())
    }

    /// Resolve `path` and add its string elements (or its rendered scalar)
    fn collect_strings(&self, path: &KeyPath, into: &mut IndexSet<String>) -> Result<()> {
        let value = self.resolver.resolve(path)?;
        if value.is_sequence() {
            into.extend(value.tokens().into_iter().map(str::to_string));
        } else {
            into.insert(render(&path.to_string(), &value)?);
        }
        Ok(())
    }
}

/// Render a resolved value the way `get` reports it
pub fn render(path: &str, value: &ResolvedValue) -> Result<String> {
    match value {
        ResolvedValue::Null => Ok(String::new()),
        ResolvedValue::String(s) => Ok(s.clone()),
        ResolvedValue::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        ResolvedValue::Integer(i) => Ok(i.to_string()),
        ResolvedValue::Keys(keys) => Ok(keys.join(",")),
        ResolvedValue::List(items) => {
            let parts = items
                .iter()
                .map(|item| render_element(path, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
    }
}

fn render_element(path: &str, item: &Value) -> Result<String> {
    match item {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(_) | Value::Sequence(_) | Value::Mapping(_) => Err(
            Error::unknown_value_type(path, item.type_name(), item.to_string()),
        ),
    }
}

/// The trailing run of ASCII digits of `id` as a number; 0 if there is none
fn numeric_suffix(id: &str) -> u64 {
    let digits = id.len() - id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    id[id.len() - digits..].bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::ConfigStore;
    use pretty_assertions::assert_eq;

    const CLUSTER: &str = r#"{
        "version": "7",
        "node": {
            "id": "node2",
            "fqdn": "h2.local",
            "nodegroup_id": "1",
            "role_id": "worker"
        },
        "nodegroups": {
            "1": {
                "distro_id": "bluedata/spark",
                "catalog_service_ids": ["spark"],
                "roles": {
                    "controller": {
                        "node_ids": ["node1"],
                        "fqdns": ["h1.local"],
                        "fqdn_mappings": {"h1.local": "node1"},
                        "flavor": {"cores": 2, "gpu": false}
                    },
                    "worker": {
                        "node_ids": ["node10", "node2"],
                        "fqdns": ["h10.local", "h2.local"],
                        "fqdn_mappings": {"h10.local": "node10", "h2.local": "node2"}
                    }
                }
            },
            "2": {
                "roles": {
                    "edge": {
                        "node_ids": ["node3"],
                        "fqdns": ["h3.local", "h1.local"],
                        "fqdn_mappings": {"h3.local": "node3"}
                    }
                }
            }
        },
        "cluster": {
            "name": "spark-prod",
            "isolated": false,
            "tenant_info": {"id": "tenant-3", "is_ml_tenant": true, "quota": 12}
        },
        "services": {
            "spark": {"bdvlibrefkey": ["nodegroups", "1", "roles", "controller"]}
        },
        "misc": {"nothing": null, "mixed": ["a", 1, true], "nested": [["x"]]}
    }"#;

    fn resolver() -> Resolver {
        Resolver::new(&ConfigStore::from_json(CLUSTER).unwrap())
    }

    #[test]
    fn test_get_namespaces_is_fixed() {
        let r = resolver();
        let m = Macros::new(&r);
        let expected = "version,node,cluster,distro,services,tenant,auth,platform";

        assert_eq!(m.get("namespaces").unwrap(), expected);
        assert_eq!(m.get("").unwrap(), expected);
    }

    #[test]
    fn test_get_formats_values() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(m.get("node.fqdn").unwrap(), "h2.local");
        assert_eq!(m.get("cluster.tenant_info.is_ml_tenant").unwrap(), "true");
        assert_eq!(m.get("cluster.isolated").unwrap(), "false");
        assert_eq!(m.get("cluster.tenant_info.quota").unwrap(), "12");
        assert_eq!(m.get("misc.nothing").unwrap(), "");
        assert_eq!(m.get("node").unwrap(), "id,fqdn,nodegroup_id,role_id");
        assert_eq!(m.get("misc.mixed").unwrap(), "a,1,true");
    }

    #[test]
    fn test_get_with_custom_delimiter() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(m.get_with_delimited_key("node/id", "/").unwrap(), "node2");
    }

    #[test]
    fn test_get_through_indirection() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(m.get("services.spark.fqdns").unwrap(), "h1.local");
    }

    #[test]
    fn test_get_nested_list_is_unknown_type() {
        let r = resolver();
        let m = Macros::new(&r);
        let err = m.get("misc.nested").unwrap_err();

        assert!(matches!(err.kind, ErrorKind::UnknownValueType { .. }));
    }

    #[test]
    fn test_nodegroup_fqdns() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(
            m.nodegroup_fqdns("1").unwrap(),
            vec!["h1.local", "h10.local", "h2.local"]
        );
    }

    #[test]
    fn test_nodegroup_fqdns_unknown_group() {
        let r = resolver();
        let m = Macros::new(&r);
        let err = m.nodegroup_fqdns("9").unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::NotFound {
                what: "nodegroup 9".into()
            }
        );
    }

    #[test]
    fn test_cluster_fqdns_dedupes_across_groups() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(
            m.cluster_fqdns().unwrap(),
            vec!["h1.local", "h10.local", "h2.local", "h3.local"]
        );
    }

    #[test]
    fn test_local_group_fqdns() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(m.local_group_fqdns().unwrap(), m.nodegroup_fqdns("1").unwrap());
    }

    #[test]
    fn test_num_nodegroups() {
        let r = resolver();
        assert_eq!(Macros::new(&r).num_nodegroups().unwrap(), 2);
    }

    #[test]
    fn test_node_index_sorts_by_numeric_suffix() {
        let r = resolver();
        let m = Macros::new(&r);

        // node1, node2, node3, node10
        assert_eq!(m.node_index("node1").unwrap(), "0");
        assert_eq!(m.node_index("node2").unwrap(), "1");
        assert_eq!(m.node_index("node3").unwrap(), "2");
        assert_eq!(m.node_index("node10").unwrap(), "3");
        assert_eq!(m.self_node_index().unwrap(), "1");
    }

    #[test]
    fn test_node_index_unknown_id() {
        let r = resolver();
        let err = Macros::new(&r).node_index("node99").unwrap_err();

        assert!(matches!(err.kind, ErrorKind::NotFound { .. }));
    }

    #[test]
    fn test_node_index_keeps_repeated_ids() {
        let store = ConfigStore::from_json(
            r#"{"nodegroups": {"1": {"node_ids": ["node1", "node1", "node2"]}}}"#,
        )
        .unwrap();
        let r = Resolver::new(&store);
        let m = Macros::new(&r);

        assert_eq!(m.node_index("node1").unwrap(), "0");
        assert_eq!(m.node_index("node2").unwrap(), "2");
    }

    #[test]
    fn test_node_id_for_fqdn() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(m.node_id_for_fqdn("h10.local").unwrap(), "node10");
        assert_eq!(m.node_id_for_fqdn("h3.local").unwrap(), "node3");
        assert_eq!(m.node_index_for_fqdn("h10.local").unwrap(), "3");
        assert_eq!(m.self_node_id().unwrap(), "node2");
    }

    #[test]
    fn test_node_id_for_unmapped_fqdn() {
        let r = resolver();
        let err = Macros::new(&r).node_id_for_fqdn("h99.local").unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::NodeNotFound {
                fqdn: "h99.local".into()
            }
        );
    }

    #[test]
    fn test_tenant_info() {
        let r = resolver();
        let m = Macros::new(&r);

        assert_eq!(
            m.tenant_info().unwrap(),
            vec!["id=tenant-3", "is_ml_tenant=true", "quota=12"]
        );
        assert_eq!(m.tenant_info_key("id").unwrap(), "tenant-3");
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(numeric_suffix("node10"), 10);
        assert_eq!(numeric_suffix("node"), 0);
        assert_eq!(numeric_suffix("7"), 7);
        assert_eq!(numeric_suffix("a1b02"), 2);
        assert_eq!(numeric_suffix("n99999999999999999999999"), u64::MAX);
    }

    #[test]
    fn test_node_index_documented_example() {
        let store = ConfigStore::from_json(
            r#"{"nodegroups": {"1": {"node_ids": ["node3", "node10", "node1"]}}}"#,
        )
        .unwrap();
        let r = Resolver::new(&store);
        let m = Macros::new(&r);

        assert_eq!(m.node_index("node1").unwrap(), "0");
        assert_eq!(m.node_index("node3").unwrap(), "1");
        assert_eq!(m.node_index("node10").unwrap(), "2");
    }
}
