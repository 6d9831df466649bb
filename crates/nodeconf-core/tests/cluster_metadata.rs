use std::collections::BTreeSet;
use std::path::PathBuf;

use nodeconf_core::{ConfigStore, ErrorKind, Macros, MetadataSource, Resolver, ResolverOptions};
use pretty_assertions::assert_eq;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nodeconf_it_{}", name));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_cluster_fqdns_across_nodegroups() {
    let store = ConfigStore::from_json(
        r#"{"nodegroups": {"ng1": {"fqdns": ["h1.local", "h2.local"]}, "ng2": {"fqdns": ["h3.local"]}}}"#,
    )
    .unwrap();
    let resolver = Resolver::new(&store);
    let macros = Macros::new(&resolver);

    assert_eq!(
        macros.cluster_fqdns().unwrap(),
        vec!["h1.local", "h2.local", "h3.local"]
    );
    assert_eq!(macros.num_nodegroups().unwrap(), 2);

    let err = macros.nodegroup_fqdns("ng9").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotFound { .. }));
}

#[test]
fn test_node_index_orders_by_numeric_suffix() {
    let store = ConfigStore::from_json(
        r#"{"nodegroups": {"1": {"roles": {"worker": {"node_ids": ["node3", "node10", "node1"]}}}}}"#,
    )
    .unwrap();
    let resolver = Resolver::new(&store);
    let macros = Macros::new(&resolver);

    assert_eq!(macros.node_index("node1").unwrap(), "0");
    assert_eq!(macros.node_index("node3").unwrap(), "1");
    assert_eq!(macros.node_index("node10").unwrap(), "2");
}

#[test]
fn test_load_overlay_and_resolve_from_files() {
    let dir = temp_dir("overlay");
    let public = dir.join("configmeta.json");
    let private = dir.join("priv.json");
    std::fs::write(
        &public,
        r#"{
            "node": {"id": "node1", "fqdn": "h1.local", "nodegroup_id": "1"},
            "nodegroups": {"1": {"roles": {"controller": {
                "node_ids": ["node1"],
                "fqdns": ["h1.local"],
                "fqdn_mappings": {"h1.local": "node1"}
            }}}},
            "services": {"spark": {"1": {"controller": {
                "bdvlibrefkey": ["nodegroups", "1", "roles", "controller"]
            }}}}
        }"#,
    )
    .unwrap();
    std::fs::write(&private, r#"{"auth": {"keytab": "/etc/krb5.keytab"}}"#).unwrap();

    let store = ConfigStore::load(&[
        MetadataSource::required(&public),
        MetadataSource::optional(dir.join("platform.json")),
        MetadataSource::optional(&private),
    ])
    .unwrap();
    let resolver = Resolver::new(&store);
    let macros = Macros::new(&resolver);

    assert_eq!(macros.get("auth.keytab").unwrap(), "/etc/krb5.keytab");
    assert_eq!(macros.get("services.spark.1.controller.fqdns").unwrap(), "h1.local");
    assert_eq!(macros.self_node_index().unwrap(), "0");
    assert_eq!(macros.node_id_for_fqdn("h1.local").unwrap(), "node1");
    assert_eq!(macros.local_group_fqdns().unwrap(), vec!["h1.local"]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_search_finds_every_path() {
    let store = ConfigStore::from_json(
        r#"{"services": {
            "spark": {"1": {"master": {"endpoints": ["a"]}, "worker": {"endpoints": ["b"]}}},
            "hdfs": {"1": {"namenode": {"endpoints": ["c"]}, "datanode": {"ports": [50010]}}}
        }}"#,
    )
    .unwrap();
    let resolver = Resolver::new(&store);

    let found: BTreeSet<String> = resolver
        .search("services", "endpoints")
        .unwrap()
        .into_iter()
        .map(|p| p.to_string())
        .collect();
    let expected: BTreeSet<String> = [
        "services.spark.1.master.endpoints",
        "services.spark.1.worker.endpoints",
        "services.hdfs.1.namenode.endpoints",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    assert_eq!(found, expected);
}

#[test]
fn test_indirection_cycle_bounded_by_option() {
    let store = ConfigStore::from_json(
        r#"{"a": {"bdvlibrefkey": ["b"]}, "b": {"bdvlibrefkey": ["a"]}}"#,
    )
    .unwrap();
    let resolver = Resolver::with_options(
        &store,
        ResolverOptions {
            max_indirections: Some(16),
        },
    );

    let err = resolver.resolve("a.x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndirectionDepthExceeded { limit: 16 });
}
