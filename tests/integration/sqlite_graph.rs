#![allow(missing_docs)]

use std::sync::Arc;

use serde::Deserialize;
use sombra_match::{
    where_, Edge, EdgeSelector, EntityKind, Graph, MatchError, MatchMaker, MatchSpecification,
    Mode, Node, NodeSelector, RowStore, SqliteStore, StoreConfig, SynchronousMode, TypeRegistry,
};
use tempfile::tempdir;

#[derive(Debug, Deserialize)]
struct Scion {
    name: String,
    birth: i64,
    death: i64,
    title: Option<String>,
}

fn scion(id: &str, name: &str, birth: i64, death: i64, title: Option<&str>) -> Node {
    let node = Node::new(id, "scion")
        .with_label("habsburg")
        .with_attribute("name", name)
        .with_attribute("birth", birth)
        .with_attribute("death", death);
    match title {
        Some(title) => node.with_attribute("title", title),
        None => node,
    }
}

fn habsburgs() -> (Vec<Node>, Vec<Edge>) {
    let nodes = vec![
        scion("maximilian-i", "Maximilian I", 1459, 1519, Some("Holy Roman Emperor")),
        scion("philip-i", "Philip I", 1478, 1506, Some("King of Castile")),
        scion("charles-v", "Charles V", 1500, 1558, Some("Holy Roman Emperor")),
        scion("ferdinand-i", "Ferdinand I", 1503, 1564, Some("Holy Roman Emperor")),
        scion("eleanor", "Eleanor of Austria", 1498, 1558, None),
    ];
    let edges = vec![
        Edge::new("p1", "maximilian-i", "is_parent_of", "philip-i"),
        Edge::new("p2", "philip-i", "is_parent_of", "charles-v"),
        Edge::new("p3", "philip-i", "is_parent_of", "ferdinand-i"),
        Edge::new("p4", "philip-i", "is_parent_of", "eleanor"),
    ];
    (nodes, edges)
}

fn populated() -> Graph {
    let graph = Graph::in_memory().unwrap();
    let (nodes, edges) = habsburgs();
    graph.set_nodes(&nodes).unwrap();
    graph.set_edges(&edges).unwrap();
    graph
}

fn ids(nodes: &[Node]) -> Vec<&str> {
    let mut ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort_unstable();
    ids
}

#[test]
fn emperors_are_found_by_title() {
    let graph = populated();
    let spec = MatchMaker::new()
        .where_("title", "equals", "Holy Roman Emperor")
        .build()
        .unwrap();
    assert_eq!(
        spec.compile(EntityKind::Node).sql(),
        "json_extract(data, '$.title') = ?"
    );

    let emperors = graph.nodes(&spec).unwrap();
    assert_eq!(ids(&emperors), ["charles-v", "ferdinand-i", "maximilian-i"]);
    for emperor in &emperors {
        assert!(spec.evaluate(emperor));
    }
    let eleanor = graph.get_node("eleanor").unwrap().unwrap();
    assert!(!spec.evaluate(&eleanor));
}

#[test]
fn ranges_groups_and_functions() {
    let graph = populated();
    let born_1500s = MatchMaker::new()
        .where_map("birth", [("notlessthan", 1500), ("lessthan", 1600)])
        .build()
        .unwrap();
    assert_eq!(
        ids(&graph.nodes(&born_1500s).unwrap()),
        ["charles-v", "ferdinand-i"]
    );

    let untitled_or_short_lived = MatchMaker::new()
        .group(Mode::Any, |g| {
            g.missing("title").within("death", [1500, 1510]);
        })
        .build()
        .unwrap();
    assert_eq!(
        ids(&graph.nodes(&untitled_or_short_lived).unwrap()),
        ["eleanor", "philip-i"]
    );

    let not_emperors = MatchMaker::new()
        .group(Mode::None, |g| {
            g.equals("title", "Holy Roman Emperor");
        })
        .with_fn(|e| e.id().contains('i'))
        .build()
        .unwrap();
    assert_eq!(ids(&graph.nodes(&not_emperors).unwrap()), ["philip-i"]);
    assert_eq!(graph.count_nodes(&not_emperors).unwrap(), 1);
}

#[test]
fn ids_and_selectors() {
    let graph = populated();
    let spec = MatchSpecification::ids(["charles-v", "eleanor", "nobody"]).unwrap();
    assert_eq!(ids(&graph.nodes(&spec).unwrap()), ["charles-v", "eleanor"]);
    let single = MatchSpecification::ids(["philip-i"]).unwrap();
    assert_eq!(graph.nodes(&single).unwrap()[0].id, "philip-i");

    assert_eq!(graph.match_nodes(&NodeSelector::label("habsburg")).unwrap().len(), 5);
    assert!(graph.match_nodes(&NodeSelector::label("habs")).unwrap().is_empty());
    assert_eq!(graph.match_nodes(&NodeSelector::node_type("scion")).unwrap().len(), 5);

    let touching = graph.match_edges(&EdgeSelector::touching("philip-i")).unwrap();
    assert_eq!(touching.len(), 4);
    let children = graph
        .match_edges(&EdgeSelector {
            source: Some("philip-i".into()),
            predicate: Some("is_parent_of".into()),
            ..EdgeSelector::default()
        })
        .unwrap();
    assert_eq!(children.len(), 3);
}

#[test]
fn malformed_values_return_nothing() {
    let graph = populated();
    let spec = MatchMaker::new()
        .where_("birth", "between", vec!["early", "late"])
        .build()
        .unwrap();
    assert!(spec.compile(EntityKind::Node).is_never());
    assert!(graph.nodes(&spec).unwrap().is_empty());
    assert_eq!(graph.count_nodes(&spec).unwrap(), 0);

    let err = MatchMaker::new().where_("birth", "bt", [0, 1]).build().unwrap_err();
    assert_eq!(err.code(), "UnknownOperator");
}

#[test]
fn writes_deletes_and_conflicts() {
    let graph = populated();
    let renamed = graph
        .get_node("eleanor")
        .unwrap()
        .unwrap()
        .with_attribute("title", "Queen of France");
    graph.set_node(&renamed).unwrap();
    assert_eq!(
        graph.get_node("eleanor").unwrap().unwrap().attributes["title"],
        "Queen of France"
    );

    let err = graph.insert_node(&renamed).unwrap_err();
    assert!(matches!(err, MatchError::Conflict { kind: EntityKind::Node, .. }));

    assert_eq!(graph.delete_edges(["p2", "p3", "p3"]).unwrap(), 2);
    assert!(graph.has_edge("p1").unwrap());
    assert!(!graph.has_edge("p2").unwrap());
    assert_eq!(graph.delete_nodes(["eleanor"]).unwrap(), 1);
    assert!(graph.get_node("eleanor").unwrap().is_none());
}

#[test]
fn registry_validates_typed_views() {
    let mut registry = TypeRegistry::new();
    registry.register_node::<Scion>("scion").unwrap();
    let graph = Graph::with_store(SqliteStore::in_memory().unwrap(), Arc::new(registry));

    let (nodes, _) = habsburgs();
    graph.set_nodes(&nodes).unwrap();
    let typed: Scion = graph.get_node("maximilian-i").unwrap().unwrap().to_typed().unwrap();
    assert_eq!(typed.name, "Maximilian I");
    assert_eq!((typed.birth, typed.death), (1459, 1519));
    assert_eq!(typed.title.as_deref(), Some("Holy Roman Emperor"));

    let err = graph.set_node(&Node::new("anonymous", "scion")).unwrap_err();
    assert_eq!(err.code(), "Registry");
    graph.set_node(&Node::new("hofburg", "castle")).unwrap();
}

#[test]
fn file_backed_store_persists() {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        synchronous: SynchronousMode::Full,
        ..StoreConfig::at(dir.path().join("habsburg.db"))
    };
    {
        let graph = Graph::open(config.clone()).unwrap();
        let (nodes, edges) = habsburgs();
        graph.set_nodes(&nodes).unwrap();
        graph.set_edges(&edges).unwrap();
    }
    let store = SqliteStore::open(config).unwrap();
    let from_maximilian = where_("source", "equals", "maximilian-i")
        .unwrap()
        .compile_for(Some(EntityKind::Edge));
    assert_eq!(store.count(EntityKind::Edge, &from_maximilian).unwrap(), 1);
    assert!(store.exists_by_id(EntityKind::Node, "charles-v").unwrap());
}
