#![allow(missing_docs)]

//! In-memory evaluation must agree with the compiled SQL run against SQLite.

use std::sync::Once;

use proptest::prelude::*;
use proptest::sample::select;
use serde_json::{json, Value as Json};
use sombra_match::{
    Edge, Entity, EntityKind, MatchMaker, MatchSpecification, Mode, Node, Operator, Predicate,
    PredicateGroup, PredicateValue, RowStore, Scalar, SqliteStore,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sombra_match=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

const PATHS: [&str; 9] = [
    "id", "type", "labels", "n", "s", "tags", "nested", "nested.k", "absent",
];

const TWO_POW_53: i64 = 1 << 53;

/// Integers where `f64` loses precision.
fn wide_ints() -> Vec<i64> {
    vec![TWO_POW_53 - 1, TWO_POW_53, TWO_POW_53 + 1, -TWO_POW_53 - 1, i64::MAX]
}

/// Reals SQLite renders in exponent form, plus ones straddling 2^53.
fn wide_reals() -> Vec<f64> {
    vec![
        0.5,
        1.5,
        2.0,
        10.25,
        1e-5,
        -2.5e-7,
        1e14,
        1e15,
        1e20,
        9_007_199_254_740_992.0,
        9_007_199_254_740_994.0,
    ]
}

fn arb_int() -> impl Strategy<Value = i64> {
    prop_oneof![3 => -3i64..=12, 1 => select(wide_ints())]
}

fn arb_json_scalar() -> impl Strategy<Value = Json> {
    prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::from),
        arb_int().prop_map(Json::from),
        select(wide_reals()).prop_map(Json::from),
        select(vec![
            "", "a", "ab", "Ab", "abc", "10", "b%c", "x_y", "1.0e-05", "v1.0e+20",
            "9007199254740993", "a\u{0}b",
        ])
        .prop_map(Json::from),
    ]
}

fn arb_attribute() -> impl Strategy<Value = Json> {
    prop_oneof![
        4 => arb_json_scalar(),
        1 => prop::collection::vec(arb_json_scalar(), 0..4).prop_map(Json::Array),
        1 => arb_json_scalar().prop_map(|v| json!({ "k": v })),
    ]
}

fn arb_node() -> impl Strategy<Value = Node> {
    (
        select(vec!["a", "b", "10", "Ab", "1.0e-05", "1.0e+20", "9007199254740993"]),
        select(vec!["scion", "castle", "", "1.0e+15", "9.00719925474099e+15"]),
        prop::collection::vec(select(vec!["royal", "a", "10"]), 0..3),
        prop::collection::btree_map(select(vec!["n", "s", "tags", "nested"]), arb_attribute(), 0..4),
    )
        .prop_map(|(id, node_type, labels, attributes)| {
            let mut node = Node::new(id, node_type);
            node.labels = labels.into_iter().map(str::to_owned).collect();
            for (key, value) in attributes {
                node.attributes.insert(key.to_owned(), value);
            }
            node
        })
}

fn arb_scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::Bool),
        arb_int().prop_map(Scalar::Int),
        select(wide_reals()).prop_map(Scalar::Float),
        select(vec![
            "a", "ab", "AB", "b", "10", "1", "%", "_", "b%c", "royal", "0.0", "1000", "e+",
            "1.0e-05",
        ])
        .prop_map(Scalar::from),
    ]
}

fn arb_value() -> impl Strategy<Value = Option<PredicateValue>> {
    prop_oneof![
        1 => Just(None),
        4 => arb_scalar().prop_map(|s| Some(PredicateValue::Scalar(s))),
        3 => prop::collection::vec(arb_scalar(), 0..4).prop_map(|v| Some(PredicateValue::List(v))),
    ]
}

fn arb_predicate() -> impl Strategy<Value = Option<Predicate>> {
    (select(PATHS.to_vec()), select(Operator::ALL.to_vec()), arb_value())
        .prop_map(|(path, op, value)| Predicate::new(path, op, value).ok())
}

fn arb_group() -> impl Strategy<Value = PredicateGroup> {
    (
        select(vec![Mode::All, Mode::Any, Mode::None]),
        prop::collection::vec(arb_predicate(), 1..4),
    )
        .prop_map(|(mode, predicates)| PredicateGroup::new(mode, predicates.into_iter().flatten()))
}

fn arb_spec() -> impl Strategy<Value = MatchSpecification> {
    (
        prop::collection::vec(select(vec!["a", "b", "10"]), 0..3),
        prop::collection::vec(arb_group(), 1..3),
    )
        .prop_map(|(ids, groups)| {
            groups
                .into_iter()
                .fold(MatchMaker::new().with_ids(ids), MatchMaker::with_group)
                .build()
                .expect("generated inputs are valid")
        })
}

fn returned_by_sql(entity: &dyn Entity, spec: &MatchSpecification) -> bool {
    let store = SqliteStore::in_memory().unwrap();
    store.upsert(entity).unwrap();
    let fragment = spec.compile(entity.kind());
    !store
        .select_where(entity.kind(), &fragment)
        .unwrap_or_else(|err| panic!("{err}: {} {:?}", fragment.sql(), fragment.args()))
        .is_empty()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_evaluate_agrees_with_sql(node in arb_node(), spec in arb_spec()) {
        init_tracing();
        let fragment = spec.compile(EntityKind::Node);
        prop_assert_eq!(
            spec.evaluate(&node),
            returned_by_sql(&node, &spec),
            "document {} sql {:?} args {:?}",
            node.document(),
            fragment.sql(),
            fragment.args()
        );
    }

    #[test]
    fn prop_compile_is_idempotent(spec in arb_spec()) {
        prop_assert_eq!(spec.compile(EntityKind::Node), spec.compile(EntityKind::Node));
        prop_assert_eq!(spec.compile(EntityKind::Edge), spec.compile(EntityKind::Edge));
    }
}

#[test]
fn edges_agree_on_fixed_and_document_paths() {
    init_tracing();
    let edge = Edge::new("e1", "maximilian-i", "is_parent_of", "philip-i")
        .with_attribute("type", "lineal")
        .with_attribute("since", 1478);
    let cases: Vec<(&str, &str, PredicateValue)> = vec![
        ("source", "equals", "maximilian-i".into()),
        ("predicate", "startswith", "is_".into()),
        ("target", "contains", "lip".into()),
        ("type", "equals", "lineal".into()),
        ("since", "within", [1400, 1478].into()),
        ("since", "between", [1400, 1478].into()),
        ("labels", "empty", true.into()),
        ("source", "notin", vec!["a", "b"].into()),
    ];
    for (path, tag, value) in cases {
        let spec = MatchMaker::new().where_(path, tag, value).build().unwrap();
        assert_eq!(
            spec.evaluate(&edge),
            returned_by_sql(&edge, &spec),
            "{path} {tag}"
        );
    }
}

#[test]
fn reals_and_wide_integers_agree() {
    init_tracing();
    let node = Node::new("1.0e-05", "1.0e+20")
        .with_attribute("s", "v0.00001 v1.0e-05")
        .with_attribute("r", 0.00001)
        .with_attribute("big", 1e20)
        .with_attribute("n", TWO_POW_53 + 1)
        .with_attribute("z", "a\u{0}b");
    let cases: Vec<(&str, &str, PredicateValue)> = vec![
        ("id", "equals", 0.00001.into()),
        ("type", "equals", 1e20.into()),
        ("id", "in", vec![1e-5, 2.0].into()),
        ("s", "contains", 0.00001.into()),
        ("r", "startswith", "0.0".into()),
        ("r", "startswith", "1.0e-".into()),
        ("big", "startswith", "1000".into()),
        ("big", "endswith", "e+20".into()),
        ("n", "equals", 9_007_199_254_740_992.0.into()),
        ("n", "greaterthan", 9_007_199_254_740_992.0.into()),
        ("n", "lessthan", 9_007_199_254_740_994.0.into()),
        ("n", "within", [9_007_199_254_740_992.0, 9_007_199_254_740_994.0].into()),
        ("z", "endswith", "b".into()),
        ("z", "startswith", "a".into()),
        ("z", "contains", "b".into()),
    ];
    for (path, tag, value) in cases {
        let spec = MatchMaker::new().where_(path, tag, value.clone()).build().unwrap();
        assert_eq!(
            spec.evaluate(&node),
            returned_by_sql(&node, &spec),
            "{path} {tag} {value:?}"
        );
    }
}

#[test]
fn edge_column_names_on_nodes_read_the_document() {
    let plain = Node::new("n1", "scion");
    let sourced = Node::new("n2", "scion").with_attribute("source", "x");
    for path in ["source", "predicate", "target"] {
        let spec = MatchMaker::new().where_(path, "equals", "x").build().unwrap();
        assert_eq!(
            spec.compile(EntityKind::Node).sql(),
            format!("json_extract(data, '$.{path}') = ?")
        );
        assert!(!spec.evaluate(&plain));
        assert!(!returned_by_sql(&plain, &spec));
    }
    let spec = MatchMaker::new().where_("source", "equals", "x").build().unwrap();
    assert!(spec.evaluate(&sourced));
    assert!(returned_by_sql(&sourced, &spec));
}

#[test]
fn missing_attributes_never_match_negations() {
    let bare = Node::new("bare", "scion");
    for (tag, value) in [
        ("notequals", PredicateValue::from(1)),
        ("notin", vec![1, 2].into()),
        ("outside", [0, 10].into()),
        ("excludes", "x".into()),
    ] {
        let spec = MatchMaker::new().where_("age", tag, value).build().unwrap();
        assert!(!spec.evaluate(&bare), "{tag}");
        assert!(!returned_by_sql(&bare, &spec), "{tag}");
    }
    let spec = MatchMaker::new().where_flag("age", "missing").build().unwrap();
    assert!(spec.evaluate(&bare));
    assert!(returned_by_sql(&bare, &spec));
}
