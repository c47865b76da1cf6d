#![allow(missing_docs)]

use sombra_match::query::{resolve, PropertyPath};
use sombra_match::{
    where_, where_map, EntityKind, MatchError, MatchMaker, MatchSpecification, Mode, Operator, Predicate,
    PredicateGroup, PredicateValue, Scalar,
};

fn sql(path: &str, tag: &str, value: impl Into<PredicateValue>) -> String {
    where_(path, tag, value).unwrap().compile().sql().to_owned()
}

#[test]
fn reserved_names_address_columns_directly() {
    for column in ["id", "type", "predicate", "target", "source"] {
        assert_eq!(sql(column, "equals", 1), format!("{column} = ?"));
    }
    assert_eq!(sql("random", "equals", 1), "json_extract(data, '$.random') = ?");
    assert_eq!(
        sql("some.deep.property", "equals", 1),
        "json_extract(data, '$.some.deep.property') = ?"
    );
    let path = PropertyPath::parse("some.deep.property").unwrap();
    assert_eq!(
        resolve(&path, None).expr(),
        "json_extract(data, '$.some.deep.property')"
    );
}

#[test]
fn every_operator_renders() {
    let cases: Vec<(&str, PredicateValue, &str)> = vec![
        ("equals", 1.into(), "x = ?"),
        ("notequals", 1.into(), "x != ?"),
        ("greaterthan", 1.into(), "x > ?"),
        ("lessthan", 1.into(), "x < ?"),
        ("notgreaterthan", 1.into(), "x <= ?"),
        ("notlessthan", 1.into(), "x >= ?"),
        ("between", [0, 10].into(), "(x > ? AND x < ?)"),
        ("within", [0, 10].into(), "(x >= ? AND x <= ?)"),
        ("outside", [0, 10].into(), "(x < ? OR x > ?)"),
        ("in", vec![1, 2, 3, 4].into(), "x IN (?,?,?,?)"),
        ("notin", vec![1, 2, 3, 4].into(), "x NOT IN (?,?,?,?)"),
        ("startswith", "hello".into(), "x LIKE ?"),
        ("endswith", "hello".into(), "x LIKE ?"),
        ("exists", true.into(), "x NOT NULL"),
        ("missing", true.into(), "x IS NULL"),
        ("empty", true.into(), "x = ''"),
    ];
    let x = "json_extract(data, '$.x')";
    for (tag, value, expected) in cases {
        assert_eq!(sql("x", tag, value), expected.replace('x', x), "{tag}");
    }
    assert_eq!(
        sql("x", "contains", 1),
        format!(
            "CASE json_type(data, '$.x') WHEN 'array' THEN EXISTS (SELECT 1 FROM json_each(data, '$.x') WHERE value = ?) \
             WHEN 'text' THEN instr({x}, ?) > 0 END"
        )
    );
    assert!(sql("x", "excludes", 1).starts_with("NOT (CASE json_type"));
}

#[test]
fn comparison_arguments_follow_input_order() {
    let p = where_("id", "greaterthan", 0).unwrap().compile();
    assert_eq!(p.args(), &[Scalar::Int(0)]);
    let p = where_("id", "between", [0, 10]).unwrap().compile();
    assert_eq!(p.sql(), "(id > ? AND id < ?)");
    assert_eq!(p.args(), &[Scalar::Int(0), Scalar::Int(10)]);
    assert_eq!(p, where_("id", "between", [10, 0]).unwrap().compile());

    let p = where_("id", "in", vec!["some", "values"]).unwrap().compile();
    assert_eq!(p.sql(), "id IN (?,?)");
    assert_eq!(p.args(), &[Scalar::from("some"), Scalar::from("values")]);

    let sw = where_("id", "startswith", "text").unwrap().compile();
    let ew = where_("id", "endswith", "text").unwrap().compile();
    assert_eq!((sw.sql(), ew.sql()), ("id LIKE ?", "id LIKE ?"));
    assert_eq!(sw.args(), &[Scalar::from("text%")]);
    assert_eq!(ew.args(), &[Scalar::from("%text")]);
}

#[test]
fn labels_membership_reads_the_labels_column() {
    let p = where_("labels", "contains", "text").unwrap().compile();
    assert_eq!(p.sql(), "EXISTS (SELECT 1 FROM json_each(labels) WHERE value = ?)");
    assert_eq!(p.args(), &[Scalar::from("text")]);
}

#[test]
fn groups_join_under_each_mode() {
    let members = || {
        vec![
            where_("a", "equals", 1).unwrap(),
            where_("b", "equals", 2).unwrap(),
            where_("c", "equals", 3).unwrap(),
        ]
    };
    let a = "json_extract(data, '$.a') = ?";
    let b = "json_extract(data, '$.b') = ?";
    let c = "json_extract(data, '$.c') = ?";
    assert_eq!(
        PredicateGroup::all(members()).compile().sql(),
        format!("({a} AND {b} AND {c})")
    );
    assert_eq!(
        PredicateGroup::any(members()).compile().sql(),
        format!("({a} OR {b} OR {c})")
    );
    assert_eq!(
        PredicateGroup::none(members()).compile().sql(),
        format!("NOT ({a} OR {b} OR {c})")
    );
    assert_eq!("none".parse::<Mode>().unwrap(), Mode::None);
}

#[test]
fn fatal_and_degraded_errors() {
    assert!(matches!(
        where_("id", "eq", 1),
        Err(MatchError::UnknownOperator(_))
    ));
    assert!(matches!(
        Predicate::new("id", Operator::Between, None),
        Err(MatchError::MissingComparisonValue { .. })
    ));
    assert!(Predicate::new("id", Operator::Exists, None).is_ok());

    let broken = where_("id", "notequals", vec![0, 1, 2, 3]).unwrap();
    assert!(broken.is_malformed());
    assert!(broken.compile().is_never());

    // One malformed member empties an `all` query but not an `any` group.
    let spec = MatchMaker::new()
        .where_("id", "equals", "a")
        .where_("birth", "between", vec!["x", "y"])
        .build()
        .unwrap();
    assert!(spec.compile(EntityKind::Node).is_never());
    let any = PredicateGroup::any([
        where_("id", "equals", "a").unwrap(),
        where_("birth", "between", vec!["x", "y"]).unwrap(),
    ]);
    assert_eq!(any.compile().sql(), "id = ?");
}

#[test]
fn specifications_compile_deterministically() {
    let build = || {
        MatchMaker::new()
            .with_ids(["a", "b"])
            .where_map("birth", [("notlessthan", 1500), ("lessthan", 1600)])
            .build()
            .unwrap()
    };
    let first = build().compile(EntityKind::Node);
    assert_eq!(first, build().compile(EntityKind::Node));
    assert_eq!(
        first.sql(),
        "(id IN (?,?) AND (json_extract(data, '$.birth') >= ? AND json_extract(data, '$.birth') < ?))"
    );

    let grouped = where_map("birth", [("notlessthan", 1500), ("lessthan", 1600)]).unwrap();
    assert_eq!(grouped.mode(), Mode::All);
    assert_eq!(grouped.predicates().len(), 2);

    let from_ids = MatchSpecification::ids(["a", "b"]).unwrap();
    let explicit = MatchMaker::new()
        .with_predicate(where_("id", "in", vec!["a", "b"]).unwrap())
        .build()
        .unwrap();
    for kind in [EntityKind::Node, EntityKind::Edge] {
        assert_eq!(from_ids.compile(kind), explicit.compile(kind));
    }
}
