//! The operator table.
//!
//! Every operator is normalized once, at predicate construction, into a
//! [`Check`]. A check knows how to render itself as a SQL clause against a
//! [`Resolution`] and how to test itself against an entity document; those
//! two methods are the only place operator semantics live.
//!
//! In-memory tests return SQL three-valued logic (`None` is SQL `NULL`), so
//! a missing attribute behaves the same way in both evaluators.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value as Json;
use tracing::warn;

use crate::error::MatchError;
use crate::query::compile::Fragment;
use crate::query::resolve::{Column, Resolution, DOCUMENT_COLUMN};
use crate::query::value::{Affinity, PredicateValue, Scalar, SqlValue};

/// Comparison operators understood by predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    /// `col = ?`
    Equals,
    /// `col != ?`
    NotEquals,
    /// `col > ?` against a number.
    GreaterThan,
    /// `col < ?` against a number.
    LessThan,
    /// `col <= ?` against a number.
    NotGreaterThan,
    /// `col >= ?` against a number.
    NotLessThan,
    /// Exclusive range over a numeric pair.
    Between,
    /// Inclusive range over a numeric pair.
    Within,
    /// Outside an inclusive range over a numeric pair.
    Outside,
    /// Array membership or substring test.
    Contains,
    /// Negation of [`Operator::Contains`].
    Excludes,
    /// Membership in a non-empty literal list.
    In,
    /// Negation of [`Operator::In`].
    NotIn,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Property is present and not null.
    Exists,
    /// Property is absent or null.
    Missing,
    /// Property is the empty string (`[]` for labels).
    Empty,
}

/// Shape an operator expects its comparison value to have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    /// Optional boolean flag.
    Flag,
    /// One literal.
    Scalar,
    /// Two literals, in either order.
    Pair,
    /// One or more literals.
    List,
}

/// Literal types an operator accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueClass {
    /// Any boolean, number or string.
    Any,
    /// Numbers or strings.
    NumberOrText,
    /// Finite numbers.
    Numeric,
    /// Strings.
    Text,
    /// Booleans.
    Flag,
}

impl Operator {
    /// Every operator, in table order.
    pub const ALL: [Operator; 18] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::NotGreaterThan,
        Operator::NotLessThan,
        Operator::Between,
        Operator::Within,
        Operator::Outside,
        Operator::Contains,
        Operator::Excludes,
        Operator::In,
        Operator::NotIn,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Exists,
        Operator::Missing,
        Operator::Empty,
    ];

    /// Canonical tag.
    pub fn tag(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notequals",
            Operator::GreaterThan => "greaterthan",
            Operator::LessThan => "lessthan",
            Operator::NotGreaterThan => "notgreaterthan",
            Operator::NotLessThan => "notlessthan",
            Operator::Between => "between",
            Operator::Within => "within",
            Operator::Outside => "outside",
            Operator::Contains => "contains",
            Operator::Excludes => "excludes",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::Exists => "exists",
            Operator::Missing => "missing",
            Operator::Empty => "empty",
        }
    }

    /// Looks up a tag, ignoring case and `_`/`-` separators.
    pub fn from_tag(tag: &str) -> Option<Operator> {
        let normalized: String = tag
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Operator::ALL.into_iter().find(|op| op.tag() == normalized)
    }

    /// Shape of the comparison value.
    pub fn arity(self) -> Arity {
        match self {
            Operator::Between | Operator::Within | Operator::Outside => Arity::Pair,
            Operator::In | Operator::NotIn => Arity::List,
            Operator::Exists | Operator::Missing | Operator::Empty => Arity::Flag,
            _ => Arity::Scalar,
        }
    }

    /// Literal types accepted in the comparison value.
    pub fn value_class(self) -> ValueClass {
        match self {
            Operator::Equals | Operator::NotEquals => ValueClass::Any,
            Operator::Contains | Operator::Excludes | Operator::In | Operator::NotIn => {
                ValueClass::NumberOrText
            }
            Operator::GreaterThan
            | Operator::LessThan
            | Operator::NotGreaterThan
            | Operator::NotLessThan
            | Operator::Between
            | Operator::Within
            | Operator::Outside => ValueClass::Numeric,
            Operator::StartsWith | Operator::EndsWith => ValueClass::Text,
            Operator::Exists | Operator::Missing | Operator::Empty => ValueClass::Flag,
        }
    }

    /// False only for the flag operators, whose value defaults to `true`.
    pub fn requires_value(self) -> bool {
        self.arity() != Arity::Flag
    }

    /// Normalizes a comparison value for this operator.
    ///
    /// A value of the wrong shape or type yields [`Check::Never`]: the
    /// predicate stays constructible but can never match.
    pub(crate) fn check(self, value: Option<&PredicateValue>) -> Check {
        let check = match self {
            Operator::Equals => scalar(value, ValueClass::Any).map(|operand| Check::Compare {
                op: CmpOp::Eq,
                operand,
            }),
            Operator::NotEquals => scalar(value, ValueClass::Any).map(|operand| Check::Compare {
                op: CmpOp::Ne,
                operand,
            }),
            Operator::GreaterThan => numeric_compare(value, CmpOp::Gt),
            Operator::LessThan => numeric_compare(value, CmpOp::Lt),
            Operator::NotGreaterThan => numeric_compare(value, CmpOp::Le),
            Operator::NotLessThan => numeric_compare(value, CmpOp::Ge),
            Operator::Between => range(value, RangeKind::Exclusive),
            Operator::Within => range(value, RangeKind::Inclusive),
            Operator::Outside => range(value, RangeKind::Outside),
            Operator::Contains => contains(value, false),
            Operator::Excludes => contains(value, true),
            Operator::In => membership(value, false),
            Operator::NotIn => membership(value, true),
            Operator::StartsWith => like(value, Anchor::Prefix),
            Operator::EndsWith => like(value, Anchor::Suffix),
            Operator::Exists => flag(value).map(|_| Check::Presence { present: true }),
            Operator::Missing => flag(value).map(|_| Check::Presence { present: false }),
            Operator::Empty => flag(value).map(|_| Check::Empty),
        };
        check.unwrap_or_else(|| {
            warn!(operator = %self, ?value, "malformed comparison value; predicate will never match");
            Check::Never
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Operator {
    type Err = MatchError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Operator::from_tag(tag).ok_or_else(|| MatchError::UnknownOperator(tag.to_owned()))
    }
}

fn accepts(class: ValueClass, value: &Scalar) -> bool {
    match class {
        ValueClass::Any => value.is_finite(),
        ValueClass::NumberOrText => value.is_numeric() || matches!(value, Scalar::Text(_)),
        ValueClass::Numeric => value.is_numeric(),
        ValueClass::Text => matches!(value, Scalar::Text(_)),
        ValueClass::Flag => matches!(value, Scalar::Bool(_)),
    }
}

fn scalar(value: Option<&PredicateValue>, class: ValueClass) -> Option<Scalar> {
    let value = value?.as_scalar()?;
    accepts(class, value).then(|| value.clone())
}

fn numeric_compare(value: Option<&PredicateValue>, op: CmpOp) -> Option<Check> {
    scalar(value, ValueClass::Numeric).map(|operand| Check::Compare { op, operand })
}

fn range(value: Option<&PredicateValue>, kind: RangeKind) -> Option<Check> {
    let [a, b] = value?.as_list()? else {
        return None;
    };
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    let (low, high) = match a.as_f64()?.partial_cmp(&b.as_f64()?)? {
        Ordering::Greater => (b.clone(), a.clone()),
        _ => (a.clone(), b.clone()),
    };
    Some(Check::Range { low, high, kind })
}

fn contains(value: Option<&PredicateValue>, negated: bool) -> Option<Check> {
    scalar(value, ValueClass::NumberOrText).map(|needle| Check::Contains { needle, negated })
}

fn membership(value: Option<&PredicateValue>, negated: bool) -> Option<Check> {
    let values = value?.as_list()?;
    let first = values.first()?;
    let numeric = first.is_numeric();
    let homogeneous = values.iter().all(|v| {
        accepts(ValueClass::NumberOrText, v) && v.is_numeric() == numeric
    });
    homogeneous.then(|| Check::Membership {
        values: values.to_vec(),
        negated,
    })
}

fn like(value: Option<&PredicateValue>, anchor: Anchor) -> Option<Check> {
    match value?.as_scalar()? {
        Scalar::Text(text) => Some(Check::Like {
            text: text.clone(),
            anchor,
        }),
        _ => None,
    }
}

fn flag(value: Option<&PredicateValue>) -> Option<bool> {
    match value {
        None => Some(true),
        Some(v) => match v.as_scalar()? {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        },
    }
}

/// Binary comparison used by scalar operators and range bounds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Le,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord.is_eq(),
            CmpOp::Ne => ord.is_ne(),
            CmpOp::Gt => ord.is_gt(),
            CmpOp::Lt => ord.is_lt(),
            CmpOp::Le => ord.is_le(),
            CmpOp::Ge => ord.is_ge(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RangeKind {
    Exclusive,
    Inclusive,
    Outside,
}

impl RangeKind {
    /// Lower-bound comparison, upper-bound comparison and their connective.
    fn parts(self) -> (CmpOp, CmpOp, &'static str) {
        match self {
            RangeKind::Exclusive => (CmpOp::Gt, CmpOp::Lt, "AND"),
            RangeKind::Inclusive => (CmpOp::Ge, CmpOp::Le, "AND"),
            RangeKind::Outside => (CmpOp::Lt, CmpOp::Gt, "OR"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Anchor {
    Prefix,
    Suffix,
}

/// Normalized, validated comparison shared by both evaluators.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Check {
    Compare {
        op: CmpOp,
        operand: Scalar,
    },
    /// `low <= high` always holds.
    Range {
        low: Scalar,
        high: Scalar,
        kind: RangeKind,
    },
    Membership {
        values: Vec<Scalar>,
        negated: bool,
    },
    Contains {
        needle: Scalar,
        negated: bool,
    },
    Like {
        text: String,
        anchor: Anchor,
    },
    Presence {
        present: bool,
    },
    Empty,
    Never,
}

impl Check {
    /// Renders the SQL clause for this check against `target`.
    pub(crate) fn render(&self, target: &Resolution) -> Fragment {
        let expr = target.expr();
        match self {
            Check::Compare { op, operand } => {
                Fragment::new(format!("{expr} {} ?", op.symbol()), vec![operand.clone()])
            }
            Check::Range { low, high, kind } => {
                let (lower, upper, joiner) = kind.parts();
                Fragment::new(
                    format!(
                        "({expr} {} ? {joiner} {expr} {} ?)",
                        lower.symbol(),
                        upper.symbol()
                    ),
                    vec![low.clone(), high.clone()],
                )
            }
            Check::Membership { values, negated } => {
                let placeholders = vec!["?"; values.len()].join(",");
                let not = if *negated { "NOT " } else { "" };
                Fragment::new(format!("{expr} {not}IN ({placeholders})"), values.clone())
            }
            Check::Contains { needle, negated } => {
                let (sql, args) = match target {
                    Resolution::Column(column) if column.is_json_array() => (
                        format!("EXISTS (SELECT 1 FROM json_each({expr}) WHERE value = ?)"),
                        vec![needle.clone()],
                    ),
                    Resolution::Column(_) => {
                        (format!("instr({expr}, ?) > 0"), vec![needle.clone()])
                    }
                    Resolution::Document(path) => {
                        let json_path = path.json_path();
                        (
                            format!(
                                "CASE json_type({DOCUMENT_COLUMN}, '{json_path}') \
                                 WHEN 'array' THEN EXISTS (SELECT 1 FROM json_each({DOCUMENT_COLUMN}, '{json_path}') WHERE value = ?) \
                                 WHEN 'text' THEN instr({expr}, ?) > 0 END"
                            ),
                            vec![needle.clone(), needle.clone()],
                        )
                    }
                };
                if *negated {
                    Fragment::new(format!("NOT ({sql})"), args)
                } else {
                    Fragment::new(sql, args)
                }
            }
            Check::Like { text, anchor } => {
                let escaped = escape_like(text);
                let suffix = if escaped == *text { "" } else { " ESCAPE '\\'" };
                let pattern = match anchor {
                    Anchor::Prefix => format!("{escaped}%"),
                    Anchor::Suffix => format!("%{escaped}"),
                };
                Fragment::new(format!("{expr} LIKE ?{suffix}"), vec![Scalar::Text(pattern)])
            }
            Check::Presence { present: true } => Fragment::new(format!("{expr} NOT NULL"), vec![]),
            Check::Presence { present: false } => Fragment::new(format!("{expr} IS NULL"), vec![]),
            Check::Empty => Fragment::new(format!("{expr} = '{}'", empty_literal(target)), vec![]),
            Check::Never => Fragment::never(),
        }
    }

    /// Tests an entity document, returning SQL three-valued logic.
    pub(crate) fn test(&self, target: &Resolution, document: &Json) -> Option<bool> {
        let located = target.locate(document);
        let actual = SqlValue::from_json(located);
        let affinity = target.affinity();
        match self {
            Check::Compare { op, operand } => compare(&actual, *op, operand, affinity),
            Check::Range { low, high, kind } => {
                let (lower, upper, _) = kind.parts();
                let lo = compare(&actual, lower, low, affinity);
                let hi = compare(&actual, upper, high, affinity);
                match kind {
                    RangeKind::Outside => or(lo, hi),
                    _ => and(lo, hi),
                }
            }
            Check::Membership { values, negated } => {
                if actual.is_null() {
                    return None;
                }
                let found = values
                    .iter()
                    .any(|v| compare(&actual, CmpOp::Eq, v, affinity) == Some(true));
                Some(found != *negated)
            }
            Check::Contains { needle, negated } => {
                let hit = match target {
                    Resolution::Column(column) if column.is_json_array() => {
                        Some(located.is_some_and(|v| json_each_contains(v, needle)))
                    }
                    Resolution::Column(_) => actual.to_text().map(|s| s.contains(&needle_text(needle))),
                    Resolution::Document(_) => match located {
                        Some(Json::Array(items)) => {
                            Some(items.iter().any(|item| element_matches(item, needle)))
                        }
                        Some(Json::String(s)) => Some(s.contains(&needle_text(needle))),
                        _ => None,
                    },
                };
                hit.map(|h| h != *negated)
            }
            Check::Like { text, anchor } => {
                let actual = actual.to_text()?;
                let actual = until_nul(&actual).to_ascii_lowercase();
                // LIKE reads both operands as C strings.
                let cut = text.contains('\0');
                let text = until_nul(text).to_ascii_lowercase();
                Some(match anchor {
                    Anchor::Prefix if cut => actual == text,
                    Anchor::Prefix => actual.starts_with(&text),
                    Anchor::Suffix => actual.ends_with(&text),
                })
            }
            Check::Presence { present } => Some(actual.is_null() != *present),
            Check::Empty => {
                let literal = Scalar::Text(empty_literal(target).to_owned());
                compare(&actual, CmpOp::Eq, &literal, affinity)
            }
            Check::Never => Some(false),
        }
    }
}

fn compare(actual: &SqlValue, op: CmpOp, operand: &Scalar, affinity: Affinity) -> Option<bool> {
    let operand = SqlValue::from_scalar(operand).with_affinity(affinity);
    actual.sql_cmp(&operand).map(|ord| op.holds(ord))
}

/// `json_each` over a JSON value: arrays yield elements, objects yield their
/// values, scalars yield themselves.
fn json_each_contains(value: &Json, needle: &Scalar) -> bool {
    match value {
        Json::Array(items) => items.iter().any(|item| element_matches(item, needle)),
        Json::Object(map) => map.values().any(|item| element_matches(item, needle)),
        scalar => element_matches(scalar, needle),
    }
}

fn element_matches(element: &Json, needle: &Scalar) -> bool {
    compare(&SqlValue::from_json(Some(element)), CmpOp::Eq, needle, Affinity::None) == Some(true)
}

fn needle_text(needle: &Scalar) -> String {
    SqlValue::from_scalar(needle).to_text().unwrap_or_default()
}

fn until_nul(text: &str) -> &str {
    text.split('\0').next().unwrap_or_default()
}

fn empty_literal(target: &Resolution) -> &'static str {
    match target {
        Resolution::Column(Column::Labels) => "[]",
        _ => "",
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(crate) fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub(crate) fn or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}
