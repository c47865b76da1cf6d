//! Predicates and predicate groups.

use serde_json::Value as Json;
use tracing::trace;

use crate::error::{MatchError, Result};
use crate::model::{Entity, EntityKind};
use crate::query::compile::{Fragment, Mode};
use crate::query::operator::{Check, Operator};
use crate::query::resolve::{resolve, PropertyPath};
use crate::query::value::PredicateValue;

/// One property/operator/value comparison.
///
/// Construction validates the path and the presence of a value; the value's
/// shape is checked once and cached. A value of the wrong shape does not
/// fail construction, it produces a predicate that never matches (see
/// [`Predicate::is_malformed`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    path: PropertyPath,
    operator: Operator,
    value: Option<PredicateValue>,
    check: Check,
}

impl Predicate {
    /// Builds a predicate from a typed operator.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidPropertyPath`] for a bad path and
    /// [`MatchError::MissingComparisonValue`] when a value-requiring operator
    /// is given `None`.
    pub fn new(
        path: impl Into<String>,
        operator: Operator,
        value: Option<PredicateValue>,
    ) -> Result<Self> {
        let path = PropertyPath::parse(path)?;
        if value.is_none() && operator.requires_value() {
            return Err(MatchError::MissingComparisonValue {
                property: path.to_string(),
                operator,
            });
        }
        let check = operator.check(value.as_ref());
        Ok(Self {
            path,
            operator,
            value,
            check,
        })
    }

    /// Builds a predicate from an operator tag.
    ///
    /// # Errors
    ///
    /// [`MatchError::UnknownOperator`] when the tag is not registered, plus
    /// everything [`Predicate::new`] reports.
    pub fn parse(path: impl Into<String>, tag: &str, value: Option<PredicateValue>) -> Result<Self> {
        Self::new(path, tag.parse()?, value)
    }

    /// Property path the predicate reads.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// Comparison operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Comparison value as supplied.
    pub fn value(&self) -> Option<&PredicateValue> {
        self.value.as_ref()
    }

    /// True when the value did not fit the operator and the predicate can
    /// never match.
    pub fn is_malformed(&self) -> bool {
        self.check == Check::Never
    }

    /// Renders the clause without a target table, treating every reserved
    /// name as a column. Use [`Predicate::compile_for`] for SQL that runs.
    pub fn compile(&self) -> Fragment {
        self.compile_for(None)
    }

    /// Compiles against the table of `kind`; `None` renders kind-agnostically.
    pub fn compile_for(&self, kind: Option<EntityKind>) -> Fragment {
        self.check.render(&resolve(&self.path, kind))
    }

    /// In-memory test against a single entity.
    pub fn matches(&self, entity: &dyn Entity) -> bool {
        self.test(&entity.document(), entity.kind()) == Some(true)
    }

    pub(crate) fn test(&self, document: &Json, kind: EntityKind) -> Option<bool> {
        let result = self.check.test(&resolve(&self.path, Some(kind)), document);
        trace!(path = %self.path, operator = %self.operator, ?result, "predicate evaluated");
        result
    }
}

/// Builds a predicate from a path, an operator tag and a value.
///
/// ```
/// use sombra_match::query::where_;
///
/// let p = where_("title", "equals", "Holy Roman Emperor").unwrap();
/// assert_eq!(p.compile().sql(), "json_extract(data, '$.title') = ?");
/// ```
pub fn where_<V: Into<PredicateValue>>(path: &str, tag: &str, value: V) -> Result<Predicate> {
    Predicate::parse(path, tag, Some(value.into()))
}

/// Builds an `all` group from several `{operator: value}` pairs on one path.
pub fn where_map<I, K, V>(path: &str, comparisons: I) -> Result<PredicateGroup>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<PredicateValue>,
{
    let predicates = comparisons
        .into_iter()
        .map(|(tag, value)| Predicate::parse(path, tag.as_ref(), Some(value.into())))
        .collect::<Result<Vec<_>>>()?;
    Ok(PredicateGroup::all(predicates))
}

/// Ordered predicates compiled together under one [`Mode`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredicateGroup {
    mode: Mode,
    predicates: Vec<Predicate>,
}

impl PredicateGroup {
    /// Group with an explicit mode.
    pub fn new(mode: Mode, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self {
            mode,
            predicates: predicates.into_iter().collect(),
        }
    }

    /// Conjunction of `predicates`.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::new(Mode::All, predicates)
    }

    /// Disjunction of `predicates`.
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::new(Mode::Any, predicates)
    }

    /// Negated disjunction of `predicates`.
    pub fn none(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::new(Mode::None, predicates)
    }

    /// Appends a predicate.
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Combinator mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Member predicates in order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True when the group has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Renders the group without a target table, treating every reserved
    /// name as a column. Use [`PredicateGroup::compile_for`] for SQL that runs.
    pub fn compile(&self) -> Fragment {
        self.compile_for(None)
    }

    /// Compiles against the table of `kind`; `None` renders kind-agnostically.
    pub fn compile_for(&self, kind: Option<EntityKind>) -> Fragment {
        self.mode
            .join(self.predicates.iter().map(|p| p.compile_for(kind)))
    }

    /// In-memory test against a single entity.
    pub fn matches(&self, entity: &dyn Entity) -> bool {
        self.test(&entity.document(), entity.kind()) == Some(true)
    }

    pub(crate) fn test(&self, document: &Json, kind: EntityKind) -> Option<bool> {
        self.mode
            .combine(self.predicates.iter().map(|p| p.test(document, kind)))
    }
}

impl From<Predicate> for PredicateGroup {
    fn from(predicate: Predicate) -> Self {
        PredicateGroup::all([predicate])
    }
}

/// Closure-driven builder for a [`PredicateGroup`].
///
/// The first error is recorded and later calls become no-ops, so a chain of
/// calls needs only one check at the end.
pub struct GroupBuilder {
    group: PredicateGroup,
    error: Option<MatchError>,
}

impl GroupBuilder {
    pub(crate) fn new(mode: Mode) -> Self {
        Self {
            group: PredicateGroup::new(mode, Vec::new()),
            error: None,
        }
    }

    pub(crate) fn finish(self) -> Result<PredicateGroup> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.group),
        }
    }

    fn push(&mut self, path: &str, operator: Operator, value: Option<PredicateValue>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match Predicate::new(path, operator, value) {
            Ok(predicate) => self.group.push(predicate),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Adds `path equals value`.
    pub fn equals(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Equals, Some(value.into()))
    }

    /// Adds `path notequals value`.
    pub fn not_equals(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::NotEquals, Some(value.into()))
    }

    /// Adds `path greaterthan value`.
    pub fn greater_than(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::GreaterThan, Some(value.into()))
    }

    /// Adds `path lessthan value`.
    pub fn less_than(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::LessThan, Some(value.into()))
    }

    /// Adds `path notgreaterthan value`.
    pub fn not_greater_than(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::NotGreaterThan, Some(value.into()))
    }

    /// Adds `path notlessthan value`.
    pub fn not_less_than(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::NotLessThan, Some(value.into()))
    }

    /// Adds an exclusive range.
    pub fn between(&mut self, path: &str, bounds: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Between, Some(bounds.into()))
    }

    /// Adds an inclusive range.
    pub fn within(&mut self, path: &str, bounds: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Within, Some(bounds.into()))
    }

    /// Adds a test for values outside an inclusive range.
    pub fn outside(&mut self, path: &str, bounds: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Outside, Some(bounds.into()))
    }

    /// Adds an array-membership or substring test.
    pub fn contains(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Contains, Some(value.into()))
    }

    /// Adds a negated [`GroupBuilder::contains`].
    pub fn excludes(&mut self, path: &str, value: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::Excludes, Some(value.into()))
    }

    /// Adds list membership.
    pub fn in_list(&mut self, path: &str, values: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::In, Some(values.into()))
    }

    /// Adds list non-membership.
    pub fn not_in(&mut self, path: &str, values: impl Into<PredicateValue>) -> &mut Self {
        self.push(path, Operator::NotIn, Some(values.into()))
    }

    /// Adds a prefix match.
    pub fn starts_with(&mut self, path: &str, text: &str) -> &mut Self {
        self.push(path, Operator::StartsWith, Some(text.into()))
    }

    /// Adds a suffix match.
    pub fn ends_with(&mut self, path: &str, text: &str) -> &mut Self {
        self.push(path, Operator::EndsWith, Some(text.into()))
    }

    /// Requires the property to be present and not null.
    pub fn exists(&mut self, path: &str) -> &mut Self {
        self.push(path, Operator::Exists, None)
    }

    /// Requires the property to be absent or null.
    pub fn missing(&mut self, path: &str) -> &mut Self {
        self.push(path, Operator::Missing, None)
    }

    /// Requires the property to be empty.
    pub fn empty(&mut self, path: &str) -> &mut Self {
        self.push(path, Operator::Empty, None)
    }
}
