//! Match specifications: the normalized form of one query's filters.
//!
//! A [`MatchMaker`] accepts the loose input forms callers use (ids, predicates,
//! groups, closures) and produces a [`MatchSpecification`] that can be
//! compiled to SQL for the row store and evaluated against materialized
//! entities. For every entity, the compiled fragment selects the entity's row
//! exactly when [`MatchSpecification::evaluate_predicates`] returns true.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::{MatchError, Result};
use crate::model::{Entity, EntityKind};
use crate::query::compile::{Fragment, Mode};
use crate::query::operator::Operator;
use crate::query::predicate::{GroupBuilder, Predicate, PredicateGroup};
use crate::query::value::PredicateValue;

/// Opaque post-filter applied to materialized entities.
pub type EntityFn = Arc<dyn Fn(&dyn Entity) -> bool + Send + Sync>;

/// One filter in any of the accepted input forms.
pub enum MatchInput {
    /// A single entity id.
    Id(String),
    /// Several entity ids.
    Ids(Vec<String>),
    /// A single predicate.
    Predicate(Predicate),
    /// A predicate group with its own mode.
    Group(PredicateGroup),
    /// A closure evaluated only in memory.
    Function(EntityFn),
}

impl From<&str> for MatchInput {
    fn from(id: &str) -> Self {
        MatchInput::Id(id.to_owned())
    }
}

impl From<String> for MatchInput {
    fn from(id: String) -> Self {
        MatchInput::Id(id)
    }
}

impl From<Vec<String>> for MatchInput {
    fn from(ids: Vec<String>) -> Self {
        MatchInput::Ids(ids)
    }
}

impl From<Vec<&str>> for MatchInput {
    fn from(ids: Vec<&str>) -> Self {
        MatchInput::Ids(ids.into_iter().map(str::to_owned).collect())
    }
}

impl From<Predicate> for MatchInput {
    fn from(predicate: Predicate) -> Self {
        MatchInput::Predicate(predicate)
    }
}

impl From<PredicateGroup> for MatchInput {
    fn from(group: PredicateGroup) -> Self {
        MatchInput::Group(group)
    }
}

/// Builder normalizing [`MatchInput`]s into a [`MatchSpecification`].
#[derive(Default)]
pub struct MatchMaker {
    ids: Vec<String>,
    seen: FxHashSet<String>,
    groups: Vec<PredicateGroup>,
    functions: Vec<EntityFn>,
    error: Option<MatchError>,
}

impl MatchMaker {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input of any accepted form.
    pub fn push(self, input: impl Into<MatchInput>) -> Self {
        match input.into() {
            MatchInput::Id(id) => self.with_id(id),
            MatchInput::Ids(ids) => self.with_ids(ids),
            MatchInput::Predicate(p) => self.with_predicate(p),
            MatchInput::Group(g) => self.with_group(g),
            MatchInput::Function(f) => {
                let mut this = self;
                this.functions.push(f);
                this
            }
        }
    }

    /// Restricts matches to an id; repeated ids are kept once.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if self.seen.insert(id.clone()) {
            self.ids.push(id);
        }
        self
    }

    /// Restricts matches to a set of ids, preserving first-seen order.
    pub fn with_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().fold(self, |this, id| this.with_id(id))
    }

    /// Adds a predicate as its own `all` group.
    pub fn with_predicate(self, predicate: Predicate) -> Self {
        self.with_group(PredicateGroup::from(predicate))
    }

    /// Adds a predicate group.
    pub fn with_group(mut self, group: PredicateGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Adds a predicate from a path, operator tag and value.
    pub fn where_(mut self, path: &str, tag: &str, value: impl Into<PredicateValue>) -> Self {
        if self.error.is_some() {
            return self;
        }
        match Predicate::parse(path, tag, Some(value.into())) {
            Ok(p) => self.with_predicate(p),
            Err(err) => {
                self.error = Some(err);
                self
            }
        }
    }

    /// Adds a flag predicate (`exists`, `missing`, `empty`) by tag.
    pub fn where_flag(mut self, path: &str, tag: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match Predicate::parse(path, tag, None) {
            Ok(p) => self.with_predicate(p),
            Err(err) => {
                self.error = Some(err);
                self
            }
        }
    }

    /// Adds an `all` group from `{operator: value}` pairs on one path.
    pub fn where_map<I, K, V>(mut self, path: &str, comparisons: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<PredicateValue>,
    {
        if self.error.is_some() {
            return self;
        }
        match crate::query::predicate::where_map(path, comparisons) {
            Ok(group) => self.with_group(group),
            Err(err) => {
                self.error = Some(err);
                self
            }
        }
    }

    /// Adds a group assembled by `build` under `mode`.
    pub fn group<F>(mut self, mode: Mode, build: F) -> Self
    where
        F: FnOnce(&mut GroupBuilder),
    {
        if self.error.is_some() {
            return self;
        }
        let mut builder = GroupBuilder::new(mode);
        build(&mut builder);
        match builder.finish() {
            Ok(group) => self.with_group(group),
            Err(err) => {
                self.error = Some(err);
                self
            }
        }
    }

    /// Adds an in-memory post-filter.
    pub fn with_fn<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dyn Entity) -> bool + Send + Sync + 'static,
    {
        self.functions.push(Arc::new(filter));
        self
    }

    /// Finishes the specification.
    ///
    /// # Errors
    ///
    /// Returns the first error recorded while adding inputs.
    pub fn build(self) -> Result<MatchSpecification> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut groups = Vec::with_capacity(self.groups.len() + 1);
        if !self.ids.is_empty() {
            let ids = PredicateValue::from(self.ids.clone());
            groups.push(PredicateGroup::from(Predicate::new(
                "id",
                Operator::In,
                Some(ids),
            )?));
        }
        groups.extend(self.groups);
        Ok(MatchSpecification {
            ids: self.ids,
            groups,
            functions: self.functions,
        })
    }
}

/// Normalized filters for one query.
///
/// Ids are folded into a leading `id in (...)` group, so they are compiled
/// and evaluated exactly like any other predicate. Top-level groups are
/// conjoined regardless of their own modes.
#[derive(Clone, Default)]
pub struct MatchSpecification {
    ids: Vec<String>,
    groups: Vec<PredicateGroup>,
    functions: Vec<EntityFn>,
}

impl MatchSpecification {
    /// Starts a [`MatchMaker`].
    pub fn builder() -> MatchMaker {
        MatchMaker::new()
    }

    /// Specification matching the given ids.
    pub fn ids<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MatchMaker::new().with_ids(ids).build()
    }

    /// Requested ids, deduplicated, in first-seen order.
    pub fn id_list(&self) -> &[String] {
        &self.ids
    }

    /// Predicate groups, including the normalized id group.
    pub fn groups(&self) -> &[PredicateGroup] {
        &self.groups
    }

    /// Number of in-memory post-filters.
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// True when the specification matches everything.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.functions.is_empty()
    }

    /// The id when the specification is a lookup of exactly one id.
    pub fn single_id(&self) -> Option<&str> {
        match (self.ids.as_slice(), self.groups.len(), self.functions.len()) {
            ([id], 1, 0) => Some(id),
            _ => None,
        }
    }

    /// Compiles every group against the table of `kind` and conjoins them.
    ///
    /// Reserved names the table lacks resolve into the document, exactly as
    /// [`MatchSpecification::evaluate`] resolves them for an entity of `kind`.
    pub fn compile(&self, kind: EntityKind) -> Fragment {
        let fragment = Mode::All.join(self.groups.iter().map(|g| g.compile_for(Some(kind))));
        debug!(
            %kind,
            sql = fragment.sql(),
            args = fragment.args().len(),
            never = fragment.is_never(),
            "compiled match specification"
        );
        fragment
    }

    /// Full in-memory evaluation: predicates and post-filters.
    pub fn evaluate(&self, entity: &dyn Entity) -> bool {
        self.evaluate_predicates(entity) && self.filter(entity)
    }

    /// In-memory evaluation of the SQL-representable part only.
    pub fn evaluate_predicates(&self, entity: &dyn Entity) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let document = entity.document();
        let kind = entity.kind();
        Mode::All.combine(self.groups.iter().map(|g| g.test(&document, kind))) == Some(true)
    }

    /// Applies the post-filters only.
    pub fn filter(&self, entity: &dyn Entity) -> bool {
        self.functions.iter().all(|f| f(entity))
    }
}

impl fmt::Debug for MatchSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchSpecification")
            .field("ids", &self.ids)
            .field("groups", &self.groups)
            .field("functions", &self.functions.len())
            .finish()
    }
}
