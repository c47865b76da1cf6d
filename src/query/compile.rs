//! Compiled SQL fragments and combinator joins.

use std::fmt;
use std::str::FromStr;

use crate::error::MatchError;
use crate::query::operator::{and, or};
use crate::query::value::Scalar;

/// Parameterized boolean SQL expression plus its positional arguments.
///
/// Three states exist: a real clause, an *empty* fragment (no constraint at
/// all) and a *never* fragment. A never fragment also has empty SQL text, but
/// callers must treat it as matching nothing; see [`Fragment::is_never`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    sql: String,
    args: Vec<Scalar>,
    never: bool,
}

impl Fragment {
    pub(crate) fn new(sql: String, args: Vec<Scalar>) -> Self {
        Self {
            sql,
            args,
            never: false,
        }
    }

    /// Fragment that places no constraint on rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fragment that can never match, produced by malformed comparisons.
    pub fn never() -> Self {
        Self {
            never: true,
            ..Self::default()
        }
    }

    /// SQL text, without the `WHERE` keyword.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Arguments in placeholder order.
    pub fn args(&self) -> &[Scalar] {
        &self.args
    }

    /// True when the fragment constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty() && !self.never
    }

    /// True when no row can satisfy the fragment.
    pub fn is_never(&self) -> bool {
        self.never
    }

    /// Splits the fragment into SQL text and arguments.
    pub fn into_parts(self) -> (String, Vec<Scalar>) {
        (self.sql, self.args)
    }

    /// Appends ` WHERE <sql>` to `select` when the fragment constrains rows.
    ///
    /// Returns `None` for a never fragment: no statement needs to run.
    pub fn apply_to(&self, select: &str) -> Option<String> {
        if self.never {
            None
        } else if self.sql.is_empty() {
            Some(select.to_owned())
        } else {
            Some(format!("{select} WHERE {}", self.sql))
        }
    }
}

/// How a group of predicates combines.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Mode {
    /// Conjunction.
    #[default]
    All,
    /// Disjunction.
    Any,
    /// Negated disjunction.
    None,
}

impl Mode {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::All => "all",
            Mode::Any => "any",
            Mode::None => "none",
        }
    }

    /// Joins member fragments into one.
    ///
    /// Empty members contribute nothing. A never member poisons an `all`
    /// group and drops out of `any` and `none` groups; an `any` group whose
    /// members are all never is itself never, while the same `none` group is
    /// unconstrained.
    pub fn join(self, fragments: impl IntoIterator<Item = Fragment>) -> Fragment {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        let mut saw_never = false;
        for fragment in fragments {
            if fragment.never {
                saw_never = true;
                continue;
            }
            if fragment.sql.is_empty() {
                continue;
            }
            clauses.push(fragment.sql);
            args.extend(fragment.args);
        }
        match self {
            Mode::All if saw_never => Fragment::never(),
            Mode::Any if saw_never && clauses.is_empty() => Fragment::never(),
            _ if clauses.is_empty() => Fragment::empty(),
            Mode::All => Fragment::new(parenthesize(clauses, " AND "), args),
            Mode::Any => Fragment::new(parenthesize(clauses, " OR "), args),
            Mode::None => Fragment::new(format!("NOT ({})", clauses.join(" OR ")), args),
        }
    }

    /// In-memory counterpart of [`Mode::join`] over three-valued results.
    ///
    /// An empty group is unconstrained (`Some(true)`) under every mode, like
    /// the empty fragment it compiles to.
    pub(crate) fn combine(self, results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
        let mut results = results.into_iter().peekable();
        if results.peek().is_none() {
            return Some(true);
        }
        match self {
            Mode::All => results.fold(Some(true), and),
            Mode::Any => results.fold(Some(false), or),
            Mode::None => results.fold(Some(false), or).map(|hit| !hit),
        }
    }
}

fn parenthesize(clauses: Vec<String>, joiner: &str) -> String {
    if clauses.len() == 1 {
        clauses.into_iter().next().unwrap_or_default()
    } else {
        format!("({})", clauses.join(joiner))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Mode::All),
            "any" => Ok(Mode::Any),
            "none" => Ok(Mode::None),
            _ => Err(MatchError::InvalidArgument(format!(
                "unknown combinator mode '{s}'"
            ))),
        }
    }
}
