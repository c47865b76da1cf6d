#![forbid(unsafe_code)]

//! Query predicates and their two evaluators.
//!
//! Filters are compiled to a parameterized SQL fragment for the row store and
//! tested in memory against materialized entities. Both evaluators share the
//! operator table ([`operator`]) and the property resolver ([`resolve`]), so
//! they agree on every entity.

/// Fragments and the all/any/none combinators.
pub mod compile;

/// Match specifications and the builder that normalizes filter inputs.
pub mod matcher;

/// The operator vocabulary and its SQL and in-memory semantics.
pub mod operator;

/// Single predicates, predicate groups and the group builder.
pub mod predicate;

/// Property path validation and column/document resolution.
pub mod resolve;

/// Comparison values and SQLite storage classes.
pub mod value;

pub use compile::{Fragment, Mode};
pub use matcher::{EntityFn, MatchInput, MatchMaker, MatchSpecification};
pub use operator::{Arity, Operator, ValueClass};
pub use predicate::{where_, where_map, GroupBuilder, Predicate, PredicateGroup};
pub use resolve::{resolve, Column, PropertyPath, Resolution, DOCUMENT_COLUMN};
pub use value::{PredicateValue, Scalar};
