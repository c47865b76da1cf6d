//! Predicate matching for a SQLite-backed graph-entity store.
//!
//! Filters are written once as [`query::Predicate`]s and groups, normalized
//! by a [`MatchMaker`] into a [`MatchSpecification`], then either compiled to
//! a parameterized SQL `WHERE` fragment for the row store or evaluated in
//! memory against a materialized [`Node`] or [`Edge`]. Both paths share one
//! operator table and one property resolver and return the same answer for
//! every entity.
//!
//! ```
//! use sombra_match::{Graph, MatchMaker, Node};
//!
//! let graph = Graph::in_memory()?;
//! graph.set_node(&Node::new("maximilian-i", "scion").with_attribute("title", "Holy Roman Emperor"))?;
//!
//! let spec = MatchMaker::new()
//!     .where_("title", "equals", "Holy Roman Emperor")
//!     .build()?;
//! assert_eq!(graph.nodes(&spec)?.len(), 1);
//! # Ok::<(), sombra_match::MatchError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod query;
pub mod sqlite_adapter;

pub use config::{JournalMode, StoreConfig, SynchronousMode};
pub use error::{MatchError, MatchErrorWithCode, Result};
pub use graph::{EdgeSelector, Graph, NodeSelector};
pub use model::{Attributes, Edge, Entity, EntityKind, Node, TypeRegistry};
pub use query::{
    where_, where_map, Fragment, MatchMaker, MatchSpecification, Mode, Operator, Predicate,
    PredicateGroup, PredicateValue, Scalar,
};
pub use sqlite_adapter::{RowStore, SqliteStore};
