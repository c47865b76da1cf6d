//! Property path resolution shared by SQL compilation and in-memory evaluation.
//!
//! A path either names one of the fixed, indexed columns of an entity table or
//! points into the JSON document stored in the `data` column. Both evaluators
//! go through [`resolve`], so a path can never be a column for one of them and
//! a document path for the other.

use std::fmt;

use serde_json::Value as Json;

use crate::error::{MatchError, Result};
use crate::model::EntityKind;
use crate::query::value::Affinity;

/// Name of the column holding each entity's serialized document.
pub const DOCUMENT_COLUMN: &str = "data";

/// Fixed, physically indexed columns of the entity tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Column {
    /// Entity identifier (both tables).
    Id,
    /// Node type tag.
    Type,
    /// Node labels, stored as a JSON array.
    Labels,
    /// Edge source node id.
    Source,
    /// Edge predicate tag.
    Predicate,
    /// Edge target node id.
    Target,
}

impl Column {
    /// Every reserved column name.
    pub const ALL: [Column; 6] = [
        Column::Id,
        Column::Type,
        Column::Labels,
        Column::Source,
        Column::Predicate,
        Column::Target,
    ];

    /// Physical column name, also the document key mirroring it.
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Type => "type",
            Column::Labels => "labels",
            Column::Source => "source",
            Column::Predicate => "predicate",
            Column::Target => "target",
        }
    }

    /// Looks up a reserved column by name.
    pub fn from_name(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Whether the table for `kind` physically carries this column.
    pub fn belongs_to(self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Node => matches!(self, Column::Id | Column::Type | Column::Labels),
            EntityKind::Edge => matches!(
                self,
                Column::Id | Column::Source | Column::Predicate | Column::Target
            ),
        }
    }

    /// True for the column holding a JSON array rather than plain text.
    pub fn is_json_array(self) -> bool {
        self == Column::Labels
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated dot-separated property path.
///
/// Segments are limited to alphanumerics, `_` and `-` because the path is
/// spliced into SQL text as a JSON path literal.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PropertyPath(String);

impl PropertyPath {
    /// Validates `raw` as a property path.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(invalid(&raw, "path is empty"));
        }
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(invalid(&raw, "path has an empty segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            {
                return Err(invalid(
                    &raw,
                    "segments may only contain alphanumerics, '_' and '-'",
                ));
            }
        }
        Ok(Self(raw))
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// JSON path literal understood by `json_extract`, e.g. `$.some.deep.property`.
    pub fn json_path(&self) -> String {
        format!("$.{}", self.0)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn invalid(path: &str, reason: &'static str) -> MatchError {
    MatchError::InvalidPropertyPath {
        path: path.to_owned(),
        reason,
    }
}

/// Where a property lives for a given entity table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// One of the fixed columns.
    Column(Column),
    /// A path inside the JSON document column.
    Document(PropertyPath),
}

/// Classifies `path` against the tables of `kind`.
///
/// With `kind == None` every reserved name is treated as a fixed column; with
/// a kind, only the columns that table carries are.
pub fn resolve(path: &PropertyPath, kind: Option<EntityKind>) -> Resolution {
    match Column::from_name(path.as_str()) {
        Some(column) if kind.map_or(true, |k| column.belongs_to(k)) => Resolution::Column(column),
        _ => Resolution::Document(path.clone()),
    }
}

impl Resolution {
    /// SQL expression reading the property.
    pub fn expr(&self) -> String {
        match self {
            Resolution::Column(column) => column.name().to_owned(),
            Resolution::Document(path) => {
                format!("json_extract({DOCUMENT_COLUMN}, '{}')", path.json_path())
            }
        }
    }

    /// Affinity SQLite applies when comparing against this location.
    pub fn affinity(&self) -> Affinity {
        match self {
            Resolution::Column(_) => Affinity::Text,
            Resolution::Document(_) => Affinity::None,
        }
    }

    /// Walks an entity document to the value this resolution reads.
    ///
    /// Fixed columns mirror their document key, so a column resolves to the
    /// top-level field of the same name.
    pub fn locate<'d>(&self, document: &'d Json) -> Option<&'d Json> {
        match self {
            Resolution::Column(column) => document.get(column.name()),
            Resolution::Document(path) => path
                .segments()
                .try_fold(document, |value, segment| value.get(segment)),
        }
    }
}
