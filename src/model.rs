//! Entities, their JSON documents and the typed-view registry.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::error::{MatchError, Result};
use crate::query::resolve::Column;

/// Attribute bag carried by every entity.
pub type Attributes = Map<String, Json>;

/// The two entity tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntityKind {
    /// Rows of the `node` table.
    Node,
    /// Rows of the `edge` table.
    Edge,
}

impl EntityKind {
    /// Physical table name.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
        }
    }

    /// Fixed columns of this table, in schema order.
    pub fn columns(self) -> &'static [Column] {
        match self {
            EntityKind::Node => &[Column::Id, Column::Type, Column::Labels],
            EntityKind::Edge => &[Column::Id, Column::Source, Column::Predicate, Column::Target],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A materialized row of either table.
///
/// The document is the single source both evaluators read: the row store
/// writes it to the `data` column and the in-memory evaluator walks it.
/// Fixed columns are mirrored into the document under their column names.
pub trait Entity {
    /// Table the entity lives in.
    fn kind(&self) -> EntityKind;
    /// Unique id within its table.
    fn id(&self) -> &str;
    /// Node type or edge predicate, used for registry lookups.
    fn tag(&self) -> &str;
    /// Text stored in a fixed column; `None` for columns the table lacks.
    fn column(&self, column: Column) -> Option<String>;
    /// Full JSON document.
    fn document(&self) -> Json;
}

/// Graph vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    /// Unique id.
    pub id: String,
    /// Type tag, stored in the `type` column.
    pub node_type: String,
    /// Labels, stored as a JSON array in the `labels` column.
    pub labels: Vec<String>,
    /// Dynamic attributes.
    pub attributes: Attributes,
}

impl Node {
    /// Creates a node without labels or attributes.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Rebuilds a node from its stored document.
    pub fn from_document(document: Json) -> Result<Self> {
        let mut fields = into_object(EntityKind::Node, document)?;
        let id = take_text(EntityKind::Node, &mut fields, "id")?;
        let node_type = take_text(EntityKind::Node, &mut fields, "type")?;
        let labels = match fields.remove("labels") {
            None | Some(Json::Null) => Vec::new(),
            Some(labels) => serde_json::from_value(labels).map_err(|err| {
                MatchError::invalid_document(EntityKind::Node, format!("labels: {err}"))
            })?,
        };
        Ok(Self {
            id,
            node_type,
            labels,
            attributes: fields,
        })
    }

    /// Deserializes the document into a typed view.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.document())?)
    }

    fn labels_json(&self) -> Json {
        Json::Array(self.labels.iter().cloned().map(Json::String).collect())
    }
}

impl Entity for Node {
    fn kind(&self) -> EntityKind {
        EntityKind::Node
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn tag(&self) -> &str {
        &self.node_type
    }

    fn column(&self, column: Column) -> Option<String> {
        match column {
            Column::Id => Some(self.id.clone()),
            Column::Type => Some(self.node_type.clone()),
            Column::Labels => Some(self.labels_json().to_string()),
            _ => None,
        }
    }

    fn document(&self) -> Json {
        let mut doc = self.attributes.clone();
        doc.insert("id".into(), Json::String(self.id.clone()));
        doc.insert("type".into(), Json::String(self.node_type.clone()));
        doc.insert("labels".into(), self.labels_json());
        Json::Object(doc)
    }
}

/// Directed, predicate-tagged relation between two nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Edge {
    /// Unique id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Relation tag.
    pub predicate: String,
    /// Target node id.
    pub target: String,
    /// Dynamic attributes.
    pub attributes: Attributes,
}

impl Edge {
    /// Creates an edge without attributes.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        predicate: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            predicate: predicate.into(),
            target: target.into(),
            attributes: Attributes::new(),
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Rebuilds an edge from its stored document.
    pub fn from_document(document: Json) -> Result<Self> {
        let kind = EntityKind::Edge;
        let mut fields = into_object(kind, document)?;
        Ok(Self {
            id: take_text(kind, &mut fields, "id")?,
            source: take_text(kind, &mut fields, "source")?,
            predicate: take_text(kind, &mut fields, "predicate")?,
            target: take_text(kind, &mut fields, "target")?,
            attributes: fields,
        })
    }

    /// Deserializes the document into a typed view.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.document())?)
    }
}

impl Entity for Edge {
    fn kind(&self) -> EntityKind {
        EntityKind::Edge
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn tag(&self) -> &str {
        &self.predicate
    }

    fn column(&self, column: Column) -> Option<String> {
        match column {
            Column::Id => Some(self.id.clone()),
            Column::Source => Some(self.source.clone()),
            Column::Predicate => Some(self.predicate.clone()),
            Column::Target => Some(self.target.clone()),
            _ => None,
        }
    }

    fn document(&self) -> Json {
        let mut doc = self.attributes.clone();
        doc.insert("id".into(), Json::String(self.id.clone()));
        doc.insert("source".into(), Json::String(self.source.clone()));
        doc.insert("predicate".into(), Json::String(self.predicate.clone()));
        doc.insert("target".into(), Json::String(self.target.clone()));
        Json::Object(doc)
    }
}

fn into_object(kind: EntityKind, document: Json) -> Result<Attributes> {
    match document {
        Json::Object(fields) => Ok(fields),
        other => Err(MatchError::invalid_document(
            kind,
            format!("expected an object, found {other}"),
        )),
    }
}

fn take_text(kind: EntityKind, fields: &mut Attributes, key: &str) -> Result<String> {
    match fields.remove(key) {
        Some(Json::String(text)) => Ok(text),
        Some(_) => Err(MatchError::invalid_document(
            kind,
            format!("'{key}' must be a string"),
        )),
        None => Err(MatchError::invalid_document(kind, format!("'{key}' is missing"))),
    }
}

type Validator = Box<dyn Fn(&Json) -> std::result::Result<(), String> + Send + Sync>;

/// Typed views registered against node types and edge predicates.
///
/// Built once at startup and handed to the loading path. Entities whose tag
/// has no registration load as plain [`Node`]s and [`Edge`]s.
#[derive(Default)]
pub struct TypeRegistry {
    validators: FxHashMap<(EntityKind, String), Validator>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires nodes of type `tag` to deserialize into `T`.
    pub fn register_node<T: DeserializeOwned + 'static>(&mut self, tag: &str) -> Result<&mut Self> {
        self.register::<T>(EntityKind::Node, tag)
    }

    /// Requires edges with predicate `tag` to deserialize into `T`.
    pub fn register_edge<T: DeserializeOwned + 'static>(&mut self, tag: &str) -> Result<&mut Self> {
        self.register::<T>(EntityKind::Edge, tag)
    }

    fn register<T: DeserializeOwned + 'static>(
        &mut self,
        kind: EntityKind,
        tag: &str,
    ) -> Result<&mut Self> {
        let key = (kind, tag.to_owned());
        if self.validators.contains_key(&key) {
            return Err(MatchError::Registry {
                tag: tag.to_owned(),
                reason: format!("already registered for {kind}"),
            });
        }
        let validator: Validator = Box::new(|doc: &Json| {
            serde_json::from_value::<T>(doc.clone())
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        self.validators.insert(key, validator);
        debug!(%kind, tag, type_name = std::any::type_name::<T>(), "registered typed view");
        Ok(self)
    }

    /// True when `tag` has a typed view for `kind`.
    pub fn is_registered(&self, kind: EntityKind, tag: &str) -> bool {
        self.validators.contains_key(&(kind, tag.to_owned()))
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Checks an entity against the typed view registered for its tag.
    pub fn validate(&self, entity: &dyn Entity) -> Result<()> {
        let key = (entity.kind(), entity.tag().to_owned());
        match self.validators.get(&key) {
            None => Ok(()),
            Some(validator) => validator(&entity.document()).map_err(|reason| MatchError::Registry {
                tag: key.1,
                reason,
            }),
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("registrations", &self.validators.len())
            .finish()
    }
}
