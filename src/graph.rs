//! Graph facade over a [`RowStore`].
//!
//! Writes validate entities against the [`TypeRegistry`]; reads compile a
//! [`MatchSpecification`] for the entity's table, load the returned documents
//! and apply the in-memory post-filters.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde_json::Value as Json;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{MatchError, Result};
use crate::model::{Edge, Entity, EntityKind, Node, TypeRegistry};
use crate::query::compile::Mode;
use crate::query::matcher::{MatchMaker, MatchSpecification};
use crate::sqlite_adapter::{RowStore, SqliteStore};

/// Node shortcut filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeSelector {
    /// Node carries this label.
    pub label: Option<String>,
    /// Node has this type.
    pub node_type: Option<String>,
}

impl NodeSelector {
    /// Selects nodes carrying `label`.
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Selects nodes of `node_type`.
    pub fn node_type(node_type: impl Into<String>) -> Self {
        Self {
            node_type: Some(node_type.into()),
            ..Self::default()
        }
    }

    /// Lowers the selector into a builder that more filters can be added to.
    pub fn matcher(&self) -> MatchMaker {
        let mut maker = MatchMaker::new();
        if let Some(label) = &self.label {
            maker = maker.where_("labels", "contains", label.as_str());
        }
        if let Some(node_type) = &self.node_type {
            maker = maker.where_("type", "equals", node_type.as_str());
        }
        maker
    }
}

/// Edge shortcut filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeSelector {
    /// Edge has this predicate.
    pub predicate: Option<String>,
    /// Edge starts at this node.
    pub source: Option<String>,
    /// Edge ends at this node.
    pub target: Option<String>,
    /// Edge touches this node at either end; overrides `source` and `target`.
    pub source_or_target: Option<String>,
}

impl EdgeSelector {
    /// Selects edges with `predicate`.
    pub fn predicate(predicate: impl Into<String>) -> Self {
        Self {
            predicate: Some(predicate.into()),
            ..Self::default()
        }
    }

    /// Selects edges touching `node` at either end.
    pub fn touching(node: impl Into<String>) -> Self {
        Self {
            source_or_target: Some(node.into()),
            ..Self::default()
        }
    }

    /// Lowers the selector into a builder that more filters can be added to.
    pub fn matcher(&self) -> MatchMaker {
        let mut maker = MatchMaker::new();
        if let Some(predicate) = &self.predicate {
            maker = maker.where_("predicate", "equals", predicate.as_str());
        }
        if let Some(node) = &self.source_or_target {
            return maker.group(Mode::Any, |g| {
                g.equals("source", node.as_str())
                    .equals("target", node.as_str());
            });
        }
        if let Some(source) = &self.source {
            maker = maker.where_("source", "equals", source.as_str());
        }
        if let Some(target) = &self.target {
            maker = maker.where_("target", "equals", target.as_str());
        }
        maker
    }
}

/// Nodes and edges stored in one row store.
pub struct Graph<S: RowStore = SqliteStore> {
    store: S,
    registry: Arc<TypeRegistry>,
}

impl Graph<SqliteStore> {
    /// Opens a SQLite-backed graph without typed views.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Ok(Self::with_store(
            SqliteStore::open(config)?,
            Arc::new(TypeRegistry::new()),
        ))
    }

    /// Opens a private in-memory graph.
    pub fn in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }
}

impl<S: RowStore> Graph<S> {
    /// Wraps an existing store and registry.
    pub fn with_store(store: S, registry: Arc<TypeRegistry>) -> Self {
        Self { store, registry }
    }

    /// Underlying row store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registry used to validate entities.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Inserts or replaces a node.
    pub fn set_node(&self, node: &Node) -> Result<()> {
        self.registry.validate(node)?;
        self.store.upsert(node)
    }

    /// Inserts or replaces an edge.
    pub fn set_edge(&self, edge: &Edge) -> Result<()> {
        self.registry.validate(edge)?;
        self.store.upsert(edge)
    }

    /// Inserts or replaces nodes in one transaction.
    pub fn set_nodes(&self, nodes: &[Node]) -> Result<()> {
        self.set_all(nodes.iter().map(|n| n as &dyn Entity).collect())
    }

    /// Inserts or replaces edges in one transaction.
    pub fn set_edges(&self, edges: &[Edge]) -> Result<()> {
        self.set_all(edges.iter().map(|e| e as &dyn Entity).collect())
    }

    /// Inserts or replaces a mix of entities in one transaction.
    pub fn set_all(&self, entities: Vec<&dyn Entity>) -> Result<()> {
        for entity in &entities {
            self.registry.validate(*entity)?;
        }
        self.store.upsert_many(&entities)
    }

    /// Inserts a node whose id must not be taken.
    pub fn insert_node(&self, node: &Node) -> Result<()> {
        self.registry.validate(node)?;
        self.store.insert_only(node)
    }

    /// Inserts an edge whose id must not be taken.
    pub fn insert_edge(&self, edge: &Edge) -> Result<()> {
        self.registry.validate(edge)?;
        self.store.insert_only(edge)
    }

    /// Node stored under `id`.
    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        self.store
            .get_by_id(EntityKind::Node, id)?
            .map(|doc| self.load(doc, Node::from_document))
            .transpose()
    }

    /// Edge stored under `id`.
    pub fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        self.store
            .get_by_id(EntityKind::Edge, id)?
            .map(|doc| self.load(doc, Edge::from_document))
            .transpose()
    }

    /// Node stored under `id`, or [`MatchError::NotFound`].
    pub fn require_node(&self, id: &str) -> Result<Node> {
        self.get_node(id)?.ok_or_else(|| MatchError::NotFound {
            kind: EntityKind::Node,
            id: id.to_owned(),
        })
    }

    /// Edge stored under `id`, or [`MatchError::NotFound`].
    pub fn require_edge(&self, id: &str) -> Result<Edge> {
        self.get_edge(id)?.ok_or_else(|| MatchError::NotFound {
            kind: EntityKind::Edge,
            id: id.to_owned(),
        })
    }

    /// True when a node with `id` exists.
    pub fn has_node(&self, id: &str) -> Result<bool> {
        self.store.exists_by_id(EntityKind::Node, id)
    }

    /// True when an edge with `id` exists.
    pub fn has_edge(&self, id: &str) -> Result<bool> {
        self.store.exists_by_id(EntityKind::Edge, id)
    }

    /// Deletes nodes by id; returns how many existed.
    pub fn delete_nodes<I, T>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.store.delete(EntityKind::Node, &unique(ids))
    }

    /// Deletes edges by id; returns how many existed.
    pub fn delete_edges<I, T>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.store.delete(EntityKind::Edge, &unique(ids))
    }

    /// Nodes matching `spec`.
    pub fn nodes(&self, spec: &MatchSpecification) -> Result<Vec<Node>> {
        if let Some(id) = spec.single_id() {
            return Ok(self.get_node(id)?.into_iter().collect());
        }
        self.select(EntityKind::Node, spec, Node::from_document)
    }

    /// Edges matching `spec`.
    pub fn edges(&self, spec: &MatchSpecification) -> Result<Vec<Edge>> {
        if let Some(id) = spec.single_id() {
            return Ok(self.get_edge(id)?.into_iter().collect());
        }
        self.select(EntityKind::Edge, spec, Edge::from_document)
    }

    /// Nodes matching a selector.
    pub fn match_nodes(&self, selector: &NodeSelector) -> Result<Vec<Node>> {
        self.nodes(&selector.matcher().build()?)
    }

    /// Edges matching a selector.
    pub fn match_edges(&self, selector: &EdgeSelector) -> Result<Vec<Edge>> {
        self.edges(&selector.matcher().build()?)
    }

    /// Number of nodes matching `spec`.
    pub fn count_nodes(&self, spec: &MatchSpecification) -> Result<u64> {
        self.count(EntityKind::Node, spec, Node::from_document)
    }

    /// Number of edges matching `spec`.
    pub fn count_edges(&self, spec: &MatchSpecification) -> Result<u64> {
        self.count(EntityKind::Edge, spec, Edge::from_document)
    }

    fn load<E: Entity>(&self, doc: Json, parse: fn(Json) -> Result<E>) -> Result<E> {
        let entity = parse(doc)?;
        self.registry.validate(&entity)?;
        Ok(entity)
    }

    fn select<E: Entity>(
        &self,
        kind: EntityKind,
        spec: &MatchSpecification,
        parse: fn(Json) -> Result<E>,
    ) -> Result<Vec<E>> {
        let fragment = spec.compile(kind);
        let mut found = Vec::new();
        let mut rejected = 0usize;
        self.store.select_where_each(kind, &fragment, &mut |doc| {
            let entity = self.load(doc, parse)?;
            if spec.filter(&entity) {
                found.push(entity);
            } else {
                rejected += 1;
            }
            Ok(true)
        })?;
        debug!(%kind, matched = found.len(), rejected, "match complete");
        Ok(found)
    }

    fn count<E: Entity>(
        &self,
        kind: EntityKind,
        spec: &MatchSpecification,
        parse: fn(Json) -> Result<E>,
    ) -> Result<u64> {
        if spec.function_count() == 0 {
            return self.store.count(kind, &spec.compile(kind));
        }
        Ok(self.select(kind, spec, parse)?.len() as u64)
    }
}

fn unique<I, T>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut seen = FxHashSet::default();
    ids.into_iter()
        .map(Into::into)
        .filter(|id: &String| seen.insert(id.clone()))
        .collect()
}
