//! SQLite row store for nodes and edges.
//!
//! Each table carries a few fixed, indexed `TEXT` columns plus a `data`
//! column holding the full JSON document. Compiled [`Fragment`]s are spliced
//! into `WHERE` clauses verbatim and their arguments bound positionally.

use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{MatchError, Result};
use crate::model::{Entity, EntityKind};
use crate::query::compile::Fragment;
use crate::query::resolve::DOCUMENT_COLUMN;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS node (
    id TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL,
    labels TEXT,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS node_type ON node (type);
CREATE TABLE IF NOT EXISTS edge (
    id TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    predicate TEXT NOT NULL,
    target TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS edge_source ON edge (source);
CREATE INDEX IF NOT EXISTS edge_target ON edge (target);
CREATE INDEX IF NOT EXISTS edge_predicate ON edge (predicate);
";

/// Keeps `IN (...)` lists below SQLite's bound-variable limit.
const DELETE_CHUNK: usize = 500;

/// Storage operations the query layer consumes.
pub trait RowStore: Send + Sync {
    /// Streams documents of rows matching `fragment` to `visit` until it
    /// returns `false`. Never fragments run no statement.
    fn select_where_each(
        &self,
        kind: EntityKind,
        fragment: &Fragment,
        visit: &mut dyn FnMut(Json) -> Result<bool>,
    ) -> Result<()>;

    /// Collects documents of rows matching `fragment`.
    fn select_where(&self, kind: EntityKind, fragment: &Fragment) -> Result<Vec<Json>> {
        let mut rows = Vec::new();
        self.select_where_each(kind, fragment, &mut |doc| {
            rows.push(doc);
            Ok(true)
        })?;
        Ok(rows)
    }

    /// Inserts or replaces an entity.
    fn upsert(&self, entity: &dyn Entity) -> Result<()>;

    /// Inserts or replaces several entities in one transaction.
    fn upsert_many(&self, entities: &[&dyn Entity]) -> Result<()>;

    /// Inserts an entity, failing with [`MatchError::Conflict`] on a taken id.
    fn insert_only(&self, entity: &dyn Entity) -> Result<()>;

    /// Deletes rows by id and returns how many were removed.
    fn delete(&self, kind: EntityKind, ids: &[String]) -> Result<usize>;

    /// Document stored under `id`.
    fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Json>>;

    /// True when a row with `id` exists.
    fn exists_by_id(&self, kind: EntityKind, id: &str) -> Result<bool>;

    /// Number of rows matching `fragment`.
    fn count(&self, kind: EntityKind, fragment: &Fragment) -> Result<u64>;
}

/// [`RowStore`] over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Opens the database described by `config`, applying pragmas and
    /// creating the schema when missing.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        // Only takes effect before the first table exists and before WAL.
        if let Some(page_size) = config.page_size {
            conn.pragma_update(None, "page_size", page_size)?;
        }
        if config.path.is_some() {
            let mode: String = conn.pragma_update_and_check(
                None,
                "journal_mode",
                config.journal_mode.as_str(),
                |row| row.get(0),
            )?;
            debug!(journal_mode = %mode, "journal mode applied");
            let _: i64 = conn.pragma_update_and_check(
                None,
                "journal_size_limit",
                config.journal_size_limit,
                |row| row.get(0),
            )?;
        }
        conn.pragma_update(None, "synchronous", config.synchronous.as_str())?;
        conn.pragma_update(
            None,
            "temp_store",
            if config.temp_store_memory { "MEMORY" } else { "DEFAULT" },
        )?;
        if config.mmap_size > 0 {
            let size = i64::try_from(config.mmap_size).unwrap_or(i64::MAX);
            let _: i64 =
                conn.pragma_update_and_check(None, "mmap_size", size, |row| row.get(0))?;
        }
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        conn.pragma_update(None, "automatic_index", config.automatic_index)?;
        conn.execute_batch(SCHEMA)?;
        info!(
            path = ?config.path,
            journal_mode = config.journal_mode.as_str(),
            synchronous = config.synchronous.as_str(),
            "row store opened"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs `PRAGMA optimize`, refreshing planner statistics where stale.
    pub fn optimize(&self) -> Result<()> {
        self.conn.lock().execute_batch("PRAGMA optimize")?;
        debug!("optimize complete");
        Ok(())
    }
}

fn upsert_sql(kind: EntityKind, replace: bool) -> String {
    let columns = kind.columns();
    let names: Vec<&str> = columns.iter().map(|c| c.name()).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let mut sql = format!(
        "INSERT INTO {table} ({cols}, {DOCUMENT_COLUMN}) VALUES ({params}, json(?{doc}))",
        table = kind.table(),
        cols = names.join(", "),
        params = placeholders.join(", "),
        doc = names.len() + 1,
    );
    if replace {
        let updates: Vec<String> = names
            .iter()
            .skip(1)
            .chain(std::iter::once(&DOCUMENT_COLUMN))
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();
        sql.push_str(&format!(" ON CONFLICT(id) DO UPDATE SET {}", updates.join(", ")));
    }
    sql
}

fn write_row(conn: &Connection, entity: &dyn Entity, replace: bool) -> Result<()> {
    let kind = entity.kind();
    let mut values: Vec<Option<String>> = kind.columns().iter().map(|c| entity.column(*c)).collect();
    values.push(Some(serde_json::to_string(&entity.document())?));
    let mut stmt = conn.prepare_cached(&upsert_sql(kind, replace))?;
    match stmt.execute(params_from_iter(values.iter())) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if !replace && err.code == ErrorCode::ConstraintViolation =>
        {
            Err(MatchError::Conflict {
                kind,
                id: entity.id().to_owned(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

impl RowStore for SqliteStore {
    fn select_where_each(
        &self,
        kind: EntityKind,
        fragment: &Fragment,
        visit: &mut dyn FnMut(Json) -> Result<bool>,
    ) -> Result<()> {
        let select = format!("SELECT {DOCUMENT_COLUMN} FROM {}", kind.table());
        let Some(sql) = fragment.apply_to(&select) else {
            debug!(%kind, "never fragment; skipping query");
            return Ok(());
        };
        debug!(%kind, %sql, args = ?fragment.args(), "select");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(fragment.args().iter()))?;
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            if !visit(serde_json::from_str(&text)?)? {
                break;
            }
        }
        Ok(())
    }

    fn upsert(&self, entity: &dyn Entity) -> Result<()> {
        debug!(kind = %entity.kind(), id = entity.id(), "upsert");
        write_row(&self.conn.lock(), entity, true)
    }

    fn upsert_many(&self, entities: &[&dyn Entity]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entity in entities {
            write_row(&tx, *entity, true)?;
        }
        tx.commit()?;
        debug!(count = entities.len(), "upserted batch");
        Ok(())
    }

    fn insert_only(&self, entity: &dyn Entity) -> Result<()> {
        debug!(kind = %entity.kind(), id = entity.id(), "insert");
        write_row(&self.conn.lock(), entity, false)
    }

    fn delete(&self, kind: EntityKind, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("DELETE FROM {} WHERE id IN ({placeholders})", kind.table());
            removed += tx.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        tx.commit()?;
        debug!(%kind, requested = ids.len(), removed, "delete");
        Ok(removed)
    }

    fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<Json>> {
        let sql = format!("SELECT {DOCUMENT_COLUMN} FROM {} WHERE id = ?1", kind.table());
        let conn = self.conn.lock();
        let text: Option<String> = conn
            .prepare_cached(&sql)?
            .query_row([id], |row| row.get(0))
            .optional()?;
        text.map(|t| serde_json::from_str(&t)).transpose().map_err(Into::into)
    }

    fn exists_by_id(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = ?1)", kind.table());
        let conn = self.conn.lock();
        let found: bool = conn.prepare_cached(&sql)?.query_row([id], |row| row.get(0))?;
        Ok(found)
    }

    fn count(&self, kind: EntityKind, fragment: &Fragment) -> Result<u64> {
        let select = format!("SELECT COUNT(*) FROM {}", kind.table());
        let Some(sql) = fragment.apply_to(&select) else {
            return Ok(0);
        };
        let conn = self.conn.lock();
        let count: i64 = conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(fragment.args().iter()), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
