// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod demo;
mod query;

pub use demo::{
    DEMO_ALL_CITIES_VIEW_ID, DEMO_CITY_VIEW_ID, DEMO_COUNTRY_VIEW_ID, DEMO_DEPENDENT_ATTRIBUTE,
};
pub use query::CompiledQuery;

use anyhow::{Context, Result, anyhow, bail};
use optionset_app::{
    EntityMetadata, MetadataProvider, OutputValue, QueryDocument, RawRecord, RecordStore,
    ViewDefinition, ViewQuery,
};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const APP_NAME: &str = "optionset";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "entity_definitions",
        &[
            "logical_name",
            "primary_id_attribute",
            "primary_name_attribute",
            "display_name",
            "created_at",
        ],
    ),
    (
        "saved_queries",
        &[
            "id",
            "name",
            "returned_type_code",
            "query_type",
            "is_default",
            "fetch_xml",
            "created_at",
        ],
    ),
    ("records", &["entity", "id", "created_at"]),
    (
        "record_values",
        &["entity", "record_id", "attribute", "value"],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_saved_queries_entity_type",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_saved_queries_entity_type ON saved_queries (returned_type_code, query_type);",
    },
    RequiredIndex {
        name: "idx_record_values_attribute",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_record_values_attribute ON record_values (entity, attribute);",
    },
];

/// A saved view to store alongside an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewView {
    pub id: String,
    pub name: String,
    pub entity: String,
    pub query_type: i32,
    pub is_default: bool,
    pub fetch_xml: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }
        ensure_required_indexes(&self.conn)
    }

    pub fn define_entity(&self, metadata: &EntityMetadata) -> Result<()> {
        if metadata.logical_name.trim().is_empty() {
            bail!("entity logical name must not be empty");
        }
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO entity_definitions (
                  logical_name, primary_id_attribute, primary_name_attribute, display_name, created_at
                ) VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (logical_name) DO UPDATE SET
                  primary_id_attribute = excluded.primary_id_attribute,
                  primary_name_attribute = excluded.primary_name_attribute,
                  display_name = excluded.display_name
                ",
                params![
                    metadata.logical_name,
                    metadata.primary_id_attribute,
                    metadata.primary_name_attribute,
                    metadata.display_name,
                    now,
                ],
            )
            .with_context(|| format!("define entity {}", metadata.logical_name))?;
        Ok(())
    }

    pub fn list_entities(&self) -> Result<Vec<EntityMetadata>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT logical_name, primary_id_attribute, primary_name_attribute, display_name
                FROM entity_definitions
                ORDER BY logical_name ASC
                ",
            )
            .context("prepare entity list query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EntityMetadata {
                    logical_name: row.get(0)?,
                    primary_id_attribute: row.get(1)?,
                    primary_name_attribute: row.get(2)?,
                    display_name: row.get(3)?,
                })
            })
            .context("query entities")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect entities")
    }

    pub fn save_view(&self, view: &NewView) -> Result<()> {
        let doc = QueryDocument::parse(&view.fetch_xml)
            .with_context(|| format!("view {} has malformed FetchXML", view.id))?;
        if doc.entity_name() != view.entity {
            bail!(
                "view {} queries `{}` but is saved for `{}`",
                view.id,
                doc.entity_name(),
                view.entity
            );
        }
        self.require_entity(&view.entity)?;

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT OR REPLACE INTO saved_queries (
                  id, name, returned_type_code, query_type, is_default, fetch_xml, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    view.id,
                    view.name,
                    view.entity,
                    view.query_type,
                    view.is_default,
                    view.fetch_xml,
                    now,
                ],
            )
            .with_context(|| format!("save view {}", view.id))?;
        Ok(())
    }

    /// Stores `record` and returns its id. A record without a value for the
    /// primary id attribute gets a generated one.
    pub fn insert_record(&self, entity: &str, record: &RawRecord) -> Result<String> {
        let metadata = self.require_entity(entity)?;
        let id = match record
            .text(&metadata.primary_id_attribute)
            .filter(|id| !id.is_empty())
        {
            Some(id) => id,
            None => self.next_record_id(entity)?,
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin record transaction")?;
        tx.execute(
            "INSERT INTO records (entity, id, created_at) VALUES (?, ?, ?)",
            params![entity, id, now_rfc3339()?],
        )
        .with_context(|| format!("insert {entity} record {id}"))?;

        let mut stored = record.clone();
        stored.insert(&metadata.primary_id_attribute, id.clone());
        for (attribute, value) in stored.attributes() {
            let encoded = serde_json::to_string(value)
                .with_context(|| format!("encode {entity}.{attribute}"))?;
            tx.execute(
                "INSERT INTO record_values (entity, record_id, attribute, value) VALUES (?, ?, ?, ?)",
                params![entity, id, attribute, encoded],
            )
            .with_context(|| format!("insert {entity}.{attribute} for {id}"))?;
        }
        tx.commit().context("commit record")?;

        tracing::debug!(entity, %id, "record inserted");
        Ok(id)
    }

    /// Quick-create: a named record with optional extra attributes, returned
    /// as a lookup value.
    pub fn create_record(
        &self,
        entity: &str,
        name: &str,
        extra: &RawRecord,
    ) -> Result<OutputValue> {
        let name = name.trim();
        if name.is_empty() {
            bail!("a new {entity} needs a name");
        }
        let metadata = self.require_entity(entity)?;
        let mut record = extra.clone();
        record.insert(&metadata.primary_name_attribute, name);
        let id = self.insert_record(entity, &record)?;
        Ok(OutputValue {
            id,
            display_name: name.to_owned(),
            entity_type: entity.to_owned(),
        })
    }

    pub fn list_records(&self, entity: &str) -> Result<Vec<RawRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT r.id, v.attribute, v.value
                FROM records r
                LEFT JOIN record_values v ON v.entity = r.entity AND v.record_id = r.id
                WHERE r.entity = ?
                ORDER BY r.rowid ASC, v.attribute ASC
                ",
            )
            .context("prepare record list query")?;
        let rows = stmt
            .query_map(params![entity], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .with_context(|| format!("query {entity} records"))?;

        let mut records: Vec<(String, RawRecord)> = Vec::new();
        for row in rows {
            let (id, attribute, encoded) = row.with_context(|| format!("read {entity} record"))?;
            if records.last().is_none_or(|(last, _)| *last != id) {
                records.push((id.clone(), RawRecord::new()));
            }
            let (Some(attribute), Some(encoded)) = (attribute, encoded) else {
                continue;
            };
            let value: Value = serde_json::from_str(&encoded)
                .with_context(|| format!("decode {entity}.{attribute} for {id}"))?;
            if let Some((_, record)) = records.last_mut() {
                record.insert(&attribute, value);
            }
        }
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    pub fn record_count(&self, entity: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE entity = ?",
                params![entity],
                |row| row.get(0),
            )
            .with_context(|| format!("count {entity} records"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn require_entity(&self, entity: &str) -> Result<EntityMetadata> {
        self.find_entity(entity)?.ok_or_else(|| {
            anyhow!("entity `{entity}` is not defined; define it before adding views or records")
        })
    }

    fn find_entity(&self, entity: &str) -> Result<Option<EntityMetadata>> {
        self.conn
            .query_row(
                "
                SELECT logical_name, primary_id_attribute, primary_name_attribute, display_name
                FROM entity_definitions
                WHERE logical_name = ?
                ",
                params![entity],
                |row| {
                    Ok(EntityMetadata {
                        logical_name: row.get(0)?,
                        primary_id_attribute: row.get(1)?,
                        primary_name_attribute: row.get(2)?,
                        display_name: row.get(3)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("load entity definition for {entity}"))
    }

    fn next_record_id(&self, entity: &str) -> Result<String> {
        let mut next = self.record_count(entity)? + 1;
        loop {
            let candidate = format!("{entity}-{next:04}");
            let exists: i64 = self
                .conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM records WHERE entity = ? AND id = ?)",
                    params![entity, candidate],
                    |row| row.get(0),
                )
                .with_context(|| format!("check record id {candidate}"))?;
            if exists == 0 {
                return Ok(candidate);
            }
            next += 1;
        }
    }
}

impl MetadataProvider for Store {
    fn entity_metadata(&self, entity: &str) -> Result<EntityMetadata> {
        self.require_entity(entity)
    }
}

impl RecordStore for Store {
    fn retrieve_views(&self, query: &ViewQuery) -> Result<Vec<ViewDefinition>> {
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ViewDefinition> {
            Ok(ViewDefinition {
                id: row.get(0)?,
                returned_type_code: row.get(1)?,
                fetch_xml: row.get(2)?,
            })
        };
        let views = match query {
            ViewQuery::ById(id) => {
                let mut stmt = self
                    .conn
                    .prepare(
                        "
                        SELECT id, returned_type_code, fetch_xml
                        FROM saved_queries
                        WHERE lower(id) = lower(?)
                        ",
                    )
                    .context("prepare view by id query")?;
                let rows = stmt
                    .query_map(params![id], map_row)
                    .with_context(|| format!("query view {id}"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            ViewQuery::SystemView { entity, query_type } => {
                let mut stmt = self
                    .conn
                    .prepare(
                        "
                        SELECT id, returned_type_code, fetch_xml
                        FROM saved_queries
                        WHERE returned_type_code = ? AND query_type = ?
                        ORDER BY is_default DESC, name ASC, id ASC
                        ",
                    )
                    .context("prepare system view query")?;
                let rows = stmt
                    .query_map(params![entity, query_type], map_row)
                    .with_context(|| format!("query system views for {entity}"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        };
        views.context("collect views")
    }

    fn retrieve_multiple(&self, entity: &str, fetch_xml: &str) -> Result<Vec<RawRecord>> {
        let doc = QueryDocument::parse(fetch_xml).context("parse FetchXML for execution")?;
        let query = CompiledQuery::compile(&doc)?;
        if query.entity() != entity {
            bail!(
                "query targets `{}` but was sent to the `{entity}` collection",
                query.entity()
            );
        }
        let metadata = self.require_entity(entity)?;
        let records = self.list_records(entity)?;
        let total = records.len();
        let matched = query.run(records, &metadata.primary_id_attribute);
        tracing::debug!(entity, total, matched = matched.len(), "evaluated FetchXML");
        Ok(matched)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("OPTIONSET_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set OPTIONSET_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("optionset.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point the sqlite source at an optionset database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; recreate the database",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!("database is missing required indexes: {}", missing.join(", "));
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}
