//! SQLite-backed index store
//!
//! The index is disposable: every row is derived from (file bytes,
//! schema, vault config) and the whole store can be rebuilt from the
//! vault alone. Writers are serialised by `&mut` access; WAL mode keeps
//! readers unblocked.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{RavenError, Result};
use crate::parser::{ParsedDocument, TraitSource};

/// Database handle
pub struct Database {
    conn: Connection,
}

/// One file's worth of rows, fully resolved and ready to insert.
#[derive(Debug)]
pub struct IndexedFile {
    pub doc: ParsedDocument,
    /// Resolved target ids, parallel to `doc.refs`. `None` = missing.
    pub resolved: Vec<Option<String>>,
    /// Date facet rows derived from fields and traits.
    pub dates: Vec<DateEntry>,
    /// Source file mtime (seconds); doubles as `updated_at` so index
    /// content stays a pure function of the file.
    pub mtime: i64,
}

#[derive(Debug, Clone)]
pub struct DateEntry {
    pub date: String,
    pub kind: DateKind,
    pub source_id: String,
    pub field_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    ObjectField,
    TraitValue,
}

impl DateKind {
    fn as_str(&self) -> &'static str {
        match self {
            DateKind::ObjectField => "object_field",
            DateKind::TraitValue => "trait_value",
        }
    }
}

/// An object row as stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ObjectRow {
    pub id: String,
    pub file_path: String,
    pub object_type: String,
    pub heading: Option<String>,
    pub heading_level: Option<u8>,
    pub fields: serde_json::Value,
    pub line_start: usize,
    pub line_end: usize,
    pub parent_id: Option<String>,
    pub alias: Option<String>,
    pub file_mtime: i64,
}

/// A trait row as stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraitRow {
    pub id: String,
    pub file_path: String,
    pub parent_id: String,
    pub name: String,
    pub value: String,
    pub source: TraitSource,
    pub line: usize,
    pub content: String,
}

/// A reference row as stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RefRow {
    pub rowid: i64,
    pub source_id: String,
    pub target_id: Option<String>,
    pub target_raw: String,
    pub display: Option<String>,
    pub file_path: String,
    pub line: usize,
    pub span_start: usize,
    pub span_end: usize,
}

/// Index statistics
#[derive(Debug, serde::Serialize)]
pub struct IndexStats {
    pub file_count: usize,
    pub object_count: usize,
    pub trait_count: usize,
    pub ref_count: usize,
    pub missing_ref_count: usize,
}

/// A full-text search hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub object_id: String,
    pub excerpt: String,
}

impl Database {
    /// Open or create the index under `<vault>/.raven/index.db`.
    pub fn open(vault_path: &Path) -> Result<Self> {
        let db_dir = vault_path.join(".raven");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("index.db");
        let conn = Connection::open(&db_path).map_err(corruption_or_db)?;

        let db = Database { conn };
        db.initialize().map_err(|e| match e {
            RavenError::Database(inner) => corruption_or_db(inner),
            other => other,
        })?;

        Ok(db)
    }

    /// Open an in-memory index (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            -- WAL so readers never block on the writer
            PRAGMA journal_mode = WAL;

            -- All referenceable objects (file roots + embedded headings)
            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                type TEXT NOT NULL,
                heading TEXT,
                heading_level INTEGER,
                fields TEXT NOT NULL DEFAULT '{}',
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                parent_id TEXT,
                alias TEXT,
                file_mtime INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Trait annotations (inline and frontmatter)
            CREATE TABLE IF NOT EXISTS traits (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                parent_object_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                source TEXT NOT NULL,
                line INTEGER NOT NULL,
                content TEXT NOT NULL
            );

            -- References between objects; target_id is NULL when missing
            CREATE TABLE IF NOT EXISTS refs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                target_id TEXT,
                target_raw TEXT NOT NULL,
                display TEXT,
                file_path TEXT NOT NULL,
                line INTEGER NOT NULL,
                span_start INTEGER NOT NULL,
                span_end INTEGER NOT NULL
            );

            -- Date facet over date-typed fields and trait values
            CREATE TABLE IF NOT EXISTS date_index (
                date TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                file_path TEXT NOT NULL
            );

            -- Per-file bookkeeping for the incremental decision
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                mtime INTEGER NOT NULL
            );

            -- Full-text shadow of each file body
            CREATE VIRTUAL TABLE IF NOT EXISTS fts USING fts5(
                object_id UNINDEXED,
                content
            );

            CREATE INDEX IF NOT EXISTS idx_objects_file ON objects(file_path);
            CREATE INDEX IF NOT EXISTS idx_objects_type ON objects(type);
            CREATE INDEX IF NOT EXISTS idx_objects_parent ON objects(parent_id);
            CREATE INDEX IF NOT EXISTS idx_objects_status ON objects(json_extract(fields, '$.status'));
            CREATE INDEX IF NOT EXISTS idx_objects_due ON objects(json_extract(fields, '$.due'));

            CREATE INDEX IF NOT EXISTS idx_traits_file ON traits(file_path);
            CREATE INDEX IF NOT EXISTS idx_traits_name_value ON traits(name, value);
            CREATE INDEX IF NOT EXISTS idx_traits_parent ON traits(parent_object_id);

            CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(source_id);
            CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(target_id);
            CREATE INDEX IF NOT EXISTS idx_refs_file ON refs(file_path);

            CREATE INDEX IF NOT EXISTS idx_dates_date ON date_index(date);
            CREATE INDEX IF NOT EXISTS idx_dates_file ON date_index(file_path);
        "#,
            )
            .map_err(RavenError::Database)?;

        Ok(())
    }

    /// Apply one write batch: purge rows for removed and re-indexed
    /// files, then insert the new rows. All-or-nothing.
    pub fn apply_batch(&mut self, files: &[IndexedFile], removed: &[String]) -> Result<()> {
        let tx = self.conn.transaction()?;

        let mut purged_ids: Vec<String> = Vec::new();
        for path in removed.iter().chain(files.iter().map(|f| &f.doc.file_path)) {
            purged_ids.extend(purge_file(&tx, path)?);
        }

        // Inbound refs survive the purge and surface as missing.
        for id in &purged_ids {
            tx.execute("UPDATE refs SET target_id = NULL WHERE target_id = ?", params![id])?;
        }

        for file in files {
            insert_file(&tx, file)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Refs with no resolved target, for re-resolution after inserts.
    pub fn unresolved_refs(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, target_raw FROM refs WHERE target_id IS NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Point refs at their (re-)resolved targets.
    pub fn set_ref_targets(&mut self, updates: &[(i64, Option<String>)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (rowid, target) in updates {
            tx.execute("UPDATE refs SET target_id = ? WHERE id = ?", params![target, rowid])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every row derived from a file (the file disappeared).
    pub fn remove_file(&mut self, file_path: &str) -> Result<()> {
        self.apply_batch(&[], &[file_path.to_string()])
    }

    /// Drop all derived rows, for a full rebuild.
    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM objects; DELETE FROM traits; DELETE FROM refs;
             DELETE FROM date_index; DELETE FROM files; DELETE FROM fts;",
        )?;
        Ok(())
    }

    /// Indexed mtime per file, for the incremental/full decision.
    pub fn file_mtimes(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM files")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (path, mtime) = row?;
            map.insert(path, mtime);
        }
        Ok(map)
    }

    pub fn object_by_id(&self, id: &str) -> Result<Option<ObjectRow>> {
        let mut stmt = self.conn.prepare(&format!("{} WHERE id = ?", SELECT_OBJECTS))?;
        stmt.query_row(params![id], object_from_row).optional().map_err(Into::into)
    }

    pub fn objects_by_type(&self, object_type: &str) -> Result<Vec<ObjectRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE type = ? ORDER BY file_path, line_start, id",
            SELECT_OBJECTS
        ))?;
        let rows = stmt.query_map(params![object_type], object_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn all_objects(&self) -> Result<Vec<ObjectRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY file_path, line_start, id", SELECT_OBJECTS))?;
        let rows = stmt.query_map([], object_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn objects_in_file(&self, file_path: &str) -> Result<Vec<ObjectRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE file_path = ? ORDER BY line_start, id",
            SELECT_OBJECTS
        ))?;
        let rows = stmt.query_map(params![file_path], object_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn traits_by_name(&self, name: &str) -> Result<Vec<TraitRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE name = ? ORDER BY file_path, line, id",
            SELECT_TRAITS
        ))?;
        let rows = stmt.query_map(params![name], trait_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn all_traits(&self) -> Result<Vec<TraitRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY file_path, line, id", SELECT_TRAITS))?;
        let rows = stmt.query_map([], trait_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn all_refs(&self) -> Result<Vec<RefRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY file_path, line, id", SELECT_REFS))?;
        let rows = stmt.query_map([], ref_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Inbound references for a resolved object id.
    pub fn backlinks(&self, target_id: &str) -> Result<Vec<RefRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE target_id = ? ORDER BY file_path, line, id",
            SELECT_REFS
        ))?;
        let rows = stmt.query_map(params![target_id], ref_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// References owned by objects of a file.
    pub fn refs_in_file(&self, file_path: &str) -> Result<Vec<RefRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE file_path = ? ORDER BY line, id", SELECT_REFS))?;
        let rows = stmt.query_map(params![file_path], ref_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Files whose refs currently resolve to one of `target_ids`.
    pub fn files_referencing(&self, target_ids: &[String]) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file_path FROM refs WHERE target_id = ? ORDER BY file_path")?;
        for target in target_ids {
            let rows = stmt.query_map(params![target], |row| row.get::<_, String>(0))?;
            for row in rows {
                let path = row?;
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Date facet lookup (inclusive range).
    pub fn dates_between(&self, start: &str, end: &str) -> Result<Vec<(String, String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, kind, source_id FROM date_index
             WHERE date >= ? AND date <= ?
             ORDER BY date, file_path, source_id",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Full-text search over file bodies.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let mut stmt = self.conn.prepare(
            "SELECT object_id, snippet(fts, 1, '', '', '…', 12)
             FROM fts WHERE fts MATCH ? ORDER BY rank LIMIT ?",
        )?;
        let rows = stmt.query_map(params![text, limit as i64], |row| {
            Ok(SearchHit {
                object_id: row.get(0)?,
                excerpt: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Get statistics about the index
    pub fn stats(&self) -> Result<IndexStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(IndexStats {
            file_count: count("SELECT COUNT(*) FROM files")?,
            object_count: count("SELECT COUNT(*) FROM objects")?,
            trait_count: count("SELECT COUNT(*) FROM traits")?,
            ref_count: count("SELECT COUNT(*) FROM refs")?,
            missing_ref_count: count("SELECT COUNT(*) FROM refs WHERE target_id IS NULL")?,
        })
    }

    /// File-level objects still on the `page` fallback type.
    pub fn untyped_pages(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM objects WHERE type = 'page' AND parent_id IS NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Deterministic dump of the logical index content. Two stores with
    /// equal snapshots are equivalent regardless of sqlite page layout
    /// or rowid assignment.
    pub fn snapshot(&self) -> Result<String> {
        let mut out = String::new();

        for obj in self.all_objects()? {
            out.push_str(&format!(
                "object|{}|{}|{}|{:?}|{:?}|{}|{}|{}|{:?}|{:?}|{}\n",
                obj.id,
                obj.file_path,
                obj.object_type,
                obj.heading,
                obj.heading_level,
                obj.fields,
                obj.line_start,
                obj.line_end,
                obj.parent_id,
                obj.alias,
                obj.file_mtime,
            ));
        }
        for t in self.all_traits()? {
            out.push_str(&format!(
                "trait|{}|{}|{}|{}|{}|{}|{}\n",
                t.file_path,
                t.parent_id,
                t.name,
                t.value,
                t.source.as_str(),
                t.line,
                t.content,
            ));
        }
        for r in self.all_refs()? {
            out.push_str(&format!(
                "ref|{}|{:?}|{}|{:?}|{}|{}|{}|{}\n",
                r.source_id, r.target_id, r.target_raw, r.display, r.file_path, r.line, r.span_start, r.span_end,
            ));
        }

        let mut stmt = self.conn.prepare(
            "SELECT date, kind, source_id, field_name, file_path FROM date_index
             ORDER BY date, file_path, source_id, field_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(format!(
                "date|{}|{}|{}|{}|{}\n",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            out.push_str(&row?);
        }

        Ok(out)
    }
}

const SELECT_OBJECTS: &str = "SELECT id, file_path, type, heading, heading_level, fields, \
     line_start, line_end, parent_id, alias, file_mtime FROM objects";

const SELECT_TRAITS: &str =
    "SELECT id, file_path, parent_object_id, name, value, source, line, content FROM traits";

const SELECT_REFS: &str = "SELECT id, source_id, target_id, target_raw, display, file_path, \
     line, span_start, span_end FROM refs";

fn object_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectRow> {
    let fields_json: String = row.get(5)?;
    let fields = serde_json::from_str(&fields_json).unwrap_or(serde_json::Value::Null);
    Ok(ObjectRow {
        id: row.get(0)?,
        file_path: row.get(1)?,
        object_type: row.get(2)?,
        heading: row.get(3)?,
        heading_level: row.get::<_, Option<i64>>(4)?.map(|l| l as u8),
        fields,
        line_start: row.get::<_, i64>(6)? as usize,
        line_end: row.get::<_, i64>(7)? as usize,
        parent_id: row.get(8)?,
        alias: row.get(9)?,
        file_mtime: row.get(10)?,
    })
}

fn trait_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TraitRow> {
    let source: String = row.get(5)?;
    Ok(TraitRow {
        id: row.get(0)?,
        file_path: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        value: row.get(4)?,
        source: if source == "frontmatter" {
            TraitSource::Frontmatter
        } else {
            TraitSource::Inline
        },
        line: row.get::<_, i64>(6)? as usize,
        content: row.get(7)?,
    })
}

fn ref_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RefRow> {
    Ok(RefRow {
        rowid: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        target_raw: row.get(3)?,
        display: row.get(4)?,
        file_path: row.get(5)?,
        line: row.get::<_, i64>(6)? as usize,
        span_start: row.get::<_, i64>(7)? as usize,
        span_end: row.get::<_, i64>(8)? as usize,
    })
}

/// Delete every row derived from `path`; returns the purged object ids.
fn purge_file(tx: &Transaction<'_>, path: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    {
        let mut stmt = tx.prepare("SELECT id FROM objects WHERE file_path = ?")?;
        let rows = stmt.query_map(params![path], |row| row.get::<_, String>(0))?;
        for row in rows {
            ids.push(row?);
        }
    }

    let file_id: Option<String> = tx
        .query_row("SELECT file_id FROM files WHERE path = ?", params![path], |row| row.get(0))
        .optional()?;
    if let Some(file_id) = file_id {
        tx.execute("DELETE FROM fts WHERE object_id = ?", params![file_id])?;
    }

    tx.execute("DELETE FROM objects WHERE file_path = ?", params![path])?;
    tx.execute("DELETE FROM traits WHERE file_path = ?", params![path])?;
    tx.execute("DELETE FROM refs WHERE file_path = ?", params![path])?;
    tx.execute("DELETE FROM date_index WHERE file_path = ?", params![path])?;
    tx.execute("DELETE FROM files WHERE path = ?", params![path])?;

    Ok(ids)
}

fn insert_file(tx: &Transaction<'_>, file: &IndexedFile) -> Result<()> {
    let doc = &file.doc;

    for obj in &doc.objects {
        let fields_json = serde_json::to_string(&obj.fields)?;
        tx.execute(
            r#"INSERT INTO objects
               (id, file_path, type, heading, heading_level, fields, line_start, line_end,
                parent_id, alias, file_mtime, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &obj.id,
                &doc.file_path,
                &obj.object_type,
                &obj.heading,
                &obj.heading_level,
                &fields_json,
                obj.line_start as i64,
                obj.line_end as i64,
                &obj.parent_id,
                &obj.alias,
                file.mtime,
                file.mtime,
            ],
        )?;
    }

    let mut line_counters: HashMap<(usize, String), usize> = HashMap::new();
    for t in &doc.traits {
        let n = line_counters.entry((t.line, t.name.clone())).or_insert(0);
        *n += 1;
        let trait_id = format!("{}:{}:{}:{}", doc.file_path, t.line, t.name, n);
        tx.execute(
            r#"INSERT INTO traits
               (id, file_path, parent_object_id, name, value, source, line, content)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &trait_id,
                &doc.file_path,
                &t.parent_id,
                &t.name,
                &t.value,
                t.source.as_str(),
                t.line as i64,
                &t.content_line,
            ],
        )?;
    }

    for (r, target) in doc.refs.iter().zip(&file.resolved) {
        tx.execute(
            r#"INSERT INTO refs
               (source_id, target_id, target_raw, display, file_path, line, span_start, span_end)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &r.source_id,
                target,
                &r.target_raw,
                &r.display,
                &doc.file_path,
                r.line as i64,
                r.span_start as i64,
                r.span_end as i64,
            ],
        )?;
    }

    for d in &file.dates {
        tx.execute(
            "INSERT INTO date_index (date, kind, source_id, field_name, file_path) VALUES (?, ?, ?, ?, ?)",
            params![&d.date, d.kind.as_str(), &d.source_id, &d.field_name, &doc.file_path],
        )?;
    }

    tx.execute(
        "INSERT INTO files (path, file_id, mtime) VALUES (?, ?, ?)",
        params![&doc.file_path, &doc.file_id, file.mtime],
    )?;
    tx.execute(
        "INSERT INTO fts (object_id, content) VALUES (?, ?)",
        params![&doc.file_id, &doc.body_text],
    )?;

    Ok(())
}

fn corruption_or_db(e: rusqlite::Error) -> RavenError {
    let msg = e.to_string();
    if msg.contains("not a database") || msg.contains("malformed") || msg.contains("corrupt") {
        RavenError::IndexCorrupt(msg)
    } else {
        RavenError::Database(e)
    }
}
