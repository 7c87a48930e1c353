//! Vault walker and incremental reindexer
//!
//! The unit of incremental work is one file: purge its rows, reparse,
//! validate, resolve against the surviving object set plus the incoming
//! rows, insert, and re-resolve refs whose targets changed. Parsing
//! fans out across a worker pool; all writes drain through the single
//! `Database` handle in one batched transaction.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::parser::{parse_document, ParsedDocument};
use crate::resolver::{Resolution, Resolver, ResolverEntry};
use crate::schema::{validate_document, validate_ref_targets, FieldValue, Schema};
use crate::vault::VaultConfig;

use super::database::{Database, DateEntry, DateKind, IndexedFile, ObjectRow};

/// How much work to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexMode {
    /// Only files whose mtime changed since the last pass.
    Incremental,
    /// Drop the index and rebuild everything.
    Full,
}

/// Outcome of a reindex pass.
#[derive(Debug, Default)]
pub struct ReindexReport {
    pub indexed_files: usize,
    pub removed_files: usize,
    pub unchanged_files: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// I/O-level failures (unreadable files), which are not vault
    /// content diagnostics.
    pub errors: Vec<String>,
}

/// A markdown file discovered by the walker.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub relative: String,
    pub absolute: PathBuf,
    pub mtime: i64,
}

/// Walk the vault for markdown files. Symlinks and anything whose
/// canonical path escapes the vault are rejected; dot-directories
/// (`.raven`, `.trash`, `.git`) are never entered.
pub fn walk_vault(vault_path: &Path) -> Result<Vec<WalkedFile>> {
    let canonical_root = vault_path.canonicalize()?;
    let mut files = Vec::new();

    let walker = WalkDir::new(vault_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // Never descend into dot-directories (.raven, .trash, .git),
            // but the vault root itself may carry any name.
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with('.'))
                    .unwrap_or(false)
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("walk error: {}", e);
                continue;
            }
        };

        if entry.path_is_symlink() {
            log::warn!("skipping symlink: {}", entry.path().display());
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().map_or(true, |ext| ext != "md") {
            continue;
        }

        match entry.path().canonicalize() {
            Ok(canonical) if canonical.starts_with(&canonical_root) => {}
            Ok(_) => {
                log::warn!("skipping path outside vault: {}", entry.path().display());
                continue;
            }
            Err(e) => {
                log::warn!("cannot canonicalize {}: {}", entry.path().display(), e);
                continue;
            }
        }

        let relative = entry
            .path()
            .strip_prefix(vault_path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        let mtime = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(WalkedFile {
            relative,
            absolute: entry.path().to_path_buf(),
            mtime,
        });
    }

    Ok(files)
}

/// Reindex the vault.
pub fn reindex(
    db: &mut Database,
    vault_path: &Path,
    schema: &Schema,
    config: &VaultConfig,
    mode: ReindexMode,
    cancel: &CancelToken,
) -> Result<ReindexReport> {
    let on_disk = walk_vault(vault_path)?;
    let disk_paths: HashSet<&str> = on_disk.iter().map(|f| f.relative.as_str()).collect();

    if mode == ReindexMode::Full {
        db.clear()?;
    }
    let indexed_mtimes = db.file_mtimes()?;

    // Files that vanished since the last pass.
    let removed: Vec<String> = indexed_mtimes
        .keys()
        .filter(|path| !disk_paths.contains(path.as_str()))
        .cloned()
        .collect();

    // The incremental work set.
    let work: Vec<WalkedFile> = on_disk
        .iter()
        .filter(|f| indexed_mtimes.get(&f.relative) != Some(&f.mtime))
        .cloned()
        .collect();
    let unchanged = on_disk.len() - work.len();

    let mut report = run_batch(db, schema, config, work, removed, cancel)?;
    report.unchanged_files = unchanged;
    Ok(report)
}

/// Reindex an explicit set of vault-relative paths, regardless of
/// mtime. This is the entry point the mutation layer uses after a
/// write; paths that no longer exist on disk are purged.
pub fn reindex_paths(
    db: &mut Database,
    vault_path: &Path,
    schema: &Schema,
    config: &VaultConfig,
    touched: &[String],
    cancel: &CancelToken,
) -> Result<ReindexReport> {
    let mut work = Vec::new();
    let mut removed = Vec::new();

    for rel in touched {
        let absolute = vault_path.join(rel);
        if absolute.is_file() {
            let mtime = absolute
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            work.push(WalkedFile {
                relative: rel.clone(),
                absolute,
                mtime,
            });
        } else {
            removed.push(rel.clone());
        }
    }

    run_batch(db, schema, config, work, removed, cancel)
}

/// The shared parse/validate/resolve/write pipeline.
fn run_batch(
    db: &mut Database,
    schema: &Schema,
    config: &VaultConfig,
    work: Vec<WalkedFile>,
    removed: Vec<String>,
    cancel: &CancelToken,
) -> Result<ReindexReport> {
    let mut report = ReindexReport {
        removed_files: removed.len(),
        ..Default::default()
    };
    let opts = config.parse_options();

    cancel.check()?;

    // Read-only scan phase: parse and validate in parallel.
    let parsed: Vec<std::result::Result<(ParsedDocument, i64), String>> = work
        .par_iter()
        .map(|file| {
            if cancel.is_cancelled() {
                return Err(format!("{}: cancelled", file.relative));
            }
            let content = std::fs::read_to_string(&file.absolute)
                .map_err(|e| format!("{}: {}", file.relative, e))?;
            let doc = parse_document(&content, &file.relative, schema, &opts);
            Ok((doc, file.mtime))
        })
        .collect();

    cancel.check()?;

    let mut docs: Vec<(ParsedDocument, i64)> = Vec::with_capacity(parsed.len());
    for result in parsed {
        match result {
            Ok(pair) => docs.push(pair),
            Err(msg) => report.errors.push(msg),
        }
    }

    for (doc, _) in &docs {
        report.diagnostics.extend(doc.diagnostics.iter().cloned());
        report.diagnostics.extend(validate_document(doc, schema));
    }

    // Resolver set: surviving index rows plus the incoming batch, so a
    // file referencing an object it also defines resolves in one pass.
    let touched: HashSet<String> = docs
        .iter()
        .map(|(d, _)| d.file_path.clone())
        .chain(removed.iter().cloned())
        .collect();

    let name_fields: HashMap<&str, &str> = schema.name_fields().collect();
    let mut resolver = Resolver::new(
        config.daily_directory.clone(),
        config.directories.object.clone(),
        config.directories.page.clone(),
    );
    let mut type_by_id: HashMap<String, String> = HashMap::new();

    for row in db.all_objects()? {
        if touched.contains(row.file_path.as_str()) {
            continue;
        }
        type_by_id.insert(row.id.clone(), row.object_type.clone());
        resolver.insert(row_entry(&row, &name_fields));
    }
    for (doc, _) in &docs {
        for obj in &doc.objects {
            if type_by_id.contains_key(&obj.id) {
                report.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateId,
                    &doc.file_path,
                    Some(obj.line_start),
                    format!("object id '{}' is already defined", obj.id),
                ));
            }
            type_by_id.insert(obj.id.clone(), obj.object_type.clone());
            let name_value = name_fields
                .get(obj.object_type.as_str())
                .and_then(|field| obj.fields.get(*field))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            resolver.insert(ResolverEntry {
                id: obj.id.clone(),
                alias: obj.alias.clone(),
                name_value,
            });
        }
    }

    for (alias, holders) in resolver.alias_conflicts() {
        report.diagnostics.push(Diagnostic::new(
            DiagnosticKind::AliasCollision,
            holders.first().cloned().unwrap_or_default(),
            None,
            format!("alias '{}' collides across: {}", alias, holders.join(", ")),
        ));
    }

    // Resolve references and derive the date facet.
    let mut batch: Vec<IndexedFile> = Vec::with_capacity(docs.len());
    for (doc, mtime) in docs {
        cancel.check()?;

        let mut resolved = Vec::with_capacity(doc.refs.len());
        for r in &doc.refs {
            match resolver.resolve(&r.target_raw) {
                Resolution::Resolved(id) => resolved.push(Some(id)),
                Resolution::Ambiguous(candidates) => {
                    report.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::AmbiguousReference,
                        &doc.file_path,
                        Some(r.line),
                        format!("[[{}]] matches several objects: {}", r.target_raw, candidates.join(", ")),
                    ));
                    resolved.push(None);
                }
                Resolution::Missing => {
                    report.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MissingReference,
                        &doc.file_path,
                        Some(r.line),
                        format!("[[{}]] does not resolve to any object", r.target_raw),
                    ));
                    resolved.push(None);
                }
            }
        }

        let type_of = |id: &str| type_by_id.get(id).cloned();
        report.diagnostics.extend(validate_ref_targets(&doc, schema, &type_of));

        let dates = derive_dates(&doc, schema);
        batch.push(IndexedFile {
            doc,
            resolved,
            dates,
            mtime,
        });
    }

    cancel.check()?;

    // Write phase: one batched transaction, then fix up refs whose
    // targets this pass created or destroyed.
    report.indexed_files = batch.len();
    db.apply_batch(&batch, &removed)?;

    let mut updates = Vec::new();
    for (rowid, raw) in db.unresolved_refs()? {
        if let Resolution::Resolved(id) = resolver.resolve(&raw) {
            updates.push((rowid, Some(id)));
        }
    }
    if !updates.is_empty() {
        db.set_ref_targets(&updates)?;
    }

    report
        .diagnostics
        .sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));

    Ok(report)
}

fn row_entry(row: &ObjectRow, name_fields: &HashMap<&str, &str>) -> ResolverEntry {
    let name_value = name_fields
        .get(row.object_type.as_str())
        .and_then(|field| row.fields.get(*field))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    ResolverEntry {
        id: row.id.clone(),
        alias: row.alias.clone(),
        name_value,
    }
}

/// Date facet rows: every date-valued field and every date-kind trait.
fn derive_dates(doc: &ParsedDocument, schema: &Schema) -> Vec<DateEntry> {
    let mut out = Vec::new();

    for obj in &doc.objects {
        for (name, value) in &obj.fields {
            collect_field_dates(value, name, &obj.id, &mut out);
        }
    }

    // Trait ids mirror the insert-time formula file:line:name:n.
    let mut counters: HashMap<(usize, String), usize> = HashMap::new();
    for t in &doc.traits {
        let n = counters.entry((t.line, t.name.clone())).or_insert(0);
        *n += 1;
        let is_date_kind = schema.trait_def(&t.name).map_or(false, |d| {
            matches!(d.kind, crate::schema::ValueKind::Date | crate::schema::ValueKind::Datetime)
        });
        if !is_date_kind {
            continue;
        }
        if let Some(date) = crate::dates::date_of_value(&t.value) {
            out.push(DateEntry {
                date: date.format("%Y-%m-%d").to_string(),
                kind: DateKind::TraitValue,
                source_id: format!("{}:{}:{}:{}", doc.file_path, t.line, t.name, n),
                field_name: t.name.clone(),
            });
        }
    }

    out
}

fn collect_field_dates(value: &FieldValue, name: &str, object_id: &str, out: &mut Vec<DateEntry>) {
    match value {
        FieldValue::Date(s) | FieldValue::Datetime(s) => {
            if let Some(date) = crate::dates::date_of_value(s) {
                out.push(DateEntry {
                    date: date.format("%Y-%m-%d").to_string(),
                    kind: DateKind::ObjectField,
                    source_id: object_id.to_string(),
                    field_name: name.to_string(),
                });
            }
        }
        FieldValue::List(items) => {
            for item in items {
                collect_field_dates(item, name, object_id, out);
            }
        }
        _ => {}
    }
}
