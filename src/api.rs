//! Typed request surface
//!
//! The `Raven` handle bundles a vault's schema, config, and index, and
//! exposes the operations embedding layers (CLI, LSP, MCP) call. Every
//! operation returns a uniform envelope: success flag, payload,
//! warnings, and a structured error with a stable code.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::error::{Diagnostic, RavenError, Result, Severity};
use crate::index::{
    reindex, Database, IndexStats, ObjectRow, RefRow, ReindexMode, SearchHit, TraitRow,
};
use crate::mutate::{AppendResult, CreateResult, DeleteResult, MoveResult, Mutator};
use crate::query::{expand_saved_query, run_query, QueryKind, QueryRows};
use crate::resolver::{Resolution, Resolver, ResolverEntry};
use crate::schema::{load_schema, FieldValue, Schema};
use crate::vault::{vault_join, VaultConfig};

/// Uniform response envelope.
#[derive(Debug, serde::Serialize)]
pub struct Response<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub warnings: Vec<Diagnostic>,
    pub error: Option<ApiError>,
}

#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> Response<T> {
    pub fn success(data: T, warnings: Vec<Diagnostic>) -> Self {
        Response {
            ok: true,
            data: Some(data),
            warnings,
            error: None,
        }
    }

    pub fn failure(error: RavenError) -> Self {
        Response {
            ok: false,
            data: None,
            warnings: Vec::new(),
            error: Some(ApiError {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        }
    }

    pub fn from_result(result: Result<(T, Vec<Diagnostic>)>) -> Self {
        match result {
            Ok((data, warnings)) => Response::success(data, warnings),
            Err(e) => Response::failure(e),
        }
    }
}

/// Query payload: rows of exactly one kind.
#[derive(Debug, serde::Serialize)]
pub struct QueryPayload {
    pub kind: String,
    pub count: usize,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<ObjectRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Vec<TraitRow>>,
}

/// Raw file content plus the indexed metadata derived from it.
#[derive(Debug, serde::Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub objects: Vec<ObjectRow>,
}

#[derive(Debug, serde::Serialize)]
pub struct ReindexSummary {
    pub indexed_files: usize,
    pub removed_files: usize,
    pub unchanged_files: usize,
}

/// A vault opened for API access.
pub struct Raven {
    vault_path: PathBuf,
    schema: Schema,
    config: VaultConfig,
    db: Database,
    cancel: CancelToken,
}

impl Raven {
    /// Open a vault: loads schema.yaml and raven.yaml, opens the index.
    pub fn open(vault_path: &Path) -> Result<Self> {
        let schema = load_schema(vault_path)?;
        let config = VaultConfig::load(vault_path)?;
        let db = Database::open(vault_path)?;

        Ok(Raven {
            vault_path: vault_path.to_path_buf(),
            schema,
            config,
            db,
            cancel: CancelToken::new(),
        })
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Cancellation handle shared by long-running operations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run an RQL query. `today` anchors relative dates; pass `None`
    /// for the local calendar date.
    pub fn query(&self, text: &str, today: Option<NaiveDate>) -> Response<QueryPayload> {
        let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
        match run_query(&self.db, &self.schema, &self.config, text, today, self.cancel.clone()) {
            Ok(results) => {
                let kind = match results.kind {
                    QueryKind::Objects => "objects",
                    QueryKind::Traits => "traits",
                };
                let (objects, traits) = match results.rows {
                    QueryRows::Objects(rows) => (Some(rows), None),
                    QueryRows::Traits(rows) => (None, Some(rows)),
                };
                Response::success(
                    QueryPayload {
                        kind: kind.to_string(),
                        count: results.count,
                        elapsed_ms: results.elapsed_ms,
                        objects,
                        traits,
                    },
                    Vec::new(),
                )
            }
            Err(e) => Response::failure(e),
        }
    }

    /// Run a saved query from vault config with positional arguments.
    pub fn query_saved(
        &self,
        name: &str,
        args: &[String],
        today: Option<NaiveDate>,
    ) -> Response<QueryPayload> {
        let Some(saved) = self.config.queries.get(name) else {
            return Response::failure(RavenError::NotFound(format!("no saved query '{}'", name)));
        };
        match expand_saved_query(saved, args) {
            Ok(text) => self.query(&text, today),
            Err(e) => Response::failure(e),
        }
    }

    /// Read a file's raw bytes plus its indexed objects.
    pub fn read(&self, relative_path: &str) -> Response<FileContent> {
        let result = (|| {
            let absolute = vault_join(&self.vault_path, relative_path)?;
            let content = std::fs::read_to_string(&absolute)
                .map_err(|_| RavenError::NotFound(relative_path.to_string()))?;
            let objects = self.db.objects_in_file(relative_path)?;
            Ok((
                FileContent {
                    path: relative_path.to_string(),
                    content,
                    objects,
                },
                Vec::new(),
            ))
        })();
        Response::from_result(result)
    }

    /// Inbound references for a target, which may be any resolvable
    /// form (id, alias, short name, date).
    pub fn backlinks(&self, target: &str) -> Response<Vec<RefRow>> {
        let result = (|| {
            let resolver = self.build_resolver()?;
            let id = match resolver.resolve(target) {
                Resolution::Resolved(id) => id,
                Resolution::Ambiguous(candidates) => {
                    return Err(RavenError::NotUnique(format!(
                        "'{}' is ambiguous: {}",
                        target,
                        candidates.join(", ")
                    )))
                }
                Resolution::Missing => return Err(RavenError::NotFound(target.to_string())),
            };
            Ok((self.db.backlinks(&id)?, Vec::new()))
        })();
        Response::from_result(result)
    }

    /// The loaded schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Full-text search over file bodies.
    pub fn search(&self, text: &str, limit: usize) -> Response<Vec<SearchHit>> {
        Response::from_result(self.db.search(text, limit).map(|hits| (hits, Vec::new())))
    }

    pub fn stats(&self) -> Response<IndexStats> {
        Response::from_result(self.db.stats().map(|s| (s, Vec::new())))
    }

    /// Untyped file-level pages (still on the `page` fallback).
    pub fn untyped(&self) -> Response<Vec<String>> {
        Response::from_result(self.db.untyped_pages().map(|p| (p, Vec::new())))
    }

    /// Rebuild the index (incrementally or from scratch).
    pub fn reindex(&mut self, mode: ReindexMode) -> Response<ReindexSummary> {
        match reindex(
            &mut self.db,
            &self.vault_path,
            &self.schema,
            &self.config,
            mode,
            &self.cancel,
        ) {
            Ok(report) => Response::success(
                ReindexSummary {
                    indexed_files: report.indexed_files,
                    removed_files: report.removed_files,
                    unchanged_files: report.unchanged_files,
                },
                report.diagnostics,
            ),
            Err(e) => Response::failure(e),
        }
    }

    /// Aggregate every diagnostic across the vault. Runs against a
    /// scratch in-memory index so the on-disk store is untouched.
    pub fn check(&self, strict: bool) -> Response<Vec<Diagnostic>> {
        let result = (|| {
            let mut scratch = Database::open_in_memory()?;
            let report = reindex(
                &mut scratch,
                &self.vault_path,
                &self.schema,
                &self.config,
                ReindexMode::Full,
                &self.cancel,
            )?;
            let mut diagnostics = report.diagnostics;
            if strict {
                for d in diagnostics.iter_mut() {
                    d.severity = Severity::Error;
                }
            }
            Ok((diagnostics, Vec::new()))
        })();
        Response::from_result(result)
    }

    // --- Mutations ---

    pub fn create(
        &mut self,
        type_name: &str,
        title: &str,
        fields: &[(String, FieldValue)],
    ) -> Response<CreateResult> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.create(type_name, title, fields) {
            Ok((result, report)) => Response::success(result, report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    pub fn set(&mut self, id: &str, field: &str, value: &str) -> Response<()> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.set(id, field, value) {
            Ok(report) => Response::success((), report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    pub fn edit(&mut self, relative_path: &str, old_str: &str, new_str: &str) -> Response<()> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.edit(relative_path, old_str, new_str) {
            Ok(report) => Response::success((), report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    pub fn move_file(&mut self, from: &str, to: &str, update_refs: bool) -> Response<MoveResult> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.move_file(from, to, update_refs) {
            Ok((result, report)) => Response::success(result, report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    pub fn delete(&mut self, relative_path: &str) -> Response<DeleteSummary> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.delete(relative_path) {
            Ok((result, report)) => Response::success(DeleteSummary::from(result), report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    pub fn append(
        &mut self,
        relative_path: &str,
        text: &str,
        heading: Option<&str>,
    ) -> Response<AppendResult> {
        let mut m = Mutator::new(&self.vault_path, &self.schema, &self.config, &mut self.db);
        match m.append(relative_path, text, heading) {
            Ok((result, report)) => Response::success(result, report.diagnostics),
            Err(e) => Response::failure(e),
        }
    }

    fn build_resolver(&self) -> Result<Resolver> {
        let name_fields: std::collections::HashMap<&str, &str> = self.schema.name_fields().collect();
        let mut resolver = Resolver::new(
            self.config.daily_directory.clone(),
            self.config.directories.object.clone(),
            self.config.directories.page.clone(),
        );
        for row in self.db.all_objects()? {
            let name_value = name_fields
                .get(row.object_type.as_str())
                .and_then(|field| row.fields.get(*field))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            resolver.insert(ResolverEntry {
                id: row.id,
                alias: row.alias,
                name_value,
            });
        }
        Ok(resolver)
    }
}

/// Serializable form of a delete outcome.
#[derive(Debug, serde::Serialize)]
pub struct DeleteSummary {
    pub trashed_to: Option<String>,
    pub backlink_count: usize,
    pub backlinks: Vec<RefRow>,
}

impl From<DeleteResult> for DeleteSummary {
    fn from(result: DeleteResult) -> Self {
        DeleteSummary {
            trashed_to: result.trashed_to,
            backlink_count: result.backlinks.len(),
            backlinks: result.backlinks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vault() -> (tempfile::TempDir, Raven) {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("schema.yaml"),
            r#"
types:
  person:
    default_path: people
    name_field: name
    fields:
      name:
        type: string
        required: true
traits:
  due:
    value: date
"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("daily")).unwrap();
        std::fs::write(
            dir.path().join("daily/2026-02-10.md"),
            "- @due(2026-02-10) Call [[people/freya]]\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("people")).unwrap();
        std::fs::write(
            dir.path().join("people/freya.md"),
            "---\ntype: person\nname: Freya\nalias: The Queen\n---\n",
        )
        .unwrap();

        let mut raven = Raven::open(dir.path()).unwrap();
        let response = raven.reindex(ReindexMode::Full);
        assert!(response.ok);
        (dir, raven)
    }

    #[test]
    fn test_query_envelope() {
        let (_dir, raven) = vault();
        let response = raven.query(
            "trait:due value:today",
            Some(chrono::NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()),
        );

        assert!(response.ok);
        let payload = response.data.unwrap();
        assert_eq!(payload.kind, "traits");
        assert_eq!(payload.count, 1);
        assert_eq!(payload.traits.unwrap()[0].parent_id, "daily/2026-02-10");
    }

    #[test]
    fn test_query_error_has_stable_code() {
        let (_dir, raven) = vault();
        let response = raven.query("object:widget", None);

        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, "unknown_name");
    }

    #[test]
    fn test_backlinks_resolve_alias() {
        let (_dir, raven) = vault();
        let response = raven.backlinks("The Queen");

        assert!(response.ok);
        let links = response.data.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].file_path, "daily/2026-02-10.md");
    }

    #[test]
    fn test_round_trip_create_then_set() {
        let (_dir, mut raven) = vault();

        let created = raven.create(
            "person",
            "Loki",
            &[("name".to_string(), FieldValue::String("Loki".to_string()))],
        );
        assert!(created.ok);
        let id = created.data.unwrap().id;
        assert_eq!(id, "people/loki");

        let set = raven.set(&id, "name", "Loki Laufeyson");
        assert!(set.ok);

        let obj = raven.db.object_by_id(&id).unwrap().unwrap();
        assert_eq!(obj.fields.get("name").and_then(|v| v.as_str()), Some("Loki Laufeyson"));
    }

    #[test]
    fn test_check_leaves_index_untouched() {
        let (dir, raven) = vault();
        std::fs::write(dir.path().join("bad.md"), "- @nope(1) unknown trait\n").unwrap();

        let before = raven.db.stats().unwrap().file_count;
        let response = raven.check(false);
        assert!(response.ok);
        assert!(!response.data.unwrap().is_empty());
        assert_eq!(raven.db.stats().unwrap().file_count, before);
    }

    #[test]
    fn test_read_returns_content_and_objects() {
        let (_dir, raven) = vault();
        let response = raven.read("people/freya.md");

        assert!(response.ok);
        let file = response.data.unwrap();
        assert!(file.content.contains("alias: The Queen"));
        assert_eq!(file.objects[0].id, "people/freya");
    }
}
