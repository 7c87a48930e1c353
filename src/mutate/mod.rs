//! Structured mutations: create, set, edit, move, delete, append
//!
//! Every operation modifies files through atomic writes, then triggers
//! an incremental reindex of the touched files before returning, so a
//! caller's next query observes its own write.

mod append;
mod atomic;
mod create;
mod delete;
mod edit;
mod mv;
mod set;

pub use append::AppendResult;
pub use create::CreateResult;
pub use delete::DeleteResult;
pub use mv::MoveResult;

pub(crate) use atomic::write_atomic;

use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::index::{reindex_paths, Database, ReindexReport};
use crate::schema::{FieldValue, Schema};
use crate::vault::VaultConfig;

/// Shared context for all mutation operations.
pub struct Mutator<'a> {
    pub vault_path: &'a Path,
    pub schema: &'a Schema,
    pub config: &'a VaultConfig,
    pub db: &'a mut Database,
    pub cancel: CancelToken,
}

impl<'a> Mutator<'a> {
    pub fn new(
        vault_path: &'a Path,
        schema: &'a Schema,
        config: &'a VaultConfig,
        db: &'a mut Database,
    ) -> Self {
        Mutator {
            vault_path,
            schema,
            config,
            db,
            cancel: CancelToken::new(),
        }
    }

    /// Create a new typed object from the schema's template.
    pub fn create(
        &mut self,
        type_name: &str,
        title: &str,
        fields: &[(String, FieldValue)],
    ) -> Result<(CreateResult, ReindexReport)> {
        create::create(self, type_name, title, fields)
    }

    /// Update a field on a file-level or embedded object.
    pub fn set(&mut self, id: &str, field: &str, value: &str) -> Result<ReindexReport> {
        set::set(self, id, field, value)
    }

    /// Replace exactly one occurrence of `old_str` in a file.
    pub fn edit(&mut self, relative_path: &str, old_str: &str, new_str: &str) -> Result<ReindexReport> {
        edit::edit(self, relative_path, old_str, new_str)
    }

    /// Rename a file, optionally rewriting inbound references.
    pub fn move_file(
        &mut self,
        from: &str,
        to: &str,
        update_refs: bool,
    ) -> Result<(MoveResult, ReindexReport)> {
        mv::move_file(self, from, to, update_refs)
    }

    /// Delete a file (to the trash prefix, or permanently).
    pub fn delete(&mut self, relative_path: &str) -> Result<(DeleteResult, ReindexReport)> {
        delete::delete(self, relative_path)
    }

    /// Append a text block, optionally under a named heading.
    pub fn append(
        &mut self,
        relative_path: &str,
        text: &str,
        heading: Option<&str>,
    ) -> Result<(AppendResult, ReindexReport)> {
        append::append(self, relative_path, text, heading)
    }

    /// Incrementally reindex the files an operation touched.
    pub(crate) fn reindex_touched(&mut self, touched: &[String]) -> Result<ReindexReport> {
        reindex_paths(
            self.db,
            self.vault_path,
            self.schema,
            self.config,
            touched,
            &self.cancel,
        )
    }
}
