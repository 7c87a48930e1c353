//! move - rename a file, optionally rewriting inbound references

use crate::error::{RavenError, Result};
use crate::index::ReindexReport;
use crate::parser::file_id_for_path;
use crate::vault::vault_join;

use super::Mutator;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MoveResult {
    pub old_id: String,
    pub new_id: String,
    /// Files whose references were rewritten.
    pub updated_files: Vec<String>,
}

pub fn move_file(
    m: &mut Mutator<'_>,
    from: &str,
    to: &str,
    update_refs: bool,
) -> Result<(MoveResult, ReindexReport)> {
    let from_abs = vault_join(m.vault_path, from)?;
    let to_abs = vault_join(m.vault_path, to)?;

    if m.config.is_protected(from) {
        return Err(RavenError::ProtectedPath(from.to_string()));
    }
    if m.config.is_protected(to) {
        return Err(RavenError::ProtectedPath(to.to_string()));
    }
    if !from_abs.is_file() {
        return Err(RavenError::NotFound(from.to_string()));
    }
    if to_abs.exists() {
        return Err(RavenError::Conflict(format!("destination exists: {}", to)));
    }

    let opts = m.config.parse_options();
    let old_id = file_id_for_path(from, &opts);
    let new_id = file_id_for_path(to, &opts);

    // Find referrers through the index before the rows churn.
    let mut updated_files = Vec::new();
    if update_refs {
        let moved_ids: Vec<String> = m
            .db
            .objects_in_file(from)?
            .into_iter()
            .map(|o| o.id)
            .collect();
        let referrers = m.db.files_referencing(&moved_ids)?;

        for referrer in referrers {
            if referrer == from {
                continue; // self-references keep working through the new id below
            }
            let abs = vault_join(m.vault_path, &referrer)?;
            let content = std::fs::read_to_string(&abs)?;
            let rewritten = rewrite_targets(&content, &old_id, &new_id);
            if rewritten != content {
                super::write_atomic(&abs, &rewritten)?;
                updated_files.push(referrer);
            }
        }
    }

    if let Some(parent) = to_abs.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&from_abs, &to_abs)?;
    log::info!("moved {} -> {}", from, to);

    let mut touched: Vec<String> = vec![from.to_string(), to.to_string()];
    touched.extend(updated_files.iter().cloned());
    let report = m.reindex_touched(&touched)?;

    Ok((
        MoveResult {
            old_id,
            new_id,
            updated_files,
        },
        report,
    ))
}

/// Rewrite `[[old]]`, `[[old|...]]`, and `[[old#...]]` to the new id.
fn rewrite_targets(content: &str, old_id: &str, new_id: &str) -> String {
    content
        .replace(&format!("[[{}]]", old_id), &format!("[[{}]]", new_id))
        .replace(&format!("[[{}|", old_id), &format!("[[{}|", new_id))
        .replace(&format!("[[{}#", old_id), &format!("[[{}#", new_id))
}
