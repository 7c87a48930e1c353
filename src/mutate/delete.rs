//! delete - move a file to the trash prefix, or unlink it

use crate::error::{RavenError, Result};
use crate::index::{RefRow, ReindexReport};
use crate::vault::{vault_join, DeletionMode};

use super::Mutator;

#[derive(Debug)]
pub struct DeleteResult {
    /// Where the file went, vault-relative (None when unlinked).
    pub trashed_to: Option<String>,
    /// Inbound references that now dangle; surfaced as a warning, never
    /// rewritten automatically.
    pub backlinks: Vec<RefRow>,
}

pub fn delete(m: &mut Mutator<'_>, relative_path: &str) -> Result<(DeleteResult, ReindexReport)> {
    if m.config.is_protected(relative_path) {
        return Err(RavenError::ProtectedPath(relative_path.to_string()));
    }

    let absolute = vault_join(m.vault_path, relative_path)?;
    if !absolute.is_file() {
        return Err(RavenError::NotFound(relative_path.to_string()));
    }

    // Collect inbound refs before the rows are purged.
    let mut backlinks = Vec::new();
    for obj in m.db.objects_in_file(relative_path)? {
        backlinks.extend(m.db.backlinks(&obj.id)?);
    }
    backlinks.retain(|r| r.file_path != relative_path);

    let trashed_to = match m.config.deletion.mode {
        DeletionMode::Permanent => {
            std::fs::remove_file(&absolute)?;
            None
        }
        DeletionMode::Trash => {
            let file_name = absolute
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "file.md".to_string());
            let trash_rel = trash_slot(m, &file_name)?;
            let trash_abs = vault_join(m.vault_path, &trash_rel)?;
            if let Some(parent) = trash_abs.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&absolute, &trash_abs)?;
            Some(trash_rel)
        }
    };
    log::info!("deleted {} ({} backlink(s) now dangle)", relative_path, backlinks.len());

    let report = m.reindex_touched(&[relative_path.to_string()])?;

    Ok((DeleteResult { trashed_to, backlinks }, report))
}

/// First free trash path for a filename; collisions get `-2`, `-3`, ...
fn trash_slot(m: &Mutator<'_>, file_name: &str) -> Result<String> {
    let trash_dir = m.config.deletion.trash_dir.trim_end_matches('/');
    let candidate = format!("{}/{}", trash_dir, file_name);
    if !vault_join(m.vault_path, &candidate)?.exists() {
        return Ok(candidate);
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (file_name, String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}/{}-{}{}", trash_dir, stem, n, ext);
        if !vault_join(m.vault_path, &candidate)?.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}
