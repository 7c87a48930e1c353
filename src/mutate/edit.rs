//! edit - surgical single-occurrence text replacement

use crate::error::{RavenError, Result};
use crate::index::ReindexReport;
use crate::vault::vault_join;

use super::Mutator;

pub fn edit(
    m: &mut Mutator<'_>,
    relative_path: &str,
    old_str: &str,
    new_str: &str,
) -> Result<ReindexReport> {
    if old_str.is_empty() {
        return Err(RavenError::NotUnique("old_str must not be empty".to_string()));
    }

    let absolute = vault_join(m.vault_path, relative_path)?;
    let content = std::fs::read_to_string(&absolute)
        .map_err(|_| RavenError::NotFound(relative_path.to_string()))?;

    let occurrences = content.matches(old_str).count();
    match occurrences {
        0 => {
            return Err(RavenError::NotFound(format!(
                "'{}' does not occur in {}",
                old_str, relative_path
            )))
        }
        1 => {}
        n => {
            return Err(RavenError::NotUnique(format!(
                "'{}' occurs {} times in {}; refusing to guess",
                old_str, n, relative_path
            )))
        }
    }

    let new_content = content.replacen(old_str, new_str, 1);
    super::write_atomic(&absolute, &new_content)?;
    log::info!("edited {}", relative_path);

    m.reindex_touched(&[relative_path.to_string()])
}
