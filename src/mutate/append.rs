//! append - add a text block to a file, optionally under a heading

use crate::error::{RavenError, Result};
use crate::index::ReindexReport;
use crate::vault::vault_join;

use super::Mutator;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AppendResult {
    /// 1-indexed line where the block landed.
    pub line: usize,
    /// Whether a missing heading was created.
    pub created_heading: bool,
}

pub fn append(
    m: &mut Mutator<'_>,
    relative_path: &str,
    text: &str,
    heading: Option<&str>,
) -> Result<(AppendResult, ReindexReport)> {
    let absolute = vault_join(m.vault_path, relative_path)?;
    let content = std::fs::read_to_string(&absolute)
        .map_err(|_| RavenError::NotFound(relative_path.to_string()))?;

    let block = text.trim_end();
    let (new_content, line, created_heading) = match heading {
        Some(heading) => append_under_heading(&content, heading, block),
        None => {
            let mut out = ensure_trailing_newline(&content);
            if !out.is_empty() {
                out.push('\n');
            }
            let line = out.lines().count() + 1;
            out.push_str(block);
            out.push('\n');
            (out, line, false)
        }
    };

    super::write_atomic(&absolute, &new_content)?;
    log::info!("appended to {}", relative_path);

    let report = m.reindex_touched(&[relative_path.to_string()])?;
    Ok((AppendResult { line, created_heading }, report))
}

/// Insert the block at the end of the named heading's span; a missing
/// heading is created at the end of the file at level 2.
fn append_under_heading(content: &str, heading: &str, block: &str) -> (String, usize, bool) {
    let lines: Vec<&str> = content.lines().collect();

    // Find the heading line and the start of the next heading of equal
    // or shallower level, which ends the target span.
    let mut target: Option<(usize, usize)> = None; // (heading idx, level)
    let mut span_end: Option<usize> = None;
    for (idx, line) in lines.iter().enumerate() {
        if let Some((level, text)) = parse_heading_line(line) {
            match target {
                None if text.eq_ignore_ascii_case(heading) => target = Some((idx, level)),
                Some((_, target_level)) if level <= target_level => {
                    span_end = Some(idx);
                    break;
                }
                _ => {}
            }
        }
    }

    match target {
        Some(_) => insert_block(&lines, span_end.unwrap_or(lines.len()), block),
        // No such heading: create one at the end, level 2.
        None => {
            let mut out = ensure_trailing_newline(content);
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n\n", heading));
            let line = out.lines().count() + 1;
            out.push_str(block);
            out.push('\n');
            (out, line, true)
        }
    }
}

fn insert_block(lines: &[&str], at: usize, block: &str) -> (String, usize, bool) {
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();

    // Back up over blank lines so the block sits inside the section.
    let mut insert_at = at;
    while insert_at > 0 && out[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }

    out.insert(insert_at, block.to_string());
    out.insert(insert_at, String::new());
    (out.join("\n") + "\n", insert_at + 2, false)
}

fn parse_heading_line(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Database;
    use crate::schema::Schema;
    use crate::vault::VaultConfig;
    use tempfile::tempdir;

    fn mutate(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("n.md"), content).unwrap();
        (dir, "n.md".to_string())
    }

    #[test]
    fn test_append_to_end() {
        let (dir, rel) = mutate("# Log\n\nfirst\n");
        let schema = Schema::default();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        let mut m = Mutator::new(dir.path(), &schema, &config, &mut db);

        m.append(&rel, "- appended line", None).unwrap();
        let content = std::fs::read_to_string(dir.path().join(&rel)).unwrap();
        assert!(content.ends_with("first\n\n- appended line\n"));
    }

    #[test]
    fn test_append_under_existing_heading() {
        let content = "# Log\n\n## Inbox\n\n- old item\n\n## Done\n\n- shipped\n";
        let (new_content, _, created) = append_under_heading(content, "Inbox", "- new item");

        assert!(!created);
        let inbox_pos = new_content.find("- new item").unwrap();
        let done_pos = new_content.find("## Done").unwrap();
        assert!(inbox_pos < done_pos, "block must land inside the Inbox span:\n{}", new_content);
    }

    #[test]
    fn test_append_creates_missing_heading_at_level_2() {
        let content = "# Log\n";
        let (new_content, _, created) = append_under_heading(content, "Inbox", "- item");

        assert!(created);
        assert!(new_content.contains("\n## Inbox\n\n- item\n"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let schema = Schema::default();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        let mut m = Mutator::new(dir.path(), &schema, &config, &mut db);

        assert_eq!(m.append("ghost.md", "x", None).unwrap_err().code(), "not_found");
    }
}

fn ensure_trailing_newline(content: &str) -> String {
    if content.is_empty() || content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{}\n", content)
    }
}
