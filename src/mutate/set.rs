//! set - update one field on a file-level or embedded object

use crate::error::{RavenError, Result};
use crate::index::ReindexReport;
use crate::parser::parse_value;
use crate::schema::{FieldDefinition, FieldKind, FieldValue};
use crate::vault::vault_join;

use super::Mutator;

pub fn set(m: &mut Mutator<'_>, id: &str, field: &str, value: &str) -> Result<ReindexReport> {
    let obj = m
        .db
        .object_by_id(id)?
        .ok_or_else(|| RavenError::NotFound(format!("no object '{}'", id)))?;

    let type_def = m
        .schema
        .type_def(&obj.object_type)
        .ok_or_else(|| RavenError::UnknownName(format!("type '{}' is not defined", obj.object_type)))?;
    let def = type_def
        .fields
        .get(field)
        .ok_or_else(|| RavenError::UnknownName(format!(
            "'{}' is not a field of type '{}'",
            field, obj.object_type
        )))?;

    let coerced = coerce_input(value, def)
        .map_err(|msg| RavenError::Schema(format!("field '{}': {}", field, msg)))?;

    let absolute = vault_join(m.vault_path, &obj.file_path)?;
    let content = std::fs::read_to_string(&absolute)
        .map_err(|_| RavenError::NotFound(format!("file missing for '{}'", id)))?;

    let new_content = if obj.parent_id.is_none() {
        set_frontmatter_field(&content, field, &yaml_scalar(&coerced))
    } else {
        set_typedecl_field(&content, obj.line_start, field, &typedecl_scalar(&coerced))?
    };

    super::write_atomic(&absolute, &new_content)?;
    log::info!("set {}.{} = {}", id, field, value);

    m.reindex_touched(&[obj.file_path.clone()])
}

/// Parse and validate the string form of a field value against its
/// declaration.
fn coerce_input(value: &str, def: &FieldDefinition) -> std::result::Result<FieldValue, String> {
    let parsed = parse_value(value);

    match def.field_type {
        FieldKind::Date => match &parsed {
            FieldValue::Date(_) => Ok(parsed),
            _ => Err(format!("invalid date '{}', expected YYYY-MM-DD", value)),
        },
        FieldKind::Datetime => match &parsed {
            FieldValue::Datetime(_) => Ok(parsed),
            _ => Err(format!("invalid datetime '{}'", value)),
        },
        FieldKind::Number => match &parsed {
            FieldValue::Number(n) => {
                if def.min.map_or(false, |min| *n < min) {
                    return Err(format!("{} is below minimum {}", n, def.min.unwrap()));
                }
                if def.max.map_or(false, |max| *n > max) {
                    return Err(format!("{} is above maximum {}", n, def.max.unwrap()));
                }
                Ok(parsed)
            }
            _ => Err(format!("expected a number, got '{}'", value)),
        },
        FieldKind::Bool => match &parsed {
            FieldValue::Bool(_) => Ok(parsed),
            _ => Err(format!("expected true or false, got '{}'", value)),
        },
        FieldKind::Enum => {
            let allowed = def.values.as_deref().unwrap_or(&[]);
            if allowed.iter().any(|v| v == value) {
                Ok(FieldValue::String(value.to_string()))
            } else {
                Err(format!(
                    "'{}' is not one of: {}",
                    value,
                    allowed.join(", ")
                ))
            }
        }
        FieldKind::Ref => Ok(FieldValue::Ref(crate::schema::strip_wiki_brackets(value))),
        FieldKind::RefList => match parsed {
            FieldValue::List(items) => Ok(FieldValue::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        FieldValue::String(s) => FieldValue::Ref(s),
                        other => other,
                    })
                    .collect(),
            )),
            FieldValue::Ref(r) => Ok(FieldValue::List(vec![FieldValue::Ref(r)])),
            _ => Err(format!("expected a list of references, got '{}'", value)),
        },
        FieldKind::StringList | FieldKind::NumberList | FieldKind::DateList => match parsed {
            FieldValue::List(_) => Ok(parsed),
            other => Ok(FieldValue::List(vec![other])),
        },
        FieldKind::String => Ok(FieldValue::String(value.to_string())),
    }
}

fn yaml_scalar(value: &FieldValue) -> String {
    match value {
        FieldValue::Ref(r) => format!("\"[[{}]]\"", r),
        FieldValue::List(items) => {
            let parts: Vec<String> = items.iter().map(yaml_scalar).collect();
            format!("[{}]", parts.join(", "))
        }
        FieldValue::String(s) if s.contains(':') || s.starts_with('[') => format!("\"{}\"", s),
        other => other.to_display(),
    }
}

fn typedecl_scalar(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) if s.contains(',') || s.contains('(') || s.contains(')') => {
            format!("\"{}\"", s)
        }
        other => other.to_display(),
    }
}

/// Replace or insert a top-level key in the frontmatter block; files
/// without frontmatter grow one.
fn set_frontmatter_field(content: &str, field: &str, value: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();

    let close_idx = if lines.first().map(|l| l.trim_end()) == Some("---") {
        lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, line)| line.trim_end() == "---")
            .map(|(i, _)| i)
    } else {
        None
    };

    let Some(close_idx) = close_idx else {
        return format!("---\n{}: {}\n---\n\n{}", field, value, content);
    };

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let prefix = format!("{}:", field);
    for line in out[1..close_idx].iter_mut() {
        if line.starts_with(&prefix) {
            *line = format!("{}: {}", field, value);
            let mut text = out.join("\n");
            if content.ends_with('\n') {
                text.push('\n');
            }
            return text;
        }
    }

    out.insert(close_idx, format!("{}: {}", field, value));
    let mut text = out.join("\n");
    if content.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Rewrite the `::type(args...)` line belonging to the embedded object
/// whose heading starts at `heading_line`.
fn set_typedecl_field(
    content: &str,
    heading_line: usize,
    field: &str,
    value: &str,
) -> Result<String> {
    let lines: Vec<&str> = content.lines().collect();

    let decl_idx = (heading_line..heading_line + 2)
        .find(|&idx| {
            lines
                .get(idx)
                .map_or(false, |line| line.trim_start().starts_with("::"))
        })
        .ok_or_else(|| {
            RavenError::NotFound(format!("no ::type declaration after line {}", heading_line))
        })?;

    let rewritten = rewrite_typedecl_line(lines[decl_idx], field, value)?;

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    out[decl_idx] = rewritten;
    let mut text = out.join("\n");
    if content.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

fn rewrite_typedecl_line(line: &str, field: &str, value: &str) -> Result<String> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    let (head, inner) = match trimmed.find('(') {
        Some(open) => {
            let close = trimmed
                .rfind(')')
                .ok_or_else(|| RavenError::Schema(format!("malformed declaration: {}", trimmed)))?;
            (&trimmed[..open], &trimmed[open + 1..close])
        }
        None => (trimmed, ""),
    };

    // Split top-level args with quote/bracket awareness.
    let mut args: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ']' if !in_quotes => {
                depth -= 1;
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }

    let mut replaced = false;
    for arg in args.iter_mut() {
        let key = arg.split('=').next().unwrap_or("").trim();
        if key == field {
            *arg = format!("{}={}", field, value);
            replaced = true;
        }
    }
    if !replaced {
        args.push(format!("{}={}", field, value));
    }

    Ok(format!("{}{}({})", indent, head, args.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Database;
    use crate::schema::load_schema_str;
    use crate::vault::VaultConfig;
    use tempfile::tempdir;

    fn schema() -> crate::schema::Schema {
        load_schema_str(
            r#"
types:
  project:
    fields:
      status:
        type: enum
        values: [active, paused, done]
      effort:
        type: number
        min: 1
        max: 5
  meeting:
    fields:
      time:
        type: string
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_set_frontmatter_field_replaces() {
        let content = "---\ntype: project\nstatus: active\n---\n\n# P\n";
        let out = set_frontmatter_field(content, "status", "done");
        assert!(out.contains("status: done"));
        assert!(!out.contains("status: active"));
    }

    #[test]
    fn test_set_frontmatter_field_inserts() {
        let content = "---\ntype: project\n---\n";
        let out = set_frontmatter_field(content, "status", "done");
        assert_eq!(out, "---\ntype: project\nstatus: done\n---\n");
    }

    #[test]
    fn test_set_creates_frontmatter_when_absent() {
        let out = set_frontmatter_field("# Title\n", "status", "done");
        assert!(out.starts_with("---\nstatus: done\n---\n"));
    }

    #[test]
    fn test_rewrite_typedecl_line() {
        let out = rewrite_typedecl_line("::meeting(id=standup, time=09:00)", "time", "10:00").unwrap();
        assert_eq!(out, "::meeting(id=standup, time=10:00)");

        let out = rewrite_typedecl_line("::meeting(id=standup)", "time", "10:00").unwrap();
        assert_eq!(out, "::meeting(id=standup, time=10:00)");

        let out = rewrite_typedecl_line("::meeting", "time", "10:00").unwrap();
        assert_eq!(out, "::meeting(time=10:00)");
    }

    #[test]
    fn test_end_to_end_set_on_file_object() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        std::fs::write(
            dir.path().join("projects/a.md"),
            "---\ntype: project\nstatus: active\n---\n",
        )
        .unwrap();

        let schema = schema();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        let mut m = Mutator::new(dir.path(), &schema, &config, &mut db);
        m.reindex_touched(&["projects/a.md".to_string()]).unwrap();

        m.set("projects/a", "status", "done").unwrap();

        let obj = m.db.object_by_id("projects/a").unwrap().unwrap();
        assert_eq!(obj.fields.get("status").and_then(|v| v.as_str()), Some("done"));
    }

    #[test]
    fn test_set_rejects_bad_enum_and_range() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "---\ntype: project\n---\n").unwrap();

        let schema = schema();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        let mut m = Mutator::new(dir.path(), &schema, &config, &mut db);
        m.reindex_touched(&["a.md".to_string()]).unwrap();

        assert!(m.set("a", "status", "wip").is_err());
        assert!(m.set("a", "effort", "9").is_err());
        assert!(m.set("a", "effort", "3").is_ok());
    }

    #[test]
    fn test_set_on_embedded_object() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("n.md"),
            "# Notes\n\n## Standup\n::meeting(time=09:00)\n",
        )
        .unwrap();

        let schema = schema();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        let mut m = Mutator::new(dir.path(), &schema, &config, &mut db);
        m.reindex_touched(&["n.md".to_string()]).unwrap();

        m.set("n#standup", "time", "10:30").unwrap();

        let content = std::fs::read_to_string(dir.path().join("n.md")).unwrap();
        assert!(content.contains("::meeting(time=10:30)"));
        let obj = m.db.object_by_id("n#standup").unwrap().unwrap();
        assert_eq!(obj.fields.get("time").and_then(|v| v.as_str()), Some("10:30"));
    }
}
