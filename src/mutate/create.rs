//! create - render a new typed object file

use crate::error::{RavenError, Result};
use crate::index::ReindexReport;
use crate::parser::file_id_for_path;
use crate::schema::FieldValue;
use crate::slug::slugify;
use crate::vault::vault_join;

use super::Mutator;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CreateResult {
    pub id: String,
    pub path: String,
}

pub fn create(
    m: &mut Mutator<'_>,
    type_name: &str,
    title: &str,
    fields: &[(String, FieldValue)],
) -> Result<(CreateResult, ReindexReport)> {
    let type_def = m
        .schema
        .type_def(type_name)
        .ok_or_else(|| RavenError::UnknownName(format!("type '{}' is not defined", type_name)))?;

    // Merge provided fields over schema defaults, then enforce required.
    let mut rendered: Vec<(String, FieldValue)> = Vec::new();
    for (name, value) in fields {
        if !type_def.fields.contains_key(name) && name != "tags" {
            return Err(RavenError::UnknownName(format!(
                "'{}' is not a field of type '{}'",
                name, type_name
            )));
        }
        rendered.push((name.clone(), value.clone()));
    }
    for (name, def) in &type_def.fields {
        if rendered.iter().any(|(n, _)| n == name) {
            continue;
        }
        if let Some(default) = &def.default {
            rendered.push((name.clone(), json_default(default)));
        }
    }
    rendered.sort_by(|a, b| a.0.cmp(&b.0));

    let missing: Vec<String> = type_def
        .fields
        .iter()
        .filter(|(name, def)| def.required && !rendered.iter().any(|(n, _)| n == *name))
        .map(|(name, _)| name.clone())
        .collect();
    if !missing.is_empty() {
        let mut missing = missing;
        missing.sort();
        return Err(RavenError::MissingFields(missing));
    }

    // Placement: the type's default_path, else the object root, else
    // the vault root.
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(RavenError::Conflict(format!("title '{}' produces an empty filename", title)));
    }
    let dir = type_def
        .default_path
        .clone()
        .or_else(|| m.config.directories.object.clone());
    let relative = match dir {
        Some(dir) => format!("{}/{}.md", dir.trim_end_matches('/'), slug),
        None => format!("{}.md", slug),
    };

    let absolute = vault_join(m.vault_path, &relative)?;
    if absolute.exists() {
        return Err(RavenError::Conflict(format!("file already exists: {}", relative)));
    }

    let mut content = String::from("---\n");
    content.push_str(&format!("type: {}\n", type_name));
    for (name, value) in &rendered {
        content.push_str(&format!("{}: {}\n", name, yaml_value(value)));
    }
    content.push_str("---\n\n");
    content.push_str(&format!("# {}\n", title));

    super::write_atomic(&absolute, &content)?;
    log::info!("created {}", relative);

    let id = file_id_for_path(&relative, &m.config.parse_options());
    let report = m.reindex_touched(&[relative.clone()])?;

    Ok((CreateResult { id, path: relative }, report))
}

fn json_default(value: &serde_json::Value) -> FieldValue {
    match value {
        serde_json::Value::String(s) => FieldValue::String(s.clone()),
        serde_json::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Bool(b) => FieldValue::Bool(*b),
        serde_json::Value::Array(items) => FieldValue::List(items.iter().map(json_default).collect()),
        _ => FieldValue::Null,
    }
}

/// Render a field value as a YAML scalar for frontmatter.
fn yaml_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Ref(r) => format!("\"[[{}]]\"", r),
        FieldValue::List(items) => {
            let parts: Vec<String> = items.iter().map(yaml_value).collect();
            format!("[{}]", parts.join(", "))
        }
        FieldValue::String(s) if s.contains(':') || s.starts_with('[') => format!("\"{}\"", s),
        other => other.to_display(),
    }
}
