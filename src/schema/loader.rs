//! Schema loader - parses schema.yaml

use std::path::Path;

use crate::error::{RavenError, Result};
use super::{Schema, BUILTIN_TYPES};

/// Load schema from a vault's schema.yaml file.
///
/// A missing file yields the default schema (built-ins only). A schema
/// that redefines a built-in type fails to load.
pub fn load_schema(vault_path: &Path) -> Result<Schema> {
    let schema_path = vault_path.join("schema.yaml");

    if !schema_path.exists() {
        return Ok(Schema::default());
    }

    let contents = std::fs::read_to_string(&schema_path)?;
    load_schema_str(&contents)
}

/// Parse schema text; split out so tests need no filesystem.
pub fn load_schema_str(contents: &str) -> Result<Schema> {
    let mut schema: Schema = serde_yaml::from_str(contents)
        .map_err(|e| RavenError::Schema(format!("failed to parse schema.yaml: {}", e)))?;

    for builtin in BUILTIN_TYPES {
        if schema.types.contains_key(*builtin) {
            return Err(RavenError::Schema(format!(
                "type '{}' is built-in and cannot be redefined",
                builtin
            )));
        }
    }

    // Enum kinds must declare their values up front.
    for (name, def) in &schema.traits {
        if def.kind == super::ValueKind::Enum && def.values.as_ref().map_or(true, |v| v.is_empty()) {
            return Err(RavenError::Schema(format!(
                "trait '{}' is an enum but declares no values",
                name
            )));
        }
    }
    for (type_name, type_def) in &schema.types {
        for (field_name, field_def) in &type_def.fields {
            if field_def.field_type == super::FieldKind::Enum
                && field_def.values.as_ref().map_or(true, |v| v.is_empty())
            {
                return Err(RavenError::Schema(format!(
                    "field '{}.{}' is an enum but declares no values",
                    type_name, field_name
                )));
            }
        }
        if let Some(name_field) = &type_def.name_field {
            if !type_def.fields.contains_key(name_field) {
                return Err(RavenError::Schema(format!(
                    "type '{}' declares name_field '{}' which is not a field",
                    type_name, name_field
                )));
            }
        }
    }

    schema.install_builtins();
    Ok(schema)
}

/// Create a default schema.yaml file
pub fn create_default_schema(vault_path: &Path) -> Result<()> {
    let schema_path = vault_path.join("schema.yaml");

    let default_schema = r#"# Raven Schema Configuration
# Define your types and traits here

types:
  person:
    default_path: people
    name_field: name
    fields:
      name:
        type: string
        required: true
      email:
        type: string

  project:
    default_path: projects
    fields:
      status:
        type: enum
        values: [active, paused, done]
        default: active
      owner:
        type: ref
        target: person

  meeting:
    fields:
      time:
        type: string
      attendees:
        type: ref[]
        target: person

traits:
  due:
    value: date

  done:
    value: boolean

  priority:
    value: enum
    values: [low, medium, high]

  remind:
    value: datetime

  highlight:
    value: string
"#;

    std::fs::write(&schema_path, default_schema)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_default_schema() {
        let dir = tempdir().unwrap();
        let schema = load_schema(dir.path()).unwrap();

        assert!(schema.types.contains_key("page"));
        assert!(schema.types.contains_key("section"));
    }

    #[test]
    fn test_load_custom_schema() {
        let dir = tempdir().unwrap();
        let schema_content = r#"
types:
  person:
    name_field: name
    fields:
      name:
        type: string
        required: true
traits:
  due:
    value: date
"#;
        std::fs::write(dir.path().join("schema.yaml"), schema_content).unwrap();

        let schema = load_schema(dir.path()).unwrap();

        assert!(schema.types.contains_key("person"));
        assert!(schema.types.contains_key("page")); // Built-ins added
        assert!(schema.traits.contains_key("due"));
        assert_eq!(
            schema.name_fields().collect::<Vec<_>>(),
            vec![("person", "name")]
        );
    }

    #[test]
    fn test_builtin_redefinition_rejected() {
        let err = load_schema_str("types:\n  section:\n    fields: {}\n").unwrap_err();
        assert!(err.to_string().contains("built-in"));
    }

    #[test]
    fn test_enum_without_values_rejected() {
        let err = load_schema_str("traits:\n  priority:\n    value: enum\n").unwrap_err();
        assert!(err.to_string().contains("declares no values"));
    }

    #[test]
    fn test_default_schema_roundtrips() {
        let dir = tempdir().unwrap();
        create_default_schema(dir.path()).unwrap();
        let schema = load_schema(dir.path()).unwrap();

        assert!(schema.types.contains_key("person"));
        assert!(schema.traits.contains_key("due"));
        assert_eq!(schema.type_def("person").unwrap().name_field.as_deref(), Some("name"));
    }
}
