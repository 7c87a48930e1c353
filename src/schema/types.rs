//! Schema type definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Types that ship with the engine and cannot be redefined by a vault.
pub const BUILTIN_TYPES: &[&str] = &["page", "section", "date"];

/// The complete schema definition loaded from schema.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub types: HashMap<String, TypeDefinition>,

    #[serde(default)]
    pub traits: HashMap<String, TraitDefinition>,
}

impl Default for Schema {
    fn default() -> Self {
        let mut schema = Schema {
            types: HashMap::new(),
            traits: HashMap::new(),
        };
        schema.install_builtins();
        schema
    }
}

impl Schema {
    /// Insert the locked built-in types (`page`, `section`, `date`).
    pub fn install_builtins(&mut self) {
        self.types.entry("page".to_string()).or_default();

        let mut section = TypeDefinition::default();
        section.fields.insert("title".to_string(), FieldDefinition::of(FieldKind::String));
        section.fields.insert("level".to_string(), FieldDefinition::of(FieldKind::Number));
        self.types.insert("section".to_string(), section);

        let mut date = TypeDefinition::default();
        date.fields.insert("date".to_string(), FieldDefinition::of(FieldKind::Date));
        self.types.insert("date".to_string(), date);
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn trait_def(&self, name: &str) -> Option<&TraitDefinition> {
        self.traits.get(name)
    }

    pub fn is_builtin_type(name: &str) -> bool {
        BUILTIN_TYPES.contains(&name)
    }

    /// Names of all declared traits, used by the parser's name registry.
    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.traits.keys().map(|s| s.as_str())
    }

    /// Types declaring `name_field`, for resolver precedence level 2.
    pub fn name_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types
            .iter()
            .filter_map(|(t, def)| def.name_field.as_deref().map(|f| (t.as_str(), f)))
    }
}

/// Definition of a type (person, meeting, project, etc.)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDefinition {
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,

    /// Directory new objects of this type are created under.
    #[serde(default)]
    pub default_path: Option<String>,

    /// Field whose value acts as a referenceable name for resolution.
    #[serde(default)]
    pub name_field: Option<String>,
}

/// Definition of a trait (@due, @priority, @highlight, etc.)
///
/// A trait carries a single value of the declared kind; the bare form
/// `@name` records the literal string "true".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitDefinition {
    #[serde(default = "default_trait_kind", rename = "value")]
    pub kind: ValueKind,

    #[serde(default)]
    pub required: bool,

    /// For enum kinds: allowed values
    #[serde(default)]
    pub values: Option<Vec<String>>,

    /// For ref kinds: target type name
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,
}

impl Default for TraitDefinition {
    fn default() -> Self {
        TraitDefinition {
            kind: ValueKind::String,
            required: false,
            values: None,
            target: None,
            min: None,
            max: None,
        }
    }
}

fn default_trait_kind() -> ValueKind {
    ValueKind::String
}

/// Value kinds a trait can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Date,
    Datetime,
    Enum,
    Number,
    Boolean,
    Ref,
    #[serde(rename = "ref[]")]
    RefList,
}

/// Definition of a field within a type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldKind,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<serde_json::Value>,

    /// For enum types: allowed values
    #[serde(default)]
    pub values: Option<Vec<String>>,

    /// For ref types: target type name
    #[serde(default)]
    pub target: Option<String>,

    /// For number types: minimum value
    #[serde(default)]
    pub min: Option<f64>,

    /// For number types: maximum value
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldDefinition {
    pub fn of(field_type: FieldKind) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            default: None,
            values: None,
            target: None,
            min: None,
            max: None,
        }
    }
}

/// Field types supported by the schema
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    #[serde(rename = "string[]")]
    StringList,
    Number,
    #[serde(rename = "number[]")]
    NumberList,
    Date,
    #[serde(rename = "date[]")]
    DateList,
    Datetime,
    Enum,
    #[serde(rename = "bool", alias = "boolean")]
    Bool,
    Ref,
    #[serde(rename = "ref[]")]
    RefList,
}

impl FieldKind {
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            FieldKind::StringList | FieldKind::NumberList | FieldKind::DateList | FieldKind::RefList
        )
    }
}

/// A parsed field value
///
/// The closed set of value shapes; the schema coercion function maps raw
/// YAML nodes into exactly one of these branches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Bool(bool),
    Date(String),     // ISO 8601 date string
    Datetime(String), // ISO 8601 datetime string
    Ref(String),      // Reference target ID
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            FieldValue::Date(s) => Some(s),
            FieldValue::Datetime(s) => Some(s),
            FieldValue::Ref(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render as the display string used in `::type(...)` lines and
    /// trait values.
    pub fn to_display(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Date(s) | FieldValue::Datetime(s) => s.clone(),
            FieldValue::Ref(r) => format!("[[{}]]", r),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_display()).collect();
                format!("[{}]", parts.join(", "))
            }
            FieldValue::Null => String::new(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_installed() {
        let schema = Schema::default();
        assert!(schema.types.contains_key("page"));
        assert!(schema.types.contains_key("section"));
        assert!(schema.types.contains_key("date"));
        assert!(Schema::is_builtin_type("section"));
        assert!(!Schema::is_builtin_type("meeting"));
    }

    #[test]
    fn test_trait_definition_yaml_shape() {
        let yaml = r#"
value: enum
values: [low, medium, high]
"#;
        let def: TraitDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.kind, ValueKind::Enum);
        assert_eq!(
            def.values.as_deref(),
            Some(&["low".to_string(), "medium".to_string(), "high".to_string()][..])
        );
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Ref("people/freya".into()).to_display(), "[[people/freya]]");
        assert_eq!(FieldValue::Number(3.0).to_display(), "3");
        assert_eq!(
            FieldValue::List(vec![FieldValue::Ref("a".into()), FieldValue::Ref("b".into())]).to_display(),
            "[[[a]], [[b]]]"
        );
    }
}
