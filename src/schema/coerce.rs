//! Schema-typed field conversion
//!
//! A pure function from `(raw YAML node, declared kind)` to a `FieldValue`
//! or a type error message. Ref fields accept both the bare id form
//! (`people/freya`) and the wiki form (`[[people/freya]]`); list fields
//! accept YAML sequences.

use super::{FieldKind, FieldValue};
use crate::dates;

/// Coerce a raw YAML node into the declared field kind.
pub fn coerce_value(raw: &serde_yaml::Value, kind: FieldKind) -> Result<FieldValue, String> {
    match kind {
        FieldKind::String => match raw {
            serde_yaml::Value::String(s) => Ok(FieldValue::String(s.clone())),
            serde_yaml::Value::Number(n) => Ok(FieldValue::String(n.to_string())),
            serde_yaml::Value::Bool(b) => Ok(FieldValue::String(b.to_string())),
            _ => Err("expected string".to_string()),
        },
        FieldKind::Number => match raw {
            serde_yaml::Value::Number(n) => Ok(FieldValue::Number(n.as_f64().unwrap_or(0.0))),
            serde_yaml::Value::String(s) => s
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| format!("expected number, got '{}'", s)),
            _ => Err("expected number".to_string()),
        },
        FieldKind::Bool => match raw {
            serde_yaml::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            serde_yaml::Value::String(s) => match s.as_str() {
                "true" => Ok(FieldValue::Bool(true)),
                "false" => Ok(FieldValue::Bool(false)),
                _ => Err(format!("expected boolean, got '{}'", s)),
            },
            _ => Err("expected boolean".to_string()),
        },
        FieldKind::Date => {
            let s = scalar_string(raw).ok_or("expected date")?;
            if dates::parse_iso_date(&s).is_some() {
                Ok(FieldValue::Date(s))
            } else {
                Err(format!("invalid date '{}', expected YYYY-MM-DD", s))
            }
        }
        FieldKind::Datetime => {
            let s = scalar_string(raw).ok_or("expected datetime")?;
            if dates::parse_iso_datetime_date(&s).is_some() {
                Ok(FieldValue::Datetime(s))
            } else {
                Err(format!("invalid datetime '{}'", s))
            }
        }
        FieldKind::Enum => match raw {
            serde_yaml::Value::String(s) => Ok(FieldValue::String(s.clone())),
            _ => Err("expected enum value (string)".to_string()),
        },
        FieldKind::Ref => {
            let s = scalar_string(raw).ok_or("expected reference")?;
            Ok(FieldValue::Ref(strip_wiki_brackets(&s)))
        }
        FieldKind::StringList => coerce_list(raw, FieldKind::String),
        FieldKind::NumberList => coerce_list(raw, FieldKind::Number),
        FieldKind::DateList => coerce_list(raw, FieldKind::Date),
        FieldKind::RefList => coerce_list(raw, FieldKind::Ref),
    }
}

fn coerce_list(raw: &serde_yaml::Value, item_kind: FieldKind) -> Result<FieldValue, String> {
    match raw {
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_value(item, item_kind)?);
            }
            Ok(FieldValue::List(out))
        }
        // A scalar is accepted as a one-element list.
        serde_yaml::Value::String(_) | serde_yaml::Value::Number(_) => {
            Ok(FieldValue::List(vec![coerce_value(raw, item_kind)?]))
        }
        _ => Err("expected list".to_string()),
    }
}

fn scalar_string(raw: &serde_yaml::Value) -> Option<String> {
    match raw {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `[[people/freya]]` -> `people/freya`; bare ids pass through.
pub fn strip_wiki_brackets(s: &str) -> String {
    let t = s.trim();
    if t.starts_with("[[") && t.ends_with("]]") && t.len() > 4 {
        t[2..t.len() - 2].to_string()
    } else {
        t.to_string()
    }
}

/// Best-effort conversion for fields with no schema declaration,
/// mirroring how untyped frontmatter values are indexed.
pub fn guess_value(raw: &serde_yaml::Value) -> FieldValue {
    match raw {
        serde_yaml::Value::String(s) => {
            if s.starts_with("[[") && s.ends_with("]]") && s.len() > 4 {
                FieldValue::Ref(s[2..s.len() - 2].to_string())
            } else if dates::parse_iso_date(s).is_some() {
                FieldValue::Date(s.clone())
            } else if dates::parse_iso_datetime_date(s).is_some() {
                FieldValue::Datetime(s.clone())
            } else {
                FieldValue::String(s.clone())
            }
        }
        serde_yaml::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
        serde_yaml::Value::Bool(b) => FieldValue::Bool(*b),
        serde_yaml::Value::Sequence(items) => FieldValue::List(items.iter().map(guess_value).collect()),
        _ => FieldValue::Null,
    }
}
