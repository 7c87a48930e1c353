//! Type declaration parser - parses ::type(args...) lines

use regex::Regex;
use std::collections::BTreeMap;

use crate::dates;
use crate::schema::FieldValue;

lazy_static::lazy_static! {
    // Leading ::typename; the argument list is scanned by hand so quoted
    // parens and nested brackets survive.
    static ref TYPE_NAME_REGEX: Regex = Regex::new(r"^::([A-Za-z_][\w-]*)").unwrap();
}

/// A parsed type declaration
#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    /// The type name (e.g., "meeting")
    pub type_name: String,

    /// Explicit fragment from an `id=` argument
    pub id: Option<String>,

    /// Other field values, in declaration order
    pub fields: BTreeMap<String, FieldValue>,

    /// Line number where the declaration appears
    pub line: usize,
}

/// Parse a type declaration from a line.
///
/// Returns `Ok(None)` when the line is not a declaration at all, and
/// `Err(message)` when it starts like one but is malformed (the caller
/// records a `malformed_typedecl` diagnostic and moves on).
pub fn parse_type_declaration(line: &str, line_number: usize) -> Result<Option<TypeDeclaration>, String> {
    let trimmed = line.trim();

    if !trimmed.starts_with("::") {
        return Ok(None);
    }

    let caps = match TYPE_NAME_REGEX.captures(trimmed) {
        Some(c) => c,
        None => return Err(format!("invalid type declaration: {}", trimmed)),
    };

    let type_name = caps.get(1).unwrap().as_str().to_string();
    let rest = trimmed[caps.get(0).unwrap().end()..].trim_start();

    let mut fields = BTreeMap::new();

    if !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(format!("expected '(' after ::{}", type_name));
        }
        let inner = match matching_paren(rest) {
            Some(end) => &rest[1..end],
            None => return Err(format!("unclosed argument list after ::{}", type_name)),
        };
        let after = rest[inner.len() + 2..].trim();
        if !after.is_empty() {
            return Err(format!("trailing text after ::{}(...)", type_name));
        }
        fields = parse_arguments(inner)?;
    }

    let id = fields.remove("id").and_then(|v| v.as_str().map(|s| s.to_string()));

    Ok(Some(TypeDeclaration {
        type_name,
        id,
        fields,
        line: line_number,
    }))
}

/// Byte index of the `)` matching the `(` at index 0, honouring quotes
/// and square-bracket nesting.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut bracket_depth = 0i32;
    let mut in_quotes = false;

    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => bracket_depth += 1,
            ']' if !in_quotes => bracket_depth -= 1,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && bracket_depth == 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse comma-separated key=value arguments
fn parse_arguments(args: &str) -> Result<BTreeMap<String, FieldValue>, String> {
    let mut fields = BTreeMap::new();

    if args.trim().is_empty() {
        return Ok(fields);
    }

    // State machine with quote and bracket awareness, so values like
    // [[[a]], [[b]]] and "a, b" keep their commas.
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_key = true;
    let mut in_quotes = false;
    let mut bracket_depth = 0i32;

    for c in args.chars() {
        match c {
            '"' if bracket_depth == 0 => {
                in_quotes = !in_quotes;
                current_value.push(c);
            }
            '[' if !in_quotes => {
                bracket_depth += 1;
                current_value.push(c);
            }
            ']' if !in_quotes => {
                bracket_depth -= 1;
                current_value.push(c);
            }
            '=' if !in_quotes && bracket_depth == 0 && in_key => {
                in_key = false;
            }
            ',' if !in_quotes && bracket_depth == 0 => {
                let key = current_key.trim().to_string();
                if key.is_empty() {
                    return Err("argument with empty key".to_string());
                }
                if in_key {
                    return Err(format!("argument '{}' has no value", key));
                }
                fields.insert(key, parse_value(current_value.trim()));
                current_key.clear();
                current_value.clear();
                in_key = true;
            }
            _ => {
                if in_key {
                    current_key.push(c);
                } else {
                    current_value.push(c);
                }
            }
        }
    }

    if in_quotes {
        return Err("unterminated string in argument list".to_string());
    }
    if bracket_depth != 0 {
        return Err("unbalanced brackets in argument list".to_string());
    }

    let key = current_key.trim().to_string();
    if !key.is_empty() {
        if in_key {
            return Err(format!("argument '{}' has no value", key));
        }
        fields.insert(key, parse_value(current_value.trim()));
    }

    Ok(fields)
}

/// Parse a single argument value into the closed value set.
pub fn parse_value(s: &str) -> FieldValue {
    let s = s.trim();

    if s.is_empty() {
        return FieldValue::Null;
    }

    // Single reference [[...]]. A triple bracket opens a ref list, not a
    // nested reference.
    if s.starts_with("[[") && !s.starts_with("[[[") && s.ends_with("]]") {
        return FieldValue::Ref(s[2..s.len() - 2].to_string());
    }

    // List (including ref lists like [[[a]], [[b]]])
    if s.starts_with('[') && s.ends_with(']') {
        let inner = &s[1..s.len() - 1];
        return FieldValue::List(parse_list_items(inner));
    }

    // Quoted string
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return FieldValue::String(s[1..s.len() - 1].to_string());
    }

    // Boolean
    if s == "true" {
        return FieldValue::Bool(true);
    }
    if s == "false" {
        return FieldValue::Bool(false);
    }

    // Number
    if let Ok(n) = s.parse::<f64>() {
        return FieldValue::Number(n);
    }

    // Date / datetime
    if dates::parse_iso_date(s).is_some() {
        return FieldValue::Date(s.to_string());
    }
    if dates::parse_iso_datetime_date(s).is_some() {
        return FieldValue::Datetime(s.to_string());
    }

    // Bare token
    FieldValue::String(s.to_string())
}

/// Parse list items, handling nested references
fn parse_list_items(s: &str) -> Vec<FieldValue> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut bracket_depth = 0i32;
    let mut in_quotes = false;

    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' if !in_quotes => {
                bracket_depth += 1;
                current.push(c);
            }
            ']' if !in_quotes => {
                bracket_depth -= 1;
                current.push(c);
            }
            ',' if !in_quotes && bracket_depth == 0 => {
                let item = parse_value(current.trim());
                if !matches!(item, FieldValue::Null) {
                    items.push(item);
                }
                current.clear();
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.trim().is_empty() {
        let item = parse_value(current.trim());
        if !matches!(item, FieldValue::Null) {
            items.push(item);
        }
    }

    items
}
