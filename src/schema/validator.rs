//! Schema validator - checks parsed documents against the schema
//!
//! The validator only collects diagnostics; fatality is the caller's
//! policy (`--strict` promotes warnings).

use crate::dates;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::parser::{ParsedDocument, ParsedObject, ParsedTrait};

use super::{FieldKind, FieldValue, Schema, TraitDefinition, ValueKind};

/// Frontmatter keys that are always legal regardless of schema.
const ALWAYS_ALLOWED_FIELDS: &[&str] = &["tags"];

/// Validate a document's objects and traits against the schema.
pub fn validate_document(doc: &ParsedDocument, schema: &Schema) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for obj in &doc.objects {
        validate_object(obj, doc, schema, &mut out);
    }

    for t in &doc.traits {
        validate_trait(t, doc, schema, &mut out);
    }

    // A trait declared required must appear somewhere in the document.
    for (name, def) in &schema.traits {
        if def.required && !doc.traits.iter().any(|t| &t.name == name) {
            out.push(Diagnostic::new(
                DiagnosticKind::MissingRequiredTrait,
                &doc.file_path,
                None,
                format!("required trait '@{}' does not appear in this file", name),
            ));
        }
    }

    out
}

/// Validate resolved ref-typed fields once target types are known.
///
/// `type_of` looks an object id up in the (in-progress) index; refs to
/// missing objects are reported separately by the resolver, so only
/// present-but-mistyped targets are flagged here.
pub fn validate_ref_targets(
    doc: &ParsedDocument,
    schema: &Schema,
    type_of: &dyn Fn(&str) -> Option<String>,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for obj in &doc.objects {
        let Some(type_def) = schema.type_def(&obj.object_type) else { continue };
        for (field_name, def) in &type_def.fields {
            let Some(expected) = def.target.as_deref() else { continue };
            let Some(value) = obj.fields.get(field_name) else { continue };

            for target in ref_targets(value) {
                if let Some(actual) = type_of(&target) {
                    if actual != expected {
                        out.push(Diagnostic::new(
                            DiagnosticKind::WrongRefTargetType,
                            &doc.file_path,
                            Some(obj.line_start),
                            format!(
                                "field '{}' expects a {} but [[{}]] is a {}",
                                field_name, expected, target, actual
                            ),
                        ));
                    }
                }
            }
        }
    }

    out
}

fn ref_targets(value: &FieldValue) -> Vec<String> {
    match value {
        FieldValue::Ref(r) => vec![r.clone()],
        FieldValue::List(items) => items.iter().flat_map(ref_targets).collect(),
        _ => Vec::new(),
    }
}

fn validate_object(obj: &ParsedObject, doc: &ParsedDocument, schema: &Schema, out: &mut Vec<Diagnostic>) {
    let Some(type_def) = schema.type_def(&obj.object_type) else {
        out.push(Diagnostic::new(
            DiagnosticKind::UnknownType,
            &doc.file_path,
            Some(obj.line_start),
            format!("unknown type '{}'", obj.object_type),
        ));
        return;
    };

    // Required fields (a declared default satisfies the requirement).
    for (name, def) in &type_def.fields {
        if def.required && def.default.is_none() && !obj.fields.contains_key(name) {
            out.push(Diagnostic::new(
                DiagnosticKind::MissingRequiredField,
                &doc.file_path,
                Some(obj.line_start),
                format!("required field '{}' is missing on {}", name, obj.id),
            ));
        }
    }

    for (name, value) in &obj.fields {
        let Some(def) = type_def.fields.get(name) else {
            if ALWAYS_ALLOWED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let kind = if obj.heading.is_none() {
                DiagnosticKind::UnknownFrontmatterKey
            } else {
                DiagnosticKind::UnknownField
            };
            let mut d = Diagnostic::new(
                kind,
                &doc.file_path,
                Some(obj.line_start),
                format!("'{}' is not a field of type '{}'", name, obj.object_type),
            );
            // Unknown args on an embedded typedecl are schema errors;
            // stray frontmatter keys are only warnings.
            if kind == DiagnosticKind::UnknownFrontmatterKey {
                d.severity = crate::error::Severity::Warning;
            }
            out.push(d);
            continue;
        };

        match def.field_type {
            FieldKind::Enum => {
                let allowed = def.values.as_deref().unwrap_or(&[]);
                let ok = value.as_str().map_or(false, |s| allowed.iter().any(|v| v == s));
                if !ok {
                    out.push(Diagnostic::new(
                        DiagnosticKind::InvalidEnumValue,
                        &doc.file_path,
                        Some(obj.line_start),
                        format!(
                            "'{}' is not a valid value for '{}' (expected one of: {})",
                            value.to_display(),
                            name,
                            allowed.join(", ")
                        ),
                    ));
                }
            }
            FieldKind::Number => {
                if let Some(n) = value.as_f64() {
                    check_range(n, def.min, def.max, name, doc, obj.line_start, out);
                }
            }
            _ => {}
        }
    }
}

fn validate_trait(t: &ParsedTrait, doc: &ParsedDocument, schema: &Schema, out: &mut Vec<Diagnostic>) {
    let Some(def) = schema.trait_def(&t.name) else {
        // Inline traits were already filtered by the parser registry;
        // this covers stale callers feeding hand-built documents.
        out.push(Diagnostic::new(
            DiagnosticKind::UndefinedTrait,
            &doc.file_path,
            Some(t.line),
            format!("trait '@{}' is not declared in the schema", t.name),
        ));
        return;
    };

    validate_trait_value(t, def, doc, out);
}

fn validate_trait_value(t: &ParsedTrait, def: &TraitDefinition, doc: &ParsedDocument, out: &mut Vec<Diagnostic>) {
    match def.kind {
        ValueKind::Date => {
            if dates::parse_iso_date(&t.value).is_none() {
                out.push(invalid_value(t, doc, "expected a YYYY-MM-DD date"));
            }
        }
        ValueKind::Datetime => {
            if dates::parse_iso_datetime_date(&t.value).is_none() {
                out.push(invalid_value(t, doc, "expected an ISO datetime"));
            }
        }
        ValueKind::Number => match t.value.parse::<f64>() {
            Ok(n) => check_range(n, def.min, def.max, &t.name, doc, t.line, out),
            Err(_) => out.push(invalid_value(t, doc, "expected a number")),
        },
        ValueKind::Boolean => {
            if t.value != "true" && t.value != "false" {
                out.push(invalid_value(t, doc, "expected true or false"));
            }
        }
        ValueKind::Enum => {
            let allowed = def.values.as_deref().unwrap_or(&[]);
            if !allowed.iter().any(|v| v == &t.value) {
                out.push(Diagnostic::new(
                    DiagnosticKind::InvalidEnumValue,
                    &doc.file_path,
                    Some(t.line),
                    format!(
                        "'{}' is not a valid value for '@{}' (expected one of: {})",
                        t.value,
                        t.name,
                        allowed.join(", ")
                    ),
                ));
            }
        }
        ValueKind::String | ValueKind::Ref | ValueKind::RefList => {}
    }
}

fn invalid_value(t: &ParsedTrait, doc: &ParsedDocument, expected: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::InvalidFieldValue,
        &doc.file_path,
        Some(t.line),
        format!("'@{}({})': {}", t.name, t.value, expected),
    )
}

fn check_range(
    n: f64,
    min: Option<f64>,
    max: Option<f64>,
    name: &str,
    doc: &ParsedDocument,
    line: usize,
    out: &mut Vec<Diagnostic>,
) {
    if let Some(min) = min {
        if n < min {
            out.push(Diagnostic::new(
                DiagnosticKind::OutOfRange,
                &doc.file_path,
                Some(line),
                format!("'{}' value {} is below minimum {}", name, n, min),
            ));
            return;
        }
    }
    if let Some(max) = max {
        if n > max {
            out.push(Diagnostic::new(
                DiagnosticKind::OutOfRange,
                &doc.file_path,
                Some(line),
                format!("'{}' value {} is above maximum {}", name, n, max),
            ));
        }
    }
}
