//! Document parser - combines all parsers into a complete document representation

use std::collections::{BTreeMap, HashSet};

use crate::dates;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::schema::{FieldKind, FieldValue, Schema, TypeDefinition};
use crate::slug::slugify;

use super::frontmatter::parse_frontmatter;
use super::markdown::{find_heading_scope, mask_code, parse_markdown_structure};
use super::refs::{extract_references, find_dangling_refs};
use super::traits::parse_trait_annotations;
use super::type_decl::{parse_type_declaration, TypeDeclaration};

/// Vault-derived knobs the parser needs for identity computation.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Root directory for typed objects (stripped from ids).
    pub object_root: Option<String>,

    /// Root directory for untyped pages (stripped from ids).
    pub page_root: Option<String>,

    /// Directory holding daily notes; date-stemmed files under it get
    /// the built-in `date` type.
    pub daily_dir: String,
}

/// A parsed object (file-level or embedded)
#[derive(Debug, Clone)]
pub struct ParsedObject {
    /// Object ID (file id for file-level, file-id#fragment for embedded)
    pub id: String,

    /// Object type
    pub object_type: String,

    /// Field values, keyed in stable order
    pub fields: BTreeMap<String, FieldValue>,

    /// Heading text (None for file-level)
    pub heading: Option<String>,

    /// Heading level 1-6 (None for file-level)
    pub heading_level: Option<u8>,

    /// Direct enclosing object (None for file-level)
    pub parent_id: Option<String>,

    /// Case-insensitive alternative name (file-level only)
    pub alias: Option<String>,

    /// First line of the object's span
    pub line_start: usize,

    /// Last line of the object's span (inclusive)
    pub line_end: usize,
}

/// Where a trait annotation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitSource {
    Inline,
    Frontmatter,
}

impl TraitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraitSource::Inline => "inline",
            TraitSource::Frontmatter => "frontmatter",
        }
    }
}

/// A parsed trait instance
#[derive(Debug, Clone)]
pub struct ParsedTrait {
    /// Trait name
    pub name: String,

    /// The value string; bare annotations carry "true"
    pub value: String,

    /// Inline annotation or frontmatter key
    pub source: TraitSource,

    /// Nearest enclosing object
    pub parent_id: String,

    /// Line number
    pub line: usize,

    /// The surrounding line of text
    pub content_line: String,
}

/// A parsed reference, unresolved
#[derive(Debug, Clone)]
pub struct ParsedRef {
    /// Owning object
    pub source_id: String,

    /// Target exactly as written
    pub target_raw: String,

    /// Display text after `|`
    pub display: Option<String>,

    /// Line number
    pub line: usize,

    /// Column span (byte offsets within the line)
    pub span_start: usize,
    pub span_end: usize,
}

/// A fully parsed document
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File path (relative to vault, with extension)
    pub file_path: String,

    /// Identity of the file-level object
    pub file_id: String,

    /// All objects, file-level first, then in document order
    pub objects: Vec<ParsedObject>,

    /// All traits in document order
    pub traits: Vec<ParsedTrait>,

    /// All references in document order
    pub refs: Vec<ParsedRef>,

    /// Parse-stage diagnostics (the parser never aborts)
    pub diagnostics: Vec<Diagnostic>,

    /// Body text (frontmatter excluded), for the full-text facet
    pub body_text: String,
}

/// Compute a file-level object id from a relative path.
pub fn file_id_for_path(relative_path: &str, opts: &ParseOptions) -> String {
    let no_ext = relative_path.strip_suffix(".md").unwrap_or(relative_path);

    for root in [&opts.object_root, &opts.page_root].into_iter().flatten() {
        if let Some(stripped) = no_ext.strip_prefix(&format!("{}/", root)) {
            return stripped.to_string();
        }
    }

    no_ext.to_string()
}

/// Parse one file into objects, traits, references, and diagnostics.
pub fn parse_document(
    content: &str,
    relative_path: &str,
    schema: &Schema,
    opts: &ParseOptions,
) -> ParsedDocument {
    let file_path = relative_path.to_string();
    let file_id = file_id_for_path(relative_path, opts);

    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len().max(1);
    let mut diagnostics = Vec::new();

    // --- Frontmatter ---
    let fm = parse_frontmatter(content);
    if let Some((line, message)) = &fm.malformed {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MalformedFrontmatter,
            &file_path,
            Some(*line),
            message.clone(),
        ));
    }

    let body_start_line = if fm.end_line > 0 { fm.end_line + 1 } else { 1 };
    let body_text = if fm.end_line > 0 && fm.end_line <= lines.len() {
        lines[fm.end_line..].join("\n")
    } else {
        content.to_string()
    };

    // --- File type resolution ---
    let daily_date = daily_stem(relative_path, &opts.daily_dir);
    let file_type = fm
        .object_type
        .clone()
        .or_else(|| daily_date.as_ref().map(|_| "date".to_string()))
        .unwrap_or_else(|| "page".to_string());

    let file_type_def = schema.type_def(&file_type);

    // --- File-level fields and frontmatter traits ---
    let mut file_fields: BTreeMap<String, FieldValue> = BTreeMap::new();
    let mut traits: Vec<ParsedTrait> = Vec::new();

    for (key, raw, line) in &fm.entries {
        let declared = file_type_def.and_then(|d| d.fields.get(key));
        if let Some(def) = declared {
            match crate::schema::coerce_value(raw, def.field_type) {
                Ok(v) => {
                    file_fields.insert(key.clone(), v);
                }
                Err(msg) => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::InvalidFieldValue,
                        &file_path,
                        Some(*line),
                        format!("field '{}': {}", key, msg),
                    ));
                    file_fields.insert(key.clone(), crate::schema::guess_value(raw));
                }
            }
        } else if schema.trait_def(key).is_some() {
            traits.push(ParsedTrait {
                name: key.clone(),
                value: yaml_scalar_string(raw),
                source: TraitSource::Frontmatter,
                parent_id: file_id.clone(),
                line: *line,
                content_line: lines.get(line.saturating_sub(1)).unwrap_or(&"").to_string(),
            });
        } else {
            // Unknown key: indexed best-effort; the validator warns.
            file_fields.insert(key.clone(), crate::schema::guess_value(raw));
        }
    }

    if !fm.tags.is_empty() {
        file_fields.insert(
            "tags".to_string(),
            FieldValue::List(fm.tags.iter().map(|t| FieldValue::String(t.clone())).collect()),
        );
    }
    if let Some(date) = &daily_date {
        file_fields
            .entry("date".to_string())
            .or_insert_with(|| FieldValue::Date(date.clone()));
    }

    // --- Markdown structure ---
    let structure = parse_markdown_structure(&body_text, body_start_line);
    let masked_body = mask_code(&body_text, &structure.code_ranges);
    let masked_lines: Vec<&str> = masked_body.lines().collect();

    let body_line = |abs: usize| -> Option<&str> {
        abs.checked_sub(body_start_line).and_then(|i| masked_lines.get(i).copied())
    };

    // --- Headings become objects ---
    let mut objects: Vec<ParsedObject> = Vec::new();
    let mut used_fragments: HashSet<String> = HashSet::new();
    // (heading index, object id, level, span)
    let mut heading_objects: Vec<(usize, String, u8, usize, usize)> = Vec::new();

    let heading_lines: HashSet<usize> = structure.headings.iter().map(|h| h.line).collect();

    for (heading_idx, heading) in structure.headings.iter().enumerate() {
        // A ::type(...) declaration within two lines after the heading
        // turns it into a typed object. Scanning stops at the next
        // heading so a declaration never attaches to the wrong one.
        let mut type_decl: Option<TypeDeclaration> = None;
        for offset in 1..=2 {
            let abs = heading.line + offset;
            if heading_lines.contains(&abs) {
                break;
            }
            let Some(line) = body_line(abs) else { break };
            match parse_type_declaration(line, abs) {
                Ok(Some(decl)) => {
                    type_decl = Some(decl);
                    break;
                }
                Ok(None) => {}
                Err(msg) => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MalformedTypedecl,
                        &file_path,
                        Some(abs),
                        msg,
                    ));
                    break;
                }
            }
        }

        let (object_type, explicit_id, mut fields) = match type_decl {
            Some(decl) => (decl.type_name, decl.id, decl.fields),
            None => {
                let mut fields = BTreeMap::new();
                fields.insert("title".to_string(), FieldValue::String(heading.text.clone()));
                fields.insert("level".to_string(), FieldValue::Number(heading.level as f64));
                ("section".to_string(), None, fields)
            }
        };

        if let Some(type_def) = schema.type_def(&object_type) {
            retype_declared_fields(&mut fields, type_def, &file_path, heading.line, &mut diagnostics);
        }

        let base_fragment = explicit_id.unwrap_or_else(|| {
            let slug = slugify(&heading.text);
            if slug.is_empty() {
                object_type.clone()
            } else {
                slug
            }
        });
        let fragment = disambiguate(&base_fragment, &mut used_fragments);

        let (span_start, span_end) = find_heading_scope(&structure.headings, heading_idx, total_lines);

        let parent_id = heading_objects
            .iter()
            .rev()
            .find(|(idx, _, level, _, _)| *idx < heading_idx && *level < heading.level)
            .map(|(_, id, _, _, _)| id.clone())
            .unwrap_or_else(|| file_id.clone());

        let id = format!("{}#{}", file_id, fragment);
        heading_objects.push((heading_idx, id.clone(), heading.level, span_start, span_end));

        objects.push(ParsedObject {
            id,
            object_type,
            fields,
            heading: Some(heading.text.clone()),
            heading_level: Some(heading.level),
            parent_id: Some(parent_id),
            alias: None,
            line_start: span_start,
            line_end: span_end,
        });
    }

    // File-level object goes first.
    objects.insert(
        0,
        ParsedObject {
            id: file_id.clone(),
            object_type: file_type,
            fields: file_fields,
            heading: None,
            heading_level: None,
            parent_id: None,
            alias: fm.alias.clone(),
            line_start: 1,
            line_end: total_lines,
        },
    );

    // Deepest enclosing object for a line: greatest line_start whose span
    // contains the line.
    let enclosing_object = |line: usize| -> String {
        heading_objects
            .iter()
            .filter(|(_, _, _, start, end)| line >= *start && line <= *end)
            .max_by_key(|(_, _, _, start, _)| *start)
            .map(|(_, id, _, _, _)| id.clone())
            .unwrap_or_else(|| file_id.clone())
    };

    // --- Inline traits ---
    let mut seen_traits: HashSet<(String, String, String, usize)> = HashSet::new();
    for t in &traits {
        seen_traits.insert((t.parent_id.clone(), t.name.clone(), t.value.clone(), t.line));
    }

    for (idx, masked_line) in masked_lines.iter().enumerate() {
        let line_num = body_start_line + idx;
        let (tokens, issues) = parse_trait_annotations(masked_line);

        for issue in issues {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedTrait,
                &file_path,
                Some(line_num),
                issue.message,
            ));
        }

        for token in tokens {
            if schema.trait_def(&token.name).is_none() {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UndefinedTrait,
                    &file_path,
                    Some(line_num),
                    format!("trait '@{}' is not declared in the schema", token.name),
                ));
                continue;
            }

            let parent_id = enclosing_object(line_num);
            if !seen_traits.insert((parent_id.clone(), token.name.clone(), token.value.clone(), line_num)) {
                continue;
            }

            traits.push(ParsedTrait {
                name: token.name,
                value: token.value,
                source: TraitSource::Inline,
                parent_id,
                line: line_num,
                content_line: lines.get(line_num - 1).unwrap_or(&"").trim().to_string(),
            });
        }
    }

    traits.sort_by_key(|t| t.line);

    // --- References ---
    let mut refs: Vec<ParsedRef> = Vec::new();

    // Frontmatter values may carry wiki-form refs; scan that region raw.
    if fm.end_line > 0 {
        let fm_text = lines[..fm.end_line.min(lines.len())].join("\n");
        for token in extract_references(&fm_text, 1) {
            refs.push(ParsedRef {
                source_id: file_id.clone(),
                target_raw: token.target,
                display: token.display,
                line: token.line,
                span_start: token.start,
                span_end: token.end,
            });
        }
    }

    for token in extract_references(&masked_body, body_start_line) {
        refs.push(ParsedRef {
            source_id: enclosing_object(token.line),
            target_raw: token.target,
            display: token.display,
            line: token.line,
            span_start: token.start,
            span_end: token.end,
        });
    }

    for (line, column) in find_dangling_refs(&masked_body, body_start_line) {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MalformedReference,
            &file_path,
            Some(line),
            format!("unterminated [[ at column {}", column + 1),
        ));
    }

    ParsedDocument {
        file_path,
        file_id,
        objects,
        traits,
        refs,
        diagnostics,
        body_text,
    }
}

/// `daily/2026-02-10.md` under the daily dir -> Some("2026-02-10").
fn daily_stem(relative_path: &str, daily_dir: &str) -> Option<String> {
    if daily_dir.is_empty() {
        return None;
    }
    let rest = relative_path.strip_prefix(&format!("{}/", daily_dir))?;
    let stem = rest.strip_suffix(".md")?;
    dates::parse_iso_date(stem).map(|_| stem.to_string())
}

/// Typedecl argument values arrive shape-guessed; re-type the ones the
/// schema declares (e.g. a bare `people/freya` on a ref field).
fn retype_declared_fields(
    fields: &mut BTreeMap<String, FieldValue>,
    type_def: &TypeDefinition,
    file_path: &str,
    line: usize,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, def) in &type_def.fields {
        let Some(value) = fields.get(name) else { continue };
        match retype_value(value, def.field_type) {
            Ok(Some(retyped)) => {
                fields.insert(name.clone(), retyped);
            }
            Ok(None) => {}
            Err(msg) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::InvalidFieldValue,
                    file_path,
                    Some(line),
                    format!("field '{}': {}", name, msg),
                ));
            }
        }
    }
}

fn retype_value(value: &FieldValue, kind: FieldKind) -> Result<Option<FieldValue>, String> {
    match (kind, value) {
        (FieldKind::Ref, FieldValue::String(s)) => Ok(Some(FieldValue::Ref(s.clone()))),
        (FieldKind::Date, FieldValue::String(s)) => {
            if dates::parse_iso_date(s).is_some() {
                Ok(Some(FieldValue::Date(s.clone())))
            } else {
                Err(format!("invalid date '{}'", s))
            }
        }
        (FieldKind::Datetime, FieldValue::String(s)) => {
            if dates::parse_iso_datetime_date(s).is_some() {
                Ok(Some(FieldValue::Datetime(s.clone())))
            } else {
                Err(format!("invalid datetime '{}'", s))
            }
        }
        (FieldKind::RefList, FieldValue::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    FieldValue::Ref(_) => out.push(item.clone()),
                    FieldValue::String(s) => out.push(FieldValue::Ref(s.clone())),
                    other => return Err(format!("expected reference in list, got {:?}", other)),
                }
            }
            Ok(Some(FieldValue::List(out)))
        }
        (FieldKind::RefList, FieldValue::Ref(r)) => {
            Ok(Some(FieldValue::List(vec![FieldValue::Ref(r.clone())])))
        }
        _ => Ok(None),
    }
}

fn disambiguate(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn yaml_scalar_string(raw: &serde_yaml::Value) -> String {
    match raw {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => crate::schema::guess_value(other).to_display(),
    }
}
