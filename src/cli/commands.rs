//! CLI command implementations
//!
//! Thin wrappers over the typed API: format payloads for humans (or
//! dump the envelope as JSON) and translate errors into exit codes.

use std::path::Path;

use raven::api::{Raven, Response};
use raven::error::{RavenError, Severity};
use raven::index::ReindexMode;
use raven::parser::parse_value;
use raven::schema::FieldValue;

/// Exit codes: 0 success, 1 validation failed, 2 I/O or index error,
/// 3 usage error.
pub fn exit_code_for(error_code: &str) -> i32 {
    match error_code {
        "io_error" | "index_error" | "index_corrupt" | "serialization_error" => 2,
        "config_error" | "unknown_name" | "parse_error" => 3,
        _ => 1,
    }
}

fn finish<T: serde::Serialize>(response: Response<T>, json: bool, render: impl Fn(&T)) -> i32 {
    if json {
        match serde_json::to_string_pretty(&response) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                return 2;
            }
        }
        return if response.ok { 0 } else { exit_code_for(&response.error.unwrap().code) };
    }

    for warning in &response.warnings {
        eprintln!("{}", warning);
    }

    match (response.ok, response.data, response.error) {
        (true, Some(data), _) => {
            render(&data);
            0
        }
        (true, None, _) => 0,
        (_, _, Some(error)) => {
            eprintln!("error[{}]: {}", error.code, error.message);
            exit_code_for(&error.code)
        }
        _ => 2,
    }
}

/// Initialize a new vault
pub fn init(path: &Path) -> i32 {
    println!("Initializing vault at: {}", path.display());

    let result: raven::error::Result<()> = (|| {
        std::fs::create_dir_all(path)?;
        std::fs::create_dir_all(path.join(".raven"))?;
        raven::schema::create_default_schema(path)?;
        raven::vault::create_default_vault_config(path)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            println!("✓ Created schema.yaml");
            println!("✓ Created raven.yaml");
            println!("✓ Created .raven/ directory");
            println!("\nVault initialized! Start adding markdown files.");
            0
        }
        Err(e) => {
            eprintln!("error[{}]: {}", e.code(), e);
            exit_code_for(e.code())
        }
    }
}

/// Validate the vault (check for errors)
pub fn check(raven: &Raven, strict: bool, json: bool) -> i32 {
    let response = raven.check(strict);

    if json {
        return finish(response, true, |_| {});
    }

    let Some(diagnostics) = response.data else {
        if let Some(error) = response.error {
            eprintln!("error[{}]: {}", error.code, error.message);
            return exit_code_for(&error.code);
        }
        return 2;
    };

    let errors = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
    let warnings = diagnostics.len() - errors;

    for d in &diagnostics {
        println!("{}", d);
    }

    if diagnostics.is_empty() {
        println!("✓ No issues found.");
        0
    } else {
        println!();
        println!("Found {} error(s), {} warning(s).", errors, warnings);
        if errors > 0 {
            1
        } else {
            0
        }
    }
}

/// Reindex the vault
pub fn reindex(raven: &mut Raven, full: bool, json: bool) -> i32 {
    let mode = if full { ReindexMode::Full } else { ReindexMode::Incremental };
    let response = raven.reindex(mode);

    finish(response, json, |summary| {
        println!("✓ Indexed {} file(s)", summary.indexed_files);
        if summary.removed_files > 0 {
            println!("  {} removed", summary.removed_files);
        }
        if summary.unchanged_files > 0 {
            println!("  {} unchanged", summary.unchanged_files);
        }
    })
}

/// Run a query
pub fn query(raven: &Raven, text: &str, json: bool) -> i32 {
    let response = raven.query(text, None);

    finish(response, json, |payload| {
        if let Some(objects) = &payload.objects {
            for obj in objects {
                println!("{}  ({})  {}:{}", obj.id, obj.object_type, obj.file_path, obj.line_start);
            }
        }
        if let Some(traits) = &payload.traits {
            for t in traits {
                println!("@{}({})  {}  {}:{}", t.name, t.value, t.content, t.file_path, t.line);
            }
        }
        eprintln!("{} row(s) in {}ms", payload.count, payload.elapsed_ms);
    })
}

/// Run a saved query by name
pub fn query_saved(raven: &Raven, name: &str, args: &[String], json: bool) -> i32 {
    let response = raven.query_saved(name, args, None);

    finish(response, json, |payload| {
        if let Some(objects) = &payload.objects {
            for obj in objects {
                println!("{}  ({})  {}:{}", obj.id, obj.object_type, obj.file_path, obj.line_start);
            }
        }
        if let Some(traits) = &payload.traits {
            for t in traits {
                println!("@{}({})  {}  {}:{}", t.name, t.value, t.content, t.file_path, t.line);
            }
        }
    })
}

/// Show backlinks to a target
pub fn backlinks(raven: &Raven, target: &str, json: bool) -> i32 {
    let response = raven.backlinks(target);

    finish(response, json, |links| {
        if links.is_empty() {
            println!("No backlinks found for '{}'", target);
            return;
        }
        println!("Backlinks to '{}':\n", target);
        for link in links {
            println!("  ← {} ({}:{})", link.source_id, link.file_path, link.line);
        }
    })
}

/// Full-text search
pub fn search(raven: &Raven, text: &str, json: bool) -> i32 {
    let response = raven.search(text, 50);

    finish(response, json, |hits| {
        if hits.is_empty() {
            println!("No matches.");
            return;
        }
        for hit in hits {
            println!("{}  {}", hit.object_id, hit.excerpt);
        }
    })
}

/// Show index statistics
pub fn stats(raven: &Raven, json: bool) -> i32 {
    let response = raven.stats();

    finish(response, json, |stats| {
        println!("Vault Statistics");
        println!("================");
        println!("Files:      {}", stats.file_count);
        println!("Objects:    {}", stats.object_count);
        println!("Traits:     {}", stats.trait_count);
        println!("References: {}", stats.ref_count);
        if stats.missing_ref_count > 0 {
            println!("Missing:    {}", stats.missing_ref_count);
        }
    })
}

/// List untyped pages
pub fn untyped(raven: &Raven, json: bool) -> i32 {
    let response = raven.untyped();

    finish(response, json, |pages| {
        if pages.is_empty() {
            println!("All files have explicit types! ✓");
            return;
        }
        println!("Untyped pages (using 'page' fallback):\n");
        for page in pages {
            println!("  {}", page);
        }
    })
}

/// Open or create today's daily note
pub fn daily(raven: &mut Raven, editor: Option<&str>) -> i32 {
    let today = chrono::Local::now();
    let relative = format!(
        "{}/{}.md",
        raven.config().daily_directory,
        today.format("%Y-%m-%d")
    );
    let absolute = raven.vault_path().join(&relative);

    if !absolute.exists() {
        let content = format!("# {}\n\n", today.format("%A, %B %d, %Y"));
        if let Some(parent) = absolute.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("error[io_error]: {}", e);
                return 2;
            }
        }
        if let Err(e) = std::fs::write(&absolute, content) {
            eprintln!("error[io_error]: {}", e);
            return 2;
        }
        println!("Created: {}", absolute.display());
        raven.reindex(ReindexMode::Incremental);
    } else {
        println!("Today's note: {}", absolute.display());
    }

    open_in_editor(&absolute, editor);
    0
}

/// Create a new typed note
pub fn new_note(
    raven: &mut Raven,
    type_name: &str,
    title: &str,
    field_args: &[String],
    json: bool,
) -> i32 {
    let mut fields: Vec<(String, FieldValue)> = Vec::new();
    for arg in field_args {
        match arg.split_once('=') {
            Some((key, value)) => fields.push((key.trim().to_string(), parse_value(value.trim()))),
            None => {
                eprintln!("error[parse_error]: field '{}' is not key=value", arg);
                return 3;
            }
        }
    }

    let response = raven.create(type_name, title, &fields);
    finish(response, json, |created| {
        println!("Created: {} ({})", created.path, created.id);
    })
}

/// Set a field on an object
pub fn set(raven: &mut Raven, id: &str, field: &str, value: &str, json: bool) -> i32 {
    let response = raven.set(id, field, value);
    finish(response, json, |_| {
        println!("✓ {}.{} = {}", id, field, value);
    })
}

/// Replace a single occurrence of text in a file
pub fn edit(raven: &mut Raven, path: &str, old_str: &str, new_str: &str, json: bool) -> i32 {
    let response = raven.edit(path, old_str, new_str);
    finish(response, json, |_| {
        println!("✓ edited {}", path);
    })
}

/// Move/rename a file
pub fn mv(raven: &mut Raven, from: &str, to: &str, update_refs: bool, json: bool) -> i32 {
    let response = raven.move_file(from, to, update_refs);
    finish(response, json, |result| {
        println!("✓ {} → {}", result.old_id, result.new_id);
        for file in &result.updated_files {
            println!("  updated refs in {}", file);
        }
    })
}

/// Delete a file
pub fn rm(raven: &mut Raven, path: &str, json: bool) -> i32 {
    let response = raven.delete(path);
    finish(response, json, |result| {
        match &result.trashed_to {
            Some(trash) => println!("✓ moved to {}", trash),
            None => println!("✓ deleted {}", path),
        }
        if result.backlink_count > 0 {
            println!("⚠ {} backlink(s) now point at a missing object:", result.backlink_count);
            for link in &result.backlinks {
                println!("  {}:{}", link.file_path, link.line);
            }
        }
    })
}

/// Append a block to a file
pub fn append(raven: &mut Raven, path: &str, text: &str, heading: Option<&str>, json: bool) -> i32 {
    let response = raven.append(path, text, heading);
    finish(response, json, |result| {
        println!("✓ appended at {}:{}", path, result.line);
        if result.created_heading {
            println!("  created heading");
        }
    })
}

fn open_in_editor(path: &Path, editor: Option<&str>) {
    let editor = editor
        .map(|e| e.to_string())
        .or_else(|| std::env::var("EDITOR").ok());
    if let Some(editor) = editor {
        std::process::Command::new(editor).arg(path).spawn().ok();
    }
}

pub fn report_open_error(e: &RavenError) -> i32 {
    eprintln!("error[{}]: {}", e.code(), e);
    exit_code_for(e.code())
}
