//! End-to-end scenarios over a real vault directory

use std::path::Path;

use chrono::NaiveDate;
use tempfile::{tempdir, TempDir};

use raven::api::Raven;
use raven::cancel::CancelToken;
use raven::error::DiagnosticKind;
use raven::index::{reindex, Database, ReindexMode};
use raven::schema::{load_schema, FieldValue};
use raven::vault::VaultConfig;

const SCHEMA: &str = r#"
types:
  person:
    default_path: people
    name_field: name
    fields:
      name:
        type: string
        required: true
  project:
    default_path: projects
    fields:
      status:
        type: enum
        values: [active, paused, done]
  meeting:
    fields:
      time:
        type: string
traits:
  due:
    value: date
  priority:
    value: enum
    values: [low, medium, high]
"#;

fn write(vault: &Path, rel: &str, content: &str) {
    let path = vault.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn open_vault(files: &[(&str, &str)]) -> (TempDir, Raven) {
    let dir = tempdir().unwrap();
    write(dir.path(), "schema.yaml", SCHEMA);
    for (rel, content) in files {
        write(dir.path(), rel, content);
    }

    let mut raven = Raven::open(dir.path()).unwrap();
    let response = raven.reindex(ReindexMode::Full);
    assert!(response.ok, "initial reindex failed: {:?}", response.error);
    (dir, raven)
}

fn feb10() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
}

// S1: a @due trait in a daily note matches value:today and is parented
// to the daily note itself.
#[test]
fn s1_due_today() {
    let (_dir, raven) = open_vault(&[("daily/2026-02-10.md", "- @due(2026-02-10) Call\n")]);

    let response = raven.query("trait:due value:today", Some(feb10()));
    assert!(response.ok);
    let payload = response.data.unwrap();
    assert_eq!(payload.count, 1);

    let rows = payload.traits.unwrap();
    assert_eq!(rows[0].parent_id, "daily/2026-02-10");
    assert_eq!(rows[0].value, "2026-02-10");
}

// S2: field equality selects exactly the matching typed file.
#[test]
fn s2_type_query_with_field() {
    let (_dir, raven) = open_vault(&[
        ("projects/a.md", "---\ntype: project\nstatus: active\n---\n"),
        ("projects/b.md", "---\ntype: project\nstatus: done\n---\n"),
    ]);

    let response = raven.query("object:project .status:active", None);
    let payload = response.data.unwrap();
    let ids: Vec<String> = payload.objects.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(ids, vec!["projects/a"]);
}

// S3: an alias resolves a reference, and backlinks surface the source.
#[test]
fn s3_alias_resolution() {
    let (_dir, raven) = open_vault(&[
        (
            "people/freya.md",
            "---\ntype: person\nname: Freya\nalias: The Queen\n---\n",
        ),
        ("daily/2026-02-10.md", "Audience with [[The Queen]].\n"),
    ]);

    let response = raven.backlinks("people/freya");
    assert!(response.ok);
    let links = response.data.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].file_path, "daily/2026-02-10.md");
    assert_eq!(links[0].target_raw, "The Queen");
}

// S4: an embedded typed heading yields a typed object with a
// section-typed parent chain ending at the file root.
#[test]
fn s4_embedded_object() {
    let (_dir, raven) = open_vault(&[(
        "notes.md",
        "# Monday\n\n## Weekly Standup\n::meeting(time=09:00)\n",
    )]);

    let response = raven.query("object:meeting", None);
    let payload = response.data.unwrap();
    let rows = payload.objects.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "notes#weekly-standup");
    assert_eq!(rows[0].object_type, "meeting");
    assert_eq!(rows[0].fields.get("time").and_then(|v| v.as_str()), Some("09:00"));

    // Parent chain: meeting -> section -> file root.
    let section_id = rows[0].parent_id.clone().unwrap();
    let sections = raven.query("object:section", None).data.unwrap().objects.unwrap();
    let section = sections.iter().find(|s| s.id == section_id).unwrap();
    assert_eq!(section.id, "notes#monday");
    assert_eq!(section.parent_id.as_deref(), Some("notes"));
}

// S5: ancestor + child sub-queries compose across the hierarchy.
#[test]
fn s5_ancestor_child() {
    let (_dir, raven) = open_vault(&[(
        "daily/2026-02-10.md",
        r#"## Standup
::meeting(time=09:00)

## Website
::project(status=active)
"#,
    )]);

    let response = raven.query(
        "object:meeting ancestor:{object:date child:{object:project .status:active}}",
        Some(feb10()),
    );
    let payload = response.data.unwrap();
    let ids: Vec<String> = payload.objects.unwrap().into_iter().map(|o| o.id).collect();
    assert_eq!(ids, vec!["daily/2026-02-10#standup"]);
}

// S6: move with update_refs rewrites inbound links and preserves
// backlinks under the new id.
#[test]
fn s6_move_with_ref_update() {
    let (dir, mut raven) = open_vault(&[
        ("people/loki.md", "---\ntype: person\nname: Loki\n---\n"),
        ("daily/2026-02-10.md", "Tricked by [[people/loki]] again.\n"),
        ("daily/2026-02-11.md", "Lunch with [[people/loki|Loki]].\n"),
    ]);

    let before = raven.backlinks("people/loki").data.unwrap().len();
    assert_eq!(before, 2);

    let response = raven.move_file("people/loki.md", "people/loki-archived.md", true);
    assert!(response.ok);
    let result = response.data.unwrap();
    assert_eq!(result.updated_files.len(), 2);

    let rewritten = std::fs::read_to_string(dir.path().join("daily/2026-02-10.md")).unwrap();
    assert!(rewritten.contains("[[people/loki-archived]]"));
    let with_display = std::fs::read_to_string(dir.path().join("daily/2026-02-11.md")).unwrap();
    assert!(with_display.contains("[[people/loki-archived|Loki]]"));

    let after = raven.backlinks("people/loki-archived").data.unwrap().len();
    assert_eq!(after, before);
}

// Property 1: reindexing twice yields identical index state.
#[test]
fn p1_idempotent_reindex() {
    let dir = tempdir().unwrap();
    write(dir.path(), "schema.yaml", SCHEMA);
    write(
        dir.path(),
        "people/freya.md",
        "---\ntype: person\nname: Freya\n---\n\n- @due(2026-03-01) write saga\n",
    );
    write(dir.path(), "notes.md", "# A\n\nping [[freya]]\n\n# A\n");

    let schema = load_schema(dir.path()).unwrap();
    let config = VaultConfig::default();
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancelToken::new();

    reindex(&mut db, dir.path(), &schema, &config, ReindexMode::Full, &cancel).unwrap();
    let first = db.snapshot().unwrap();
    reindex(&mut db, dir.path(), &schema, &config, ReindexMode::Full, &cancel).unwrap();
    let second = db.snapshot().unwrap();

    assert_eq!(first, second);
}

// Property 2: created fields survive the round trip through the index,
// and set updates are observed by the caller's next read.
#[test]
fn p2_round_trip_identity() {
    let (_dir, mut raven) = open_vault(&[]);

    let created = raven.create(
        "project",
        "Longship Refit",
        &[("status".to_string(), FieldValue::String("active".to_string()))],
    );
    assert!(created.ok);
    let id = created.data.unwrap().id;

    let rows = raven
        .query("object:project .status:active", None)
        .data
        .unwrap()
        .objects
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);

    assert!(raven.set(&id, "status", "done").ok);
    let rows = raven
        .query("object:project .status:done", None)
        .data
        .unwrap()
        .objects
        .unwrap();
    assert_eq!(rows[0].id, id);
}

// Property 3/4: object ids ignore surrounding line churn, and duplicate
// headings disambiguate in document order.
#[test]
fn p3_p4_id_stability_and_slug_disambiguation() {
    let (dir, mut raven) = open_vault(&[("notes.md", "# Tasks\n\n# Tasks\n")]);

    let ids: Vec<String> = raven
        .query("object:section", None)
        .data
        .unwrap()
        .objects
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec!["notes#tasks", "notes#tasks-2"]);

    // Prepend a line; the ids must not change.
    write(dir.path(), "notes.md", "intro\n\n# Tasks\n\n# Tasks\n");
    raven.reindex(ReindexMode::Full);

    let ids_after: Vec<String> = raven
        .query("object:section", None)
        .data
        .unwrap()
        .objects
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids_after, ids);
}

// Property 7: !has:{...} is the exact complement of has:{...} within
// the type.
#[test]
fn p7_de_morgan() {
    let (_dir, raven) = open_vault(&[
        ("projects/a.md", "---\ntype: project\nstatus: active\n---\n\n- @priority(high) push\n"),
        ("projects/b.md", "---\ntype: project\nstatus: active\n---\n\n- @priority(low) later\n"),
        ("projects/c.md", "---\ntype: project\nstatus: done\n---\n"),
    ]);

    let all: Vec<String> = raven
        .query("object:project", None)
        .data
        .unwrap()
        .objects
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    let with: Vec<String> = raven
        .query("object:project has:{trait:priority value:high}", None)
        .data
        .unwrap()
        .objects
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    let without: Vec<String> = raven
        .query("object:project !has:{trait:priority value:high}", None)
        .data
        .unwrap()
        .objects
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();

    assert_eq!(with, vec!["projects/a"]);
    assert_eq!(without, vec!["projects/b", "projects/c"]);
    let mut union = with.clone();
    union.extend(without.clone());
    union.sort();
    assert_eq!(union, all);
}

// Property 9/10: short-name collisions and alias collisions are
// reported, never silently resolved.
#[test]
fn p9_p10_ambiguity_and_alias_safety() {
    let (_dir, raven) = open_vault(&[
        ("a/website.md", "# A\n"),
        ("b/website.md", "# B\n"),
        ("people/odin.md", "---\ntype: person\nname: Odin\nalias: website\n---\n"),
        ("note.md", "see [[website]]\n"),
    ]);

    let diagnostics = raven.check(false).data.unwrap();
    assert!(diagnostics.iter().any(|d| d.kind == DiagnosticKind::AliasCollision));

    // The reference is not silently resolved to any candidate.
    let backlinks_a = raven.backlinks("a/website").data.unwrap();
    let backlinks_b = raven.backlinks("b/website").data.unwrap();
    assert!(backlinks_a.is_empty());
    assert!(backlinks_b.is_empty());
}

// Deleting a file purges its rows but keeps inbound refs as missing.
#[test]
fn delete_lifecycle() {
    let (dir, mut raven) = open_vault(&[
        ("target.md", "# T\n"),
        ("source.md", "see [[target]]\n"),
    ]);

    let response = raven.delete("target.md");
    assert!(response.ok);
    let result = response.data.unwrap();
    assert_eq!(result.trashed_to.as_deref(), Some(".trash/target.md"));
    assert_eq!(result.backlink_count, 1);
    assert!(dir.path().join(".trash/target.md").is_file());

    let stats = raven.stats().data.unwrap();
    assert_eq!(stats.missing_ref_count, 1);
}

// Append creates missing headings at level 2 and lands inside existing
// heading spans.
#[test]
fn append_under_heading() {
    let (dir, mut raven) = open_vault(&[("log.md", "# Log\n\n## Inbox\n\n- old\n\n## Done\n")]);

    let response = raven.append("log.md", "- fresh", Some("Inbox"));
    assert!(response.ok);

    let content = std::fs::read_to_string(dir.path().join("log.md")).unwrap();
    let fresh = content.find("- fresh").unwrap();
    let done = content.find("## Done").unwrap();
    assert!(fresh < done);

    let response = raven.append("log.md", "- elsewhere", Some("Someday"));
    assert!(response.data.unwrap().created_heading);
    let content = std::fs::read_to_string(dir.path().join("log.md")).unwrap();
    assert!(content.contains("## Someday"));
}

// Saved queries interpolate positional args before validation.
#[test]
fn saved_query_interpolation() {
    let dir = tempdir().unwrap();
    write(dir.path(), "schema.yaml", SCHEMA);
    write(
        dir.path(),
        "raven.yaml",
        r#"
queries:
  by-status:
    query: "object:project .status:$1"
    args: [status]
"#,
    );
    write(dir.path(), "projects/a.md", "---\ntype: project\nstatus: active\n---\n");

    let mut raven = Raven::open(dir.path()).unwrap();
    raven.reindex(ReindexMode::Full);

    let response = raven.query_saved("by-status", &["active".to_string()], None);
    assert!(response.ok);
    assert_eq!(response.data.unwrap().count, 1);

    // Interpolated values hit validation like any literal.
    let response = raven.query_saved("by-status", &["bogus".to_string()], None);
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().code, "validation_error");
}

// The full-text facet finds body text and survives file churn.
#[test]
fn search_facet() {
    let (dir, mut raven) = open_vault(&[("notes.md", "# N\n\nthe ravens remember everything\n")]);

    let hits = raven.search("ravens", 10).data.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].object_id, "notes");

    write(dir.path(), "notes.md", "# N\n\nnothing here now\n");
    raven.reindex(ReindexMode::Full);
    assert!(raven.search("ravens", 10).data.unwrap().is_empty());
}
