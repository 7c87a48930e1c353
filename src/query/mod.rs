//! The Raven Query Language: lexer, parser, validator, planner, executor

mod ast;
mod exec;
mod lexer;
mod parser;
mod plan;
mod saved;
mod validator;

pub use ast::{CompareOp, Pred, Query, QueryKind, RefTarget};
pub use exec::{Executor, QueryRows};
pub use parser::parse_query;
pub use plan::plan_query;
pub use saved::{expand_saved_query, shell_split};
pub use validator::validate_query;

use chrono::NaiveDate;
use std::time::Instant;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::index::Database;
use crate::schema::Schema;
use crate::vault::VaultConfig;

/// Result envelope for one query run.
#[derive(Debug)]
pub struct QueryResults {
    pub kind: QueryKind,
    pub rows: QueryRows,
    pub count: usize,
    pub elapsed_ms: u128,
}

/// Parse, validate, plan, and execute a query in one call. `today`
/// anchors the relative date vocabulary and is always supplied by the
/// caller so runs are reproducible.
pub fn run_query(
    db: &Database,
    schema: &Schema,
    config: &VaultConfig,
    text: &str,
    today: NaiveDate,
    cancel: CancelToken,
) -> Result<QueryResults> {
    let started = Instant::now();

    let query = parse_query(text)?;
    validate_query(&query, schema)?;
    let query = plan_query(query);

    let mut executor = Executor::new(db, schema, config, today, cancel)?;
    let rows = executor.execute(&query)?;

    Ok(QueryResults {
        kind: query.kind,
        count: rows.len(),
        rows,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::index::{reindex, ReindexMode};
    use crate::schema::load_schema_str;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    const SCHEMA: &str = r#"
types:
  person:
    name_field: name
    fields:
      name:
        type: string
  project:
    fields:
      status:
        type: enum
        values: [active, paused, done]
      owner:
        type: ref
        target: person
      areas:
        type: string[]
  meeting:
    fields:
      time:
        type: string
traits:
  due:
    value: date
  done:
    value: boolean
  priority:
    value: enum
    values: [low, medium, high]
"#;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        schema: Schema,
        config: VaultConfig,
    }

    impl Fixture {
        fn query(&self, text: &str) -> QueryResults {
            run_query(
                &self.db,
                &self.schema,
                &self.config,
                text,
                chrono::NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
                CancelToken::new(),
            )
            .unwrap()
        }

        fn object_ids(&self, text: &str) -> Vec<String> {
            match self.query(text).rows {
                QueryRows::Objects(rows) => rows.into_iter().map(|r| r.id).collect(),
                QueryRows::Traits(_) => panic!("expected objects"),
            }
        }

        fn trait_parents(&self, text: &str) -> Vec<String> {
            match self.query(text).rows {
                QueryRows::Traits(rows) => rows.into_iter().map(|r| r.parent_id).collect(),
                QueryRows::Objects(_) => panic!("expected traits"),
            }
        }
    }

    fn write(vault: &Path, rel: &str, content: &str) {
        let path = vault.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let vault = dir.path();

        write(vault, "people/freya.md", "---\ntype: person\nname: Freya\nalias: The Queen\n---\n");
        write(vault, "people/loki.md", "---\ntype: person\nname: Loki\n---\n");
        write(
            vault,
            "projects/website.md",
            "---\ntype: project\nstatus: active\nowner: \"[[people/freya]]\"\nareas: [design, infra]\n---\n\n- @due(2026-02-10) launch checklist\n",
        );
        write(vault, "projects/archive.md", "---\ntype: project\nstatus: done\n---\n");
        write(
            vault,
            "daily/2026-02-10.md",
            r#"- @due(2026-02-10) Call [[people/loki]]

## Standup
::meeting(time=09:00)

### Website check-in
::project(status=active)

- @priority(high) fix banner
"#,
        );

        let schema = load_schema_str(SCHEMA).unwrap();
        let config = VaultConfig::default();
        let mut db = Database::open_in_memory().unwrap();
        reindex(&mut db, vault, &schema, &config, ReindexMode::Full, &CancelToken::new()).unwrap();

        Fixture {
            _dir: dir,
            db,
            schema,
            config,
        }
    }

    #[test]
    fn test_type_query_with_field() {
        let f = fixture();
        let ids = f.object_ids("object:project .status:active");
        assert_eq!(
            ids,
            vec![
                "daily/2026-02-10#website-check-in".to_string(),
                "projects/website".to_string(),
            ]
        );
    }

    #[test]
    fn test_array_field_membership() {
        let f = fixture();
        assert_eq!(f.object_ids("object:project .areas:design"), vec!["projects/website"]);
        assert!(f.object_ids("object:project .areas:marketing").is_empty());
    }

    #[test]
    fn test_field_exists() {
        let f = fixture();
        assert_eq!(f.object_ids("object:project .owner:*"), vec!["projects/website"]);
    }

    #[test]
    fn test_ref_valued_field_eq() {
        let f = fixture();
        assert_eq!(
            f.object_ids("object:project .owner:[[people/freya]]"),
            vec!["projects/website"]
        );
    }

    #[test]
    fn test_trait_value_today() {
        let f = fixture();
        let parents = f.trait_parents("trait:due value:today");
        assert_eq!(
            parents,
            vec!["daily/2026-02-10".to_string(), "projects/website".to_string()]
        );
    }

    #[test]
    fn test_trait_on_and_within() {
        let f = fixture();
        // The @priority trait sits on the embedded project, inside the
        // standup meeting, inside the daily note.
        assert_eq!(
            f.trait_parents("trait:priority on:{object:project}"),
            vec!["daily/2026-02-10#website-check-in"]
        );
        assert!(f.trait_parents("trait:priority on:{object:date}").is_empty());
        assert_eq!(
            f.trait_parents("trait:priority within:{object:date}"),
            vec!["daily/2026-02-10#website-check-in"]
        );
        assert_eq!(
            f.trait_parents("trait:priority within:{object:meeting}"),
            vec!["daily/2026-02-10#website-check-in"]
        );
    }

    #[test]
    fn test_trait_source_filter() {
        let f = fixture();
        assert_eq!(f.query("trait:due source:inline").count, 2);
        assert_eq!(f.query("trait:due source:frontmatter").count, 0);
    }

    #[test]
    fn test_has_and_negation_partition_the_type() {
        let f = fixture();
        let all = f.object_ids("object:project");
        let with = f.object_ids("object:project has:{trait:due value:today}");
        let without = f.object_ids("object:project !has:{trait:due value:today}");

        assert_eq!(with.len() + without.len(), all.len());
        for id in &with {
            assert!(!without.contains(id));
        }
        assert!(with.contains(&"projects/website".to_string()));
    }

    #[test]
    fn test_parent_and_ancestor() {
        let f = fixture();
        // The embedded project's direct parent is the standup meeting.
        assert_eq!(
            f.object_ids("object:project parent:meeting"),
            vec!["daily/2026-02-10#website-check-in"]
        );
        // parent: does not reach the daily note, ancestor: does.
        assert!(f.object_ids("object:project parent:date").is_empty());
        assert_eq!(
            f.object_ids("object:project ancestor:{object:date}"),
            vec!["daily/2026-02-10#website-check-in"]
        );
    }

    #[test]
    fn test_child_query() {
        let f = fixture();
        assert_eq!(
            f.object_ids("object:meeting child:{object:project .status:active}"),
            vec!["daily/2026-02-10#standup"]
        );
    }

    #[test]
    fn test_ancestor_plus_child_scenario() {
        let f = fixture();
        // Meetings inside daily notes that contain an active project as a
        // direct child: none here, the project nests under the meeting.
        let ids =
            f.object_ids("object:meeting ancestor:{object:date child:{object:project .status:active}}");
        assert!(ids.is_empty());

        // With the direct-child condition satisfied (the meeting itself),
        // the standup matches.
        let ids = f.object_ids("object:meeting ancestor:{object:date child:{object:meeting}}");
        assert_eq!(ids, vec!["daily/2026-02-10#standup"]);
    }

    #[test]
    fn test_refs_raw_and_alias() {
        let f = fixture();
        assert_eq!(
            f.object_ids("object:date refs:[[people/loki]]"),
            vec!["daily/2026-02-10"]
        );
        // Alias resolves through the same ladder as document refs.
        assert_eq!(
            f.object_ids("object:project refs:[[The Queen]]"),
            vec!["projects/website"]
        );
    }

    #[test]
    fn test_refs_subquery() {
        let f = fixture();
        assert_eq!(
            f.object_ids("object:project refs:{object:person .name:Freya}"),
            vec!["projects/website"]
        );
    }

    #[test]
    fn test_or_composition() {
        let f = fixture();
        let ids = f.object_ids("object:project .status:done | .owner:*");
        assert_eq!(ids, vec!["projects/archive", "projects/website"]);
    }

    #[test]
    fn test_deterministic_ordering() {
        let f = fixture();
        let first = f.object_ids("object:project");
        let second = f.object_ids("object:project");
        assert_eq!(first, second);
        // (file_path, line_start) order
        assert_eq!(
            first,
            vec![
                "daily/2026-02-10#website-check-in".to_string(),
                "projects/archive".to_string(),
                "projects/website".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_kind_per_query() {
        let f = fixture();
        assert!(matches!(f.query("object:person").rows, QueryRows::Objects(_)));
        assert!(matches!(f.query("trait:due").rows, QueryRows::Traits(_)));
    }

    #[test]
    fn test_cancellation() {
        let f = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_query(
            &f.db,
            &f.schema,
            &f.config,
            "object:project",
            chrono::NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            cancel,
        )
        .unwrap_err();
        assert_eq!(err.code(), "cancelled");
    }
}
