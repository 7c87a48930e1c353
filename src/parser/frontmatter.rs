//! Frontmatter parser - extracts the YAML block from markdown files

use serde_yaml::Value as Yaml;

/// Reserved frontmatter keys consumed by the engine itself.
pub const RESERVED_KEYS: &[&str] = &["type", "id", "alias", "tags"];

/// Parsed frontmatter data
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    /// The declared type (if any)
    pub object_type: Option<String>,

    /// Explicit object id override
    pub id: Option<String>,

    /// Case-insensitive alternative name
    pub alias: Option<String>,

    /// Tags declared in frontmatter
    pub tags: Vec<String>,

    /// Non-reserved keys in declaration order, with their raw YAML value
    /// and the 1-indexed line the key appears on.
    pub entries: Vec<(String, Yaml, usize)>,

    /// Line number of the closing `---` (0 if no frontmatter)
    pub end_line: usize,

    /// Set when a frontmatter block was opened but could not be parsed;
    /// carries (line, message).
    pub malformed: Option<(usize, String)>,
}

/// Parse YAML frontmatter from markdown content.
///
/// The block must open with a line that is exactly three hyphens and
/// runs to the matching closing line. A malformed interior never aborts
/// parsing; the issue is recorded and the document treated as having no
/// frontmatter fields.
pub fn parse_frontmatter(content: &str) -> Frontmatter {
    let lines: Vec<&str> = content.lines().collect();

    if lines.is_empty() || lines[0].trim_end() != "---" {
        return Frontmatter::default();
    }

    let close_idx = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim_end() == "---")
        .map(|(i, _)| i);

    let close_idx = match close_idx {
        Some(idx) => idx,
        None => {
            return Frontmatter {
                malformed: Some((1, "frontmatter block has no closing ---".to_string())),
                ..Default::default()
            }
        }
    };

    let yaml_content = lines[1..close_idx].join("\n");

    let mut fm = Frontmatter {
        end_line: close_idx + 1,
        ..Default::default()
    };

    let yaml_value: Yaml = match serde_yaml::from_str(&yaml_content) {
        Ok(v) => v,
        Err(e) => {
            fm.malformed = Some((e.location().map(|l| l.line() + 1).unwrap_or(2), e.to_string()));
            return fm;
        }
    };

    let map = match yaml_value {
        Yaml::Mapping(map) => map,
        Yaml::Null => return fm,
        _ => {
            fm.malformed = Some((2, "frontmatter must be a key/value mapping".to_string()));
            return fm;
        }
    };

    let key_lines = key_line_table(&lines[1..close_idx]);

    for (key, value) in map {
        let key_str = match key {
            Yaml::String(s) => s,
            other => {
                fm.malformed = Some((2, format!("non-string frontmatter key: {:?}", other)));
                continue;
            }
        };
        let line = key_lines
            .iter()
            .find(|(k, _)| *k == key_str)
            .map(|(_, l)| *l)
            .unwrap_or(2);

        match key_str.as_str() {
            "type" => {
                if let Yaml::String(t) = value {
                    fm.object_type = Some(t);
                }
            }
            "id" => {
                if let Yaml::String(i) = value {
                    fm.id = Some(i);
                }
            }
            "alias" => {
                if let Yaml::String(a) = value {
                    fm.alias = Some(a);
                }
            }
            "tags" => {
                fm.tags = parse_tags_value(&value);
            }
            _ => {
                fm.entries.push((key_str, value, line));
            }
        }
    }

    fm
}

/// Map top-level keys to their 1-indexed line in the file. The slice
/// starts at file line 2 (just after the opening `---`).
fn key_line_table(yaml_lines: &[&str]) -> Vec<(String, usize)> {
    let mut table = Vec::new();
    for (idx, line) in yaml_lines.iter().enumerate() {
        if line.starts_with(|c: char| c.is_whitespace()) {
            continue; // nested value
        }
        if let Some((key, _)) = line.split_once(':') {
            table.push((key.trim().to_string(), idx + 2));
        }
    }
    table
}

/// Parse tags from a YAML value (can be string or array)
fn parse_tags_value(value: &Yaml) -> Vec<String> {
    match value {
        Yaml::Sequence(arr) => arr
            .iter()
            .filter_map(|v| match v {
                Yaml::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Yaml::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frontmatter() {
        let content = r#"---
type: person
name: Freya
email: freya@example.com
---

# Freya
"#;
        let fm = parse_frontmatter(content);

        assert_eq!(fm.object_type, Some("person".to_string()));
        assert_eq!(fm.end_line, 5);
        assert_eq!(fm.entries.len(), 2);
        assert_eq!(fm.entries[0].0, "name");
        assert_eq!(fm.entries[0].2, 3);
    }

    #[test]
    fn test_reserved_keys() {
        let content = "---\ntype: person\nid: custom-id\nalias: The Queen\ntags: [a, b]\n---\n";
        let fm = parse_frontmatter(content);

        assert_eq!(fm.object_type.as_deref(), Some("person"));
        assert_eq!(fm.id.as_deref(), Some("custom-id"));
        assert_eq!(fm.alias.as_deref(), Some("The Queen"));
        assert_eq!(fm.tags, vec!["a", "b"]);
        assert!(fm.entries.is_empty());
    }

    #[test]
    fn test_no_frontmatter() {
        let content = "# Just a heading\n\nSome content";
        let fm = parse_frontmatter(content);

        assert!(fm.object_type.is_none());
        assert_eq!(fm.end_line, 0);
    }

    #[test]
    fn test_unclosed_frontmatter_is_malformed() {
        let content = "---\ntype: person\n\n# Heading";
        let fm = parse_frontmatter(content);

        assert!(fm.malformed.is_some());
        assert_eq!(fm.end_line, 0);
    }

    #[test]
    fn test_bad_yaml_is_malformed_not_fatal() {
        let content = "---\ntype: [unclosed\n---\n# Body still parses\n";
        let fm = parse_frontmatter(content);

        assert!(fm.malformed.is_some());
        assert_eq!(fm.end_line, 3);
    }
}
