//! Wiki-style reference extractor

use regex::Regex;

lazy_static::lazy_static! {
    // Matches [[target]] or [[target|display]]. The target may not
    // contain brackets, so the ref-list form [[[a]], [[b]]] resolves to
    // its inner [[a]] / [[b]] pairs rather than a nested reference.
    static ref REF_REGEX: Regex = Regex::new(
        r"\[\[([^\[\]|]+)(?:\|([^\[\]]+))?\]\]"
    ).unwrap();

    // An opening [[ with no closing ]] on the same line.
    static ref DANGLING_REF_REGEX: Regex = Regex::new(r"\[\[[^\]]*$").unwrap();
}

/// A reference occurrence in text.
#[derive(Debug, Clone, PartialEq)]
pub struct RefToken {
    /// The raw target (path, short name, alias, or date)
    pub target: String,

    /// Optional display text after `|`
    pub display: Option<String>,

    /// Line number (1-indexed)
    pub line: usize,

    /// Byte offset of `[[` in the line
    pub start: usize,

    /// Byte offset just past `]]`
    pub end: usize,
}

/// Extract all references from (masked) content, line by line.
pub fn extract_references(content: &str, start_line: usize) -> Vec<RefToken> {
    let mut refs = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_num = start_line + line_idx;

        for caps in REF_REGEX.captures_iter(line) {
            let full_match = caps.get(0).unwrap();
            let target = caps.get(1).unwrap().as_str().trim().to_string();
            let display = caps.get(2).map(|m| m.as_str().trim().to_string());

            if target.is_empty() {
                continue;
            }

            refs.push(RefToken {
                target,
                display,
                line: line_num,
                start: full_match.start(),
                end: full_match.end(),
            });
        }
    }

    refs
}

/// Lines containing an unterminated `[[`, for malformed_reference
/// diagnostics. Returns (line, column) pairs.
pub fn find_dangling_refs(content: &str, start_line: usize) -> Vec<(usize, usize)> {
    let mut dangling = Vec::new();
    for (line_idx, line) in content.lines().enumerate() {
        let cleaned = REF_REGEX.replace_all(line, "");
        if let Some(m) = DANGLING_REF_REGEX.find(&cleaned) {
            dangling.push((start_line + line_idx, m.start()));
        }
    }
    dangling
}

/// Check if a target references an embedded object (contains #)
pub fn is_embedded_ref(target: &str) -> bool {
    target.contains('#')
}

/// Split an embedded reference into (file part, fragment)
pub fn split_embedded_ref(target: &str) -> Option<(&str, &str)> {
    target.split_once('#')
}

/// The short name of a path-like target (last segment).
pub fn short_name(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_references() {
        let content = "Met with [[people/freya]] about [[projects/website]].";
        let refs = extract_references(content, 1);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].target, "people/freya");
        assert_eq!(refs[1].target, "projects/website");
    }

    #[test]
    fn test_extract_reference_with_display() {
        let content = "See [[people/freya|The Queen]] for details.";
        let refs = extract_references(content, 1);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "people/freya");
        assert_eq!(refs[0].display, Some("The Queen".to_string()));
    }

    #[test]
    fn test_ref_list_yields_individual_refs() {
        let content = "::meeting(attendees=[[[people/freya]], [[people/loki]]])";
        let refs = extract_references(content, 1);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].target, "people/freya");
        assert_eq!(refs[1].target, "people/loki");
    }

    #[test]
    fn test_extract_embedded_ref() {
        let content = "See [[daily/2026-02-01#standup]] for notes.";
        let refs = extract_references(content, 1);

        assert_eq!(refs.len(), 1);
        assert!(is_embedded_ref(&refs[0].target));
        let (path, id) = split_embedded_ref(&refs[0].target).unwrap();
        assert_eq!(path, "daily/2026-02-01");
        assert_eq!(id, "standup");
    }

    #[test]
    fn test_dangling_ref_detected() {
        let content = "a fine [[one]] and a broken [[oops\nnext line";
        let dangling = find_dangling_refs(content, 1);

        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].0, 1);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("people/freya"), "freya");
        assert_eq!(short_name("freya"), "freya");
    }
}
