//! Inline trait annotation parser - @name and @name(value)

use regex::Regex;

lazy_static::lazy_static! {
    // @name where @ sits at start of line or after whitespace. The value,
    // if any, is scanned by hand from the opening paren.
    static ref TRAIT_START_REGEX: Regex = Regex::new(r"(?:^|\s)@([A-Za-z_]\w*)").unwrap();
}

/// An inline trait occurrence on a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitToken {
    /// The trait name (e.g., "due", "priority")
    pub name: String,

    /// The value; the bare form records the literal "true".
    pub value: String,

    /// Byte offset of the `@` in the line
    pub start: usize,

    /// Byte offset just past the annotation
    pub end: usize,
}

/// Problem found while scanning a line for traits.
#[derive(Debug, Clone)]
pub struct TraitIssue {
    pub column: usize,
    pub message: String,
}

/// Parse all trait annotations on one line, left to right.
pub fn parse_trait_annotations(line: &str) -> (Vec<TraitToken>, Vec<TraitIssue>) {
    let mut tokens = Vec::new();
    let mut issues = Vec::new();

    for caps in TRAIT_START_REGEX.captures_iter(line) {
        let name_match = caps.get(1).unwrap();
        let name = name_match.as_str().to_string();
        let at_pos = name_match.start() - 1;

        let after_name = &line[name_match.end()..];
        if let Some(rest) = after_name.strip_prefix('(') {
            match scan_value(rest) {
                Some(consumed) => {
                    let value = rest[..consumed].trim().to_string();
                    tokens.push(TraitToken {
                        name,
                        value: if value.is_empty() { "true".to_string() } else { value },
                        start: at_pos,
                        end: name_match.end() + 1 + consumed + 1,
                    });
                }
                None => {
                    issues.push(TraitIssue {
                        column: at_pos,
                        message: format!("unclosed value for @{}", name),
                    });
                }
            }
        } else {
            tokens.push(TraitToken {
                name,
                value: "true".to_string(),
                start: at_pos,
                end: name_match.end(),
            });
        }
    }

    (tokens, issues)
}

/// Length of the value before the matching close paren, honouring one
/// level of square-bracket nesting (for `@owner([[people/freya]])`).
fn scan_value(s: &str) -> Option<usize> {
    let mut paren_depth = 0i32;
    let mut bracket_depth = 0i32;

    for (i, c) in s.char_indices() {
        match c {
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            '(' => paren_depth += 1,
            ')' if bracket_depth == 0 => {
                if paren_depth == 0 {
                    return Some(i);
                }
                paren_depth -= 1;
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valued_trait() {
        let (tokens, issues) = parse_trait_annotations("- @due(2026-02-10) Call Freya");

        assert!(issues.is_empty());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].name, "due");
        assert_eq!(tokens[0].value, "2026-02-10");
    }

    #[test]
    fn test_parse_bare_trait_is_true() {
        let (tokens, _) = parse_trait_annotations("- @done finished the report");

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].name, "done");
        assert_eq!(tokens[0].value, "true");
    }

    #[test]
    fn test_multiple_traits_left_to_right() {
        let (tokens, _) = parse_trait_annotations("- @due(2026-02-10) @priority(high) Fix the bug");

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].name, "due");
        assert_eq!(tokens[1].name, "priority");
        assert_eq!(tokens[1].value, "high");
    }

    #[test]
    fn test_ref_value_with_brackets() {
        let (tokens, _) = parse_trait_annotations("@owner([[people/freya]])");

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, "[[people/freya]]");
    }

    #[test]
    fn test_email_address_is_not_a_trait() {
        let (tokens, _) = parse_trait_annotations("mail freya@example.com today");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_unclosed_value_is_reported() {
        let (tokens, issues) = parse_trait_annotations("- @due(2026-02-10 Call");
        assert!(tokens.is_empty());
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("unclosed"));
    }

    #[test]
    fn test_no_traits() {
        let (tokens, issues) = parse_trait_annotations("Just a regular line of text");
        assert!(tokens.is_empty());
        assert!(issues.is_empty());
    }
}
