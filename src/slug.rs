//! Slug normalisation for fragments, aliases, and filenames
//!
//! Rules: lowercase; Unicode letters and digits preserved; runs of
//! space/hyphen/underscore/colon collapse to a single hyphen; other
//! punctuation is stripped; trailing hyphens trimmed.

/// Normalise text into a slug.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else if matches!(c, ' ' | '-' | '_' | ':' | '\t') {
            pending_hyphen = true;
        }
        // Other punctuation is dropped without breaking the run.
    }

    out
}

/// Case-insensitive slug equality, used for alias matching.
pub fn slug_eq(a: &str, b: &str) -> bool {
    slugify(a) == slugify(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(slugify("Weekly Standup"), "weekly-standup");
        assert_eq!(slugify("Tasks"), "tasks");
    }

    #[test]
    fn test_collapsed_separators() {
        assert_eq!(slugify("a - b"), "a-b");
        assert_eq!(slugify("a__b::c"), "a-b-c");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
    }

    #[test]
    fn test_punctuation_stripped() {
        assert_eq!(slugify("What's next?"), "whats-next");
        assert_eq!(slugify("v1.2 (draft)"), "v12-draft");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(slugify("Über Café"), "über-café");
        assert_eq!(slugify("日本語 メモ"), "日本語-メモ");
    }

    #[test]
    fn test_trailing_hyphens_trimmed() {
        assert_eq!(slugify("ends with dash -"), "ends-with-dash");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_alias_equality() {
        assert!(slug_eq("The Queen", "the-queen"));
        assert!(slug_eq("The  Queen", "THE_QUEEN"));
        assert!(!slug_eq("The Queen", "the-king"));
    }
}
