//! Saved queries
//!
//! Named entries in vault config hold a query string and positional
//! placeholders `$1..$n`. Argument strings are tokenised shell-style
//! (quotes group, whitespace splits) and interpolated textually before
//! parsing, so argument values participate in predicate validation.

use crate::error::{RavenError, Result};
use crate::vault::SavedQuery;

/// Split an argument string the way a shell would: whitespace separates
/// tokens, single or double quotes group.
pub fn shell_split(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(RavenError::QueryParse("unterminated quote in arguments".to_string()));
    }
    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Expand a saved query's `$1..$n` placeholders with positional args.
pub fn expand_saved_query(saved: &SavedQuery, args: &[String]) -> Result<String> {
    let mut text = saved.query.clone();

    // Highest placeholder first so $10 is not clobbered by $1.
    for (i, arg) in args.iter().enumerate().rev() {
        text = text.replace(&format!("${}", i + 1), arg);
    }

    if let Some(pos) = find_placeholder(&text) {
        let declared = saved.args.as_ref().map(|a| a.len()).unwrap_or(0).max(args.len());
        return Err(RavenError::QueryParse(format!(
            "saved query still has unbound placeholder {} ({} argument(s) given)",
            pos, declared
        )));
    }

    Ok(text)
}

fn find_placeholder(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'$' && bytes.get(i + 1).map_or(false, |c| c.is_ascii_digit()) {
            let end = bytes[i + 1..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .count();
            return Some(text[i..i + 1 + end].to_string());
        }
    }
    None
}
