//! RQL lexer
//!
//! Splits query text into words and structural tokens. A word keeps
//! going through `[[...]]` and quoted spans, so targets and values may
//! contain spaces (`refs:[[The Queen]]`, `.title:"a b"`).

use crate::error::{RavenError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Bang,
    Pipe,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Bang => write!(f, "!"),
            Token::Pipe => write!(f, "|"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
        }
    }
}

/// A token plus its byte offset in the source, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn lex(input: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let structural = match c {
            '!' => Some(Token::Bang),
            '|' => Some(Token::Pipe),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = structural {
            tokens.push(Spanned { token, offset });
            i += 1;
            continue;
        }

        // A word: runs to whitespace or a structural character, except
        // inside [[...]] or "..." spans.
        let start = offset;
        let word_start = i;
        let mut in_quotes = false;
        let mut bracket_depth = 0usize;

        while i < chars.len() {
            let c = chars[i].1;
            if in_quotes {
                if c == '"' {
                    in_quotes = false;
                }
                i += 1;
                continue;
            }
            if bracket_depth > 0 {
                if c == ']' && chars.get(i + 1).map(|&(_, n)| n) == Some(']') {
                    bracket_depth -= 1;
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            match c {
                '"' => {
                    in_quotes = true;
                    i += 1;
                }
                '[' if chars.get(i + 1).map(|&(_, n)| n) == Some('[') => {
                    bracket_depth += 1;
                    i += 2;
                }
                c if c.is_whitespace() => break,
                '!' | '|' | '(' | ')' | '{' | '}' => break,
                _ => i += 1,
            }
        }

        if in_quotes {
            return Err(RavenError::QueryParse(format!(
                "unterminated string starting at offset {}",
                start
            )));
        }
        if bracket_depth > 0 {
            return Err(RavenError::QueryParse(format!(
                "unterminated [[ starting at offset {}",
                start
            )));
        }
        debug_assert!(i > word_start);

        let end = chars.get(i).map(|&(o, _)| o).unwrap_or(input.len());
        tokens.push(Spanned {
            token: Token::Word(input[start..end].to_string()),
            offset: start,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            words("object:project .status:active"),
            vec![
                Token::Word("object:project".to_string()),
                Token::Word(".status:active".to_string()),
            ]
        );
    }

    #[test]
    fn test_structural_tokens() {
        assert_eq!(
            words("!has:{trait:due} | .x:*"),
            vec![
                Token::Bang,
                Token::Word("has:".to_string()),
                Token::LBrace,
                Token::Word("trait:due".to_string()),
                Token::RBrace,
                Token::Pipe,
                Token::Word(".x:*".to_string()),
            ]
        );
    }

    #[test]
    fn test_bracketed_target_keeps_spaces() {
        assert_eq!(
            words("refs:[[The Queen]]"),
            vec![Token::Word("refs:[[The Queen]]".to_string())]
        );
    }

    #[test]
    fn test_quoted_value_keeps_spaces_and_specials() {
        assert_eq!(
            words(r#".title:"a (b) | c""#),
            vec![Token::Word(r#".title:"a (b) | c""#.to_string())]
        );
    }

    #[test]
    fn test_unterminated_bracket_errors() {
        assert!(lex("refs:[[oops").is_err());
        assert!(lex(r#".t:"oops"#).is_err());
    }
}
