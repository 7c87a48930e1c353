//! RQL parser - recursive descent over the token stream
//!
//! Precedence: `!` (tightest), juxtaposition (and), `|` (loosest).
//! Parentheses group; `{...}` opens a sub-query with the same grammar.
//! Shorthands expand here: `has:x` -> `has:{trait:x}`, `parent:x` ->
//! `parent:{object:x}`, and likewise for ancestor/child/on/within.

use crate::error::{RavenError, Result};
use crate::parser::TraitSource;

use super::ast::{CompareOp, Pred, Query, QueryKind, RefTarget};
use super::lexer::{lex, Spanned, Token};

pub fn parse_query(text: &str) -> Result<Query> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let query = parser.query()?;

    if let Some(extra) = parser.peek() {
        return Err(RavenError::QueryParse(format!(
            "unexpected '{}' after end of query",
            extra
        )));
    }

    Ok(query)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(RavenError::QueryParse(format!(
                "expected '{}', found '{}'",
                expected, token
            ))),
            None => Err(RavenError::QueryParse(format!(
                "expected '{}', found end of query",
                expected
            ))),
        }
    }

    /// `query := head predicate-expr?`
    fn query(&mut self) -> Result<Query> {
        let head = match self.advance() {
            Some(Token::Word(w)) => w,
            Some(token) => {
                return Err(RavenError::QueryParse(format!(
                    "expected 'object:<type>' or 'trait:<name>', found '{}'",
                    token
                )))
            }
            None => return Err(RavenError::QueryParse("empty query".to_string())),
        };

        let (kind, name) = if let Some(name) = head.strip_prefix("object:") {
            (QueryKind::Objects, name)
        } else if let Some(name) = head.strip_prefix("trait:") {
            (QueryKind::Traits, name)
        } else {
            return Err(RavenError::QueryParse(format!(
                "query must start with 'object:<type>' or 'trait:<name>', found '{}'",
                head
            )));
        };
        if name.is_empty() {
            return Err(RavenError::QueryParse(format!("'{}' is missing a name", head)));
        }

        let predicate = if matches!(self.peek(), None | Some(Token::RBrace)) {
            None
        } else {
            Some(self.or_expr()?)
        };

        Ok(Query {
            kind,
            name: name.to_string(),
            predicate,
        })
    }

    fn or_expr(&mut self) -> Result<Pred> {
        let mut terms = vec![self.and_expr()?];

        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            terms.push(self.and_expr()?);
        }

        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Pred::Or(terms)
        })
    }

    fn and_expr(&mut self) -> Result<Pred> {
        let mut terms = vec![self.unary()?];

        loop {
            match self.peek() {
                None | Some(Token::Pipe) | Some(Token::RBrace) | Some(Token::RParen) => break,
                _ => terms.push(self.unary()?),
            }
        }

        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Pred::And(terms)
        })
    }

    fn unary(&mut self) -> Result<Pred> {
        if matches!(self.peek(), Some(Token::Bang)) {
            self.advance();
            return Ok(Pred::Not(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Pred> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(word)) => self.predicate_from_word(&word),
            Some(token) => Err(RavenError::QueryParse(format!(
                "expected a predicate, found '{}'",
                token
            ))),
            None => Err(RavenError::QueryParse(
                "expected a predicate, found end of query".to_string(),
            )),
        }
    }

    fn predicate_from_word(&mut self, word: &str) -> Result<Pred> {
        // Field predicates: .field:value / .field:*
        if let Some(rest) = word.strip_prefix('.') {
            let (field, value) = rest.split_once(':').ok_or_else(|| {
                RavenError::QueryParse(format!("field predicate '.{}' is missing ':'", rest))
            })?;
            if field.is_empty() {
                return Err(RavenError::QueryParse(format!("empty field name in '{}'", word)));
            }
            return Ok(if value == "*" {
                Pred::FieldExists {
                    field: field.to_string(),
                }
            } else {
                Pred::FieldEq {
                    field: field.to_string(),
                    value: unquote(value),
                }
            });
        }

        // Sub-query predicates with shorthand expansion
        for (prefix, shorthand_kind) in [
            ("has:", QueryKind::Traits),
            ("parent:", QueryKind::Objects),
            ("ancestor:", QueryKind::Objects),
            ("child:", QueryKind::Objects),
            ("on:", QueryKind::Objects),
            ("within:", QueryKind::Objects),
        ] {
            let Some(rest) = word.strip_prefix(prefix) else { continue };
            let sub = if rest.is_empty() {
                self.braced_query()?
            } else {
                Query {
                    kind: shorthand_kind,
                    name: rest.to_string(),
                    predicate: None,
                }
            };
            let sub = Box::new(sub);
            return Ok(match prefix {
                "has:" => Pred::Has(sub),
                "parent:" => Pred::Parent(sub),
                "ancestor:" => Pred::Ancestor(sub),
                "child:" => Pred::Child(sub),
                "on:" => Pred::On(sub),
                _ => Pred::Within(sub),
            });
        }

        if let Some(rest) = word.strip_prefix("refs:") {
            if rest.is_empty() {
                return Ok(Pred::Refs(RefTarget::Query(Box::new(self.braced_query()?))));
            }
            if rest.starts_with("[[") && rest.ends_with("]]") && rest.len() > 4 {
                let inner = &rest[2..rest.len() - 2];
                // A |display suffix is legal in source text; only the
                // target part addresses an object.
                let target = inner.split('|').next().unwrap_or(inner).trim();
                return Ok(Pred::Refs(RefTarget::Raw(target.to_string())));
            }
            return Err(RavenError::QueryParse(format!(
                "refs: expects [[target]] or {{object:...}}, found '{}'",
                rest
            )));
        }

        if let Some(rest) = word.strip_prefix("value:") {
            let (op, raw) = if let Some(v) = rest.strip_prefix("<=") {
                (CompareOp::Le, v)
            } else if let Some(v) = rest.strip_prefix(">=") {
                (CompareOp::Ge, v)
            } else if let Some(v) = rest.strip_prefix('<') {
                (CompareOp::Lt, v)
            } else if let Some(v) = rest.strip_prefix('>') {
                (CompareOp::Gt, v)
            } else {
                (CompareOp::Eq, rest)
            };
            return Ok(Pred::Value {
                op,
                value: unquote(raw),
            });
        }

        if let Some(rest) = word.strip_prefix("source:") {
            return match rest {
                "inline" => Ok(Pred::Source(TraitSource::Inline)),
                "frontmatter" => Ok(Pred::Source(TraitSource::Frontmatter)),
                other => Err(RavenError::QueryParse(format!(
                    "source: expects 'inline' or 'frontmatter', found '{}'",
                    other
                ))),
            };
        }

        if word.starts_with("object:") || word.starts_with("trait:") {
            return Err(RavenError::QueryParse(format!(
                "'{}' starts a query, not a predicate; wrap sub-queries in {{...}}",
                word
            )));
        }

        Err(RavenError::QueryParse(format!("unknown predicate '{}'", word)))
    }

    fn braced_query(&mut self) -> Result<Query> {
        self.expect(&Token::LBrace)?;
        let query = self.query()?;
        self.expect(&Token::RBrace)?;
        Ok(query)
    }
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bare_head() {
        let q = parse_query("object:project").unwrap();
        assert_eq!(q, Query::objects("project", None));
    }

    #[test]
    fn test_field_predicates() {
        let q = parse_query("object:project .status:active .due:*").unwrap();
        assert_eq!(
            q.predicate,
            Some(Pred::And(vec![
                Pred::FieldEq {
                    field: "status".to_string(),
                    value: "active".to_string()
                },
                Pred::FieldExists {
                    field: "due".to_string()
                },
            ]))
        );
    }

    #[test]
    fn test_shorthand_expands_to_subquery() {
        let short = parse_query("object:project has:due").unwrap();
        let long = parse_query("object:project has:{trait:due}").unwrap();
        assert_eq!(short, long);

        let short = parse_query("object:meeting parent:date").unwrap();
        let long = parse_query("object:meeting parent:{object:date}").unwrap();
        assert_eq!(short, long);
    }

    #[test]
    fn test_precedence_not_and_or() {
        // !a b | c parses as ((!a AND b) OR c)
        let q = parse_query("object:project !.status:done .priority:high | .status:paused").unwrap();
        match q.predicate.unwrap() {
            Pred::Or(terms) => {
                assert_eq!(terms.len(), 2);
                match &terms[0] {
                    Pred::And(inner) => {
                        assert!(matches!(inner[0], Pred::Not(_)));
                        assert_eq!(inner.len(), 2);
                    }
                    other => panic!("expected And, got {:?}", other),
                }
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_parens_override() {
        let q = parse_query("object:project .a:1 (.b:2 | .c:3)").unwrap();
        match q.predicate.unwrap() {
            Pred::And(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[1], Pred::Or(_)));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_subqueries() {
        let q = parse_query(
            "object:meeting ancestor:{object:date child:{object:project .status:active}}",
        )
        .unwrap();
        match q.predicate.unwrap() {
            Pred::Ancestor(sub) => {
                assert_eq!(sub.name, "date");
                match sub.predicate.unwrap() {
                    Pred::Child(inner) => {
                        assert_eq!(inner.name, "project");
                        assert!(inner.predicate.is_some());
                    }
                    other => panic!("expected Child, got {:?}", other),
                }
            }
            other => panic!("expected Ancestor, got {:?}", other),
        }
    }

    #[test]
    fn test_refs_raw_and_subquery() {
        let q = parse_query("object:date refs:[[people/freya]]").unwrap();
        assert_eq!(
            q.predicate,
            Some(Pred::Refs(RefTarget::Raw("people/freya".to_string())))
        );

        let q = parse_query("object:date refs:{object:person .name:Freya}").unwrap();
        assert!(matches!(q.predicate, Some(Pred::Refs(RefTarget::Query(_)))));
    }

    #[test]
    fn test_trait_query_predicates() {
        let q = parse_query("trait:due value:today source:inline on:{object:date}").unwrap();
        assert_eq!(q.kind, QueryKind::Traits);
        match q.predicate.unwrap() {
            Pred::And(terms) => {
                assert_eq!(
                    terms[0],
                    Pred::Value {
                        op: CompareOp::Eq,
                        value: "today".to_string()
                    }
                );
                assert_eq!(terms[1], Pred::Source(TraitSource::Inline));
                assert!(matches!(terms[2], Pred::On(_)));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_comparison_lexes() {
        let q = parse_query("trait:due value:<2026-01-01").unwrap();
        assert_eq!(
            q.predicate,
            Some(Pred::Value {
                op: CompareOp::Lt,
                value: "2026-01-01".to_string()
            })
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_query("").is_err());
        assert!(parse_query("project").is_err());
        assert!(parse_query("object:project bogus").is_err());
        assert!(parse_query("object:project has:{object:x}").is_ok()); // kind checked by validator
        assert!(parse_query("object:project (.a:1").is_err());
        assert!(parse_query("object:project trait:due").is_err());
    }
}
