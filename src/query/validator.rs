//! RQL validation against the schema
//!
//! Checks that names exist, predicates fit the query kind, enum values
//! are declared, and sub-queries are well-typed. Runs before planning
//! so execution never sees an ill-formed tree.

use crate::dates;
use crate::error::{RavenError, Result};
use crate::schema::{FieldKind, Schema, ValueKind};

use super::ast::{CompareOp, Pred, Query, QueryKind, RefTarget};

pub fn validate_query(query: &Query, schema: &Schema) -> Result<()> {
    match query.kind {
        QueryKind::Objects => {
            if schema.type_def(&query.name).is_none() {
                return Err(RavenError::UnknownName(format!(
                    "type '{}' is not defined in the schema",
                    query.name
                )));
            }
        }
        QueryKind::Traits => {
            if schema.trait_def(&query.name).is_none() {
                return Err(RavenError::UnknownName(format!(
                    "trait '{}' is not defined in the schema",
                    query.name
                )));
            }
        }
    }

    if let Some(pred) = &query.predicate {
        validate_pred(pred, query, schema)?;
    }

    Ok(())
}

fn validate_pred(pred: &Pred, query: &Query, schema: &Schema) -> Result<()> {
    match pred {
        Pred::And(terms) | Pred::Or(terms) => {
            for term in terms {
                validate_pred(term, query, schema)?;
            }
            Ok(())
        }
        Pred::Not(inner) => validate_pred(inner, query, schema),

        Pred::FieldEq { field, value } => {
            require_kind(query, QueryKind::Objects, "field predicates")?;
            let def = lookup_field(query, field, schema)?;
            if let Some(def) = def {
                if def.field_type == FieldKind::Enum {
                    let allowed = def.values.as_deref().unwrap_or(&[]);
                    if !allowed.iter().any(|v| v == value) {
                        return Err(RavenError::QueryValidation(format!(
                            "'{}' is not a declared value of enum field '{}' (expected one of: {})",
                            value,
                            field,
                            allowed.join(", ")
                        )));
                    }
                }
            }
            Ok(())
        }
        Pred::FieldExists { field } => {
            require_kind(query, QueryKind::Objects, "field predicates")?;
            lookup_field(query, field, schema)?;
            Ok(())
        }
        Pred::Has(sub) => {
            require_kind(query, QueryKind::Objects, "has:")?;
            require_sub_kind(sub, QueryKind::Traits, "has:")?;
            validate_query(sub, schema)
        }
        Pred::Parent(sub) | Pred::Ancestor(sub) | Pred::Child(sub) => {
            require_kind(query, QueryKind::Objects, "hierarchy predicates")?;
            require_sub_kind(sub, QueryKind::Objects, "hierarchy predicates")?;
            validate_query(sub, schema)
        }
        Pred::Refs(target) => {
            require_kind(query, QueryKind::Objects, "refs:")?;
            match target {
                RefTarget::Raw(raw) => {
                    if raw.trim().is_empty() {
                        return Err(RavenError::QueryValidation("refs: target is empty".to_string()));
                    }
                    Ok(())
                }
                RefTarget::Query(sub) => {
                    require_sub_kind(sub, QueryKind::Objects, "refs:")?;
                    validate_query(sub, schema)
                }
            }
        }

        Pred::Value { op, value } => {
            require_kind(query, QueryKind::Traits, "value:")?;
            if *op != CompareOp::Eq {
                return Err(RavenError::QueryValidation(
                    "comparison operators on value: are reserved and not supported yet".to_string(),
                ));
            }
            let def = schema.trait_def(&query.name);
            if let Some(def) = def {
                match def.kind {
                    ValueKind::Enum => {
                        let allowed = def.values.as_deref().unwrap_or(&[]);
                        if !allowed.iter().any(|v| v == value) {
                            return Err(RavenError::QueryValidation(format!(
                                "'{}' is not a declared value of enum trait '{}' (expected one of: {})",
                                value,
                                query.name,
                                allowed.join(", ")
                            )));
                        }
                    }
                    ValueKind::Date | ValueKind::Datetime => {
                        // Relative vocabulary resolves at execution; here
                        // we only need the word to be meaningful.
                        let probe_day = chrono::NaiveDate::from_ymd_opt(2000, 1, 3).unwrap();
                        if dates::resolve_date_word(value, probe_day).is_none() {
                            return Err(RavenError::QueryValidation(format!(
                                "'{}' is not a date or relative date word for trait '{}'",
                                value, query.name
                            )));
                        }
                    }
                    ValueKind::Boolean => {
                        if value != "true" && value != "false" {
                            return Err(RavenError::QueryValidation(format!(
                                "'{}' is not a boolean value for trait '{}'",
                                value, query.name
                            )));
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        Pred::Source(_) => require_kind(query, QueryKind::Traits, "source:"),
        Pred::On(sub) | Pred::Within(sub) => {
            require_kind(query, QueryKind::Traits, "on:/within:")?;
            require_sub_kind(sub, QueryKind::Objects, "on:/within:")?;
            validate_query(sub, schema)
        }
    }
}

fn require_kind(query: &Query, expected: QueryKind, what: &str) -> Result<()> {
    if query.kind != expected {
        let kind = match query.kind {
            QueryKind::Objects => "object",
            QueryKind::Traits => "trait",
        };
        return Err(RavenError::QueryValidation(format!(
            "{} cannot be used in a {} query",
            what, kind
        )));
    }
    Ok(())
}

fn require_sub_kind(sub: &Query, expected: QueryKind, what: &str) -> Result<()> {
    if sub.kind != expected {
        let need = match expected {
            QueryKind::Objects => "an object",
            QueryKind::Traits => "a trait",
        };
        return Err(RavenError::QueryValidation(format!(
            "{} takes {} sub-query",
            what, need
        )));
    }
    Ok(())
}

/// Returns the field definition when the type declares it; `tags` is
/// always queryable.
fn lookup_field<'a>(
    query: &Query,
    field: &str,
    schema: &'a Schema,
) -> Result<Option<&'a crate::schema::FieldDefinition>> {
    if field == "tags" {
        return Ok(None);
    }
    let type_def = schema
        .type_def(&query.name)
        .expect("type existence checked before fields");
    match type_def.fields.get(field) {
        Some(def) => Ok(Some(def)),
        None => Err(RavenError::UnknownName(format!(
            "'{}' is not a field of type '{}'",
            field, query.name
        ))),
    }
}
