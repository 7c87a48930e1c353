//! RQL planning
//!
//! The planner reorders AND groups so the cheapest, most selective
//! predicates run first: `.field` equality > has > parent/on >
//! ancestor/within > refs > child. The sort is stable, so predicates of
//! equal rank keep their tree position and repeated runs produce
//! identical evaluation order.

use super::ast::{Pred, Query};

/// Lower a validated query into its execution order.
pub fn plan_query(mut query: Query) -> Query {
    if let Some(pred) = query.predicate.take() {
        query.predicate = Some(plan_pred(pred));
    }
    query
}

fn plan_pred(pred: Pred) -> Pred {
    match pred {
        Pred::And(terms) => {
            let mut terms: Vec<Pred> = terms.into_iter().map(plan_pred).collect();
            terms.sort_by_key(rank);
            Pred::And(terms)
        }
        Pred::Or(terms) => Pred::Or(terms.into_iter().map(plan_pred).collect()),
        Pred::Not(inner) => Pred::Not(Box::new(plan_pred(*inner))),
        Pred::Has(sub) => Pred::Has(Box::new(plan_query(*sub))),
        Pred::Parent(sub) => Pred::Parent(Box::new(plan_query(*sub))),
        Pred::Ancestor(sub) => Pred::Ancestor(Box::new(plan_query(*sub))),
        Pred::Child(sub) => Pred::Child(Box::new(plan_query(*sub))),
        Pred::On(sub) => Pred::On(Box::new(plan_query(*sub))),
        Pred::Within(sub) => Pred::Within(Box::new(plan_query(*sub))),
        leaf => leaf,
    }
}

fn rank(pred: &Pred) -> u8 {
    match pred {
        Pred::FieldEq { .. } | Pred::FieldExists { .. } | Pred::Value { .. } | Pred::Source(_) => 0,
        Pred::Has(_) => 1,
        Pred::Parent(_) | Pred::On(_) => 2,
        Pred::Ancestor(_) | Pred::Within(_) => 3,
        Pred::Refs(_) => 4,
        Pred::Child(_) => 5,
        Pred::Not(inner) => rank(inner),
        // Composites run where their cheapest member would.
        Pred::And(terms) | Pred::Or(terms) => terms.iter().map(rank).min().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_query;

    #[test]
    fn test_and_reordered_by_selectivity() {
        let q = parse_query("object:meeting child:{object:project} .time:09:00 has:due").unwrap();
        let planned = plan_query(q);

        match planned.predicate.unwrap() {
            Pred::And(terms) => {
                assert!(matches!(terms[0], Pred::FieldEq { .. }));
                assert!(matches!(terms[1], Pred::Has(_)));
                assert!(matches!(terms[2], Pred::Child(_)));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_stable_for_equal_ranks() {
        let q = parse_query("object:project .status:active .priority:high").unwrap();
        let planned = plan_query(q);

        match planned.predicate.unwrap() {
            Pred::And(terms) => {
                assert_eq!(
                    terms,
                    vec![
                        Pred::FieldEq {
                            field: "status".to_string(),
                            value: "active".to_string()
                        },
                        Pred::FieldEq {
                            field: "priority".to_string(),
                            value: "high".to_string()
                        },
                    ]
                );
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_subqueries_planned_too() {
        let q = parse_query("object:date child:{object:project refs:[[x]] .status:active}").unwrap();
        let planned = plan_query(q);

        match planned.predicate.unwrap() {
            Pred::Child(sub) => match sub.predicate.unwrap() {
                Pred::And(terms) => {
                    assert!(matches!(terms[0], Pred::FieldEq { .. }));
                    assert!(matches!(terms[1], Pred::Refs(_)));
                }
                other => panic!("expected And, got {:?}", other),
            },
            other => panic!("expected Child, got {:?}", other),
        }
    }
}
