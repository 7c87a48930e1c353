//! RQL execution
//!
//! The executor materialises the object/trait/ref tables once, runs the
//! root scan for the query's kind, and evaluates the predicate tree per
//! row with standard set algebra. Sub-queries lower to semi-joins: each
//! distinct sub-query is evaluated once into an id set and membership
//! is tested per candidate row. Ancestor traversal walks `parent_id`
//! upward, bounded by the heading depth of a file.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::cancel::CancelToken;
use crate::dates;
use crate::error::Result;
use crate::index::{Database, ObjectRow, TraitRow};
use crate::resolver::{Resolution, Resolver, ResolverEntry};
use crate::schema::{Schema, ValueKind};
use crate::vault::VaultConfig;

use super::ast::{Pred, Query, QueryKind, RefTarget};

/// Rows returned by a query; exactly one variant per run.
#[derive(Debug)]
pub enum QueryRows {
    Objects(Vec<ObjectRow>),
    Traits(Vec<TraitRow>),
}

impl QueryRows {
    pub fn len(&self) -> usize {
        match self {
            QueryRows::Objects(rows) => rows.len(),
            QueryRows::Traits(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory evaluation context over a point-in-time index snapshot.
pub struct Executor<'a> {
    schema: &'a Schema,
    today: NaiveDate,
    cancel: CancelToken,

    objects: HashMap<String, ObjectRow>,
    ids_by_type: HashMap<String, Vec<String>>,
    children: HashMap<String, Vec<String>>,

    traits: Vec<TraitRow>,
    trait_idx_by_name: HashMap<String, Vec<usize>>,
    trait_idx_by_parent: HashMap<String, Vec<usize>>,

    ref_targets_by_source: HashMap<String, Vec<Option<String>>>,
    resolver: Resolver,

    // Sub-query semi-join memos, keyed by AST node address.
    object_set_memo: HashMap<usize, Rc<HashSet<String>>>,
    trait_set_memo: HashMap<usize, Rc<HashSet<usize>>>,
}

impl<'a> Executor<'a> {
    /// Snapshot the index into an evaluation context.
    pub fn new(
        db: &Database,
        schema: &'a Schema,
        config: &VaultConfig,
        today: NaiveDate,
        cancel: CancelToken,
    ) -> Result<Self> {
        let object_rows = db.all_objects()?;
        let trait_rows = db.all_traits()?;
        let ref_rows = db.all_refs()?;

        let name_fields: HashMap<&str, &str> = schema.name_fields().collect();
        let mut resolver = Resolver::new(
            config.daily_directory.clone(),
            config.directories.object.clone(),
            config.directories.page.clone(),
        );

        let mut objects = HashMap::with_capacity(object_rows.len());
        let mut ids_by_type: HashMap<String, Vec<String>> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();

        for row in object_rows {
            let name_value = name_fields
                .get(row.object_type.as_str())
                .and_then(|field| row.fields.get(*field))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            resolver.insert(ResolverEntry {
                id: row.id.clone(),
                alias: row.alias.clone(),
                name_value,
            });

            ids_by_type.entry(row.object_type.clone()).or_default().push(row.id.clone());
            if let Some(parent) = &row.parent_id {
                children.entry(parent.clone()).or_default().push(row.id.clone());
            }
            objects.insert(row.id.clone(), row);
        }

        let mut trait_idx_by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut trait_idx_by_parent: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, row) in trait_rows.iter().enumerate() {
            trait_idx_by_name.entry(row.name.clone()).or_default().push(idx);
            trait_idx_by_parent.entry(row.parent_id.clone()).or_default().push(idx);
        }

        let mut ref_targets_by_source: HashMap<String, Vec<Option<String>>> = HashMap::new();
        for row in ref_rows {
            ref_targets_by_source
                .entry(row.source_id.clone())
                .or_default()
                .push(row.target_id.clone());
        }

        Ok(Executor {
            schema,
            today,
            cancel,
            objects,
            ids_by_type,
            children,
            traits: trait_rows,
            trait_idx_by_name,
            trait_idx_by_parent,
            ref_targets_by_source,
            resolver,
            object_set_memo: HashMap::new(),
            trait_set_memo: HashMap::new(),
        })
    }

    /// Run a planned query. Row order is deterministic: the root scans
    /// come out of the store ordered by (file_path, line).
    pub fn execute(&mut self, query: &Query) -> Result<QueryRows> {
        match query.kind {
            QueryKind::Objects => {
                let ids = self.matching_object_ids(query)?;
                Ok(QueryRows::Objects(
                    ids.iter().map(|id| self.objects[id].clone()).collect(),
                ))
            }
            QueryKind::Traits => {
                let idxs = self.matching_trait_idxs(query)?;
                Ok(QueryRows::Traits(
                    idxs.iter().map(|&i| self.traits[i].clone()).collect(),
                ))
            }
        }
    }

    fn matching_object_ids(&mut self, query: &Query) -> Result<Vec<String>> {
        let candidates = self.ids_by_type.get(&query.name).cloned().unwrap_or_default();
        let mut out = Vec::new();

        for id in candidates {
            self.cancel.check()?;
            let matches = match &query.predicate {
                Some(pred) => self.eval_object(pred, &id)?,
                None => true,
            };
            if matches {
                out.push(id);
            }
        }

        Ok(out)
    }

    fn matching_trait_idxs(&mut self, query: &Query) -> Result<Vec<usize>> {
        let candidates = self.trait_idx_by_name.get(&query.name).cloned().unwrap_or_default();
        let mut out = Vec::new();

        for idx in candidates {
            self.cancel.check()?;
            let matches = match &query.predicate {
                Some(pred) => self.eval_trait(pred, idx)?,
                None => true,
            };
            if matches {
                out.push(idx);
            }
        }

        Ok(out)
    }

    fn eval_object(&mut self, pred: &Pred, id: &str) -> Result<bool> {
        match pred {
            Pred::And(terms) => {
                for term in terms {
                    self.cancel.check()?;
                    if !self.eval_object(term, id)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pred::Or(terms) => {
                for term in terms {
                    self.cancel.check()?;
                    if self.eval_object(term, id)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pred::Not(inner) => Ok(!self.eval_object(inner, id)?),

            Pred::FieldEq { field, value } => Ok(self.field_eq(id, field, value)),
            Pred::FieldExists { field } => {
                let obj = &self.objects[id];
                Ok(matches!(obj.fields.get(field), Some(v) if !v.is_null()))
            }

            Pred::Has(sub) => {
                let matching = self.trait_set(sub)?;
                let idxs = self.trait_idx_by_parent.get(id).cloned().unwrap_or_default();
                Ok(idxs.iter().any(|idx| matching.contains(idx)))
            }

            Pred::Parent(sub) => {
                let set = self.object_set(sub)?;
                let parent = self.objects[id].parent_id.clone();
                Ok(parent.map_or(false, |p| set.contains(&p)))
            }

            Pred::Ancestor(sub) => {
                let set = self.object_set(sub)?;
                Ok(self.any_ancestor(id, |ancestor| set.contains(ancestor)))
            }

            Pred::Child(sub) => {
                let set = self.object_set(sub)?;
                let kids = self.children.get(id).cloned().unwrap_or_default();
                Ok(kids.iter().any(|kid| set.contains(kid)))
            }

            Pred::Refs(target) => {
                let target_set: Rc<HashSet<String>> = match target {
                    RefTarget::Raw(raw) => {
                        let mut set = HashSet::new();
                        if let Resolution::Resolved(target_id) = self.resolver.resolve(raw) {
                            set.insert(target_id);
                        }
                        Rc::new(set)
                    }
                    RefTarget::Query(sub) => self.object_set(sub)?,
                };
                let targets = self.ref_targets_by_source.get(id).cloned().unwrap_or_default();
                Ok(targets
                    .iter()
                    .flatten()
                    .any(|target_id| target_set.contains(target_id)))
            }

            // Kind mismatches are rejected during validation.
            _ => Ok(false),
        }
    }

    fn eval_trait(&mut self, pred: &Pred, idx: usize) -> Result<bool> {
        match pred {
            Pred::And(terms) => {
                for term in terms {
                    self.cancel.check()?;
                    if !self.eval_trait(term, idx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pred::Or(terms) => {
                for term in terms {
                    self.cancel.check()?;
                    if self.eval_trait(term, idx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pred::Not(inner) => Ok(!self.eval_trait(inner, idx)?),

            Pred::Value { value, .. } => {
                let row = &self.traits[idx];
                Ok(self.trait_value_eq(&row.name.clone(), &row.value.clone(), value))
            }
            Pred::Source(source) => Ok(self.traits[idx].source == *source),

            Pred::On(sub) => {
                let set = self.object_set(sub)?;
                Ok(set.contains(&self.traits[idx].parent_id))
            }
            Pred::Within(sub) => {
                let set = self.object_set(sub)?;
                let parent = self.traits[idx].parent_id.clone();
                if set.contains(&parent) {
                    return Ok(true);
                }
                Ok(self.any_ancestor(&parent, |ancestor| set.contains(ancestor)))
            }

            _ => Ok(false),
        }
    }

    /// Semi-join set for an object sub-query, computed once per AST node.
    fn object_set(&mut self, sub: &Query) -> Result<Rc<HashSet<String>>> {
        let key = sub as *const Query as usize;
        if let Some(set) = self.object_set_memo.get(&key) {
            return Ok(Rc::clone(set));
        }
        let ids = self.matching_object_ids(sub)?;
        let set = Rc::new(ids.into_iter().collect::<HashSet<_>>());
        self.object_set_memo.insert(key, Rc::clone(&set));
        Ok(set)
    }

    fn trait_set(&mut self, sub: &Query) -> Result<Rc<HashSet<usize>>> {
        let key = sub as *const Query as usize;
        if let Some(set) = self.trait_set_memo.get(&key) {
            return Ok(Rc::clone(set));
        }
        let idxs = self.matching_trait_idxs(sub)?;
        let set = Rc::new(idxs.into_iter().collect::<HashSet<_>>());
        self.trait_set_memo.insert(key, Rc::clone(&set));
        Ok(set)
    }

    /// Walk `parent_id` upward; heading depth bounds the chain, the
    /// visited set guards against index corruption.
    fn any_ancestor(&self, id: &str, matches: impl Fn(&str) -> bool) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.objects.get(id).and_then(|o| o.parent_id.clone());

        while let Some(ancestor) = current {
            if !visited.insert(ancestor.clone()) {
                break;
            }
            if matches(&ancestor) {
                return true;
            }
            current = self.objects.get(&ancestor).and_then(|o| o.parent_id.clone());
        }
        false
    }

    /// Equality over a stored field value: exact for scalars, membership
    /// for lists, calendar-aware when both sides read as dates.
    fn field_eq(&self, id: &str, field: &str, value: &str) -> bool {
        let Some(stored) = self.objects[id].fields.get(field) else {
            return false;
        };
        match stored {
            serde_json::Value::Array(items) => items.iter().any(|item| self.json_eq(item, value)),
            other => self.json_eq(other, value),
        }
    }

    fn json_eq(&self, stored: &serde_json::Value, value: &str) -> bool {
        let value = strip_wiki(value);
        match stored {
            serde_json::Value::String(s) => {
                if let (Some(date_match), Some(stored_date)) =
                    (dates::resolve_date_word(value, self.today), dates::date_of_value(s))
                {
                    return date_match.contains(stored_date);
                }
                s == value
            }
            serde_json::Value::Number(n) => value
                .parse::<f64>()
                .map_or(false, |q| n.as_f64().map_or(false, |s| (s - q).abs() < f64::EPSILON)),
            serde_json::Value::Bool(b) => value == b.to_string(),
            _ => false,
        }
    }

    fn trait_value_eq(&self, name: &str, stored: &str, value: &str) -> bool {
        let kind = self.schema.trait_def(name).map(|d| d.kind);
        match kind {
            Some(ValueKind::Date) | Some(ValueKind::Datetime) => {
                match (dates::resolve_date_word(value, self.today), dates::date_of_value(stored)) {
                    (Some(date_match), Some(stored_date)) => date_match.contains(stored_date),
                    _ => stored == value,
                }
            }
            Some(ValueKind::Ref) | Some(ValueKind::RefList) => {
                strip_wiki(stored) == strip_wiki(value)
            }
            _ => stored == value,
        }
    }
}

fn strip_wiki(s: &str) -> &str {
    let t = s.trim();
    if t.starts_with("[[") && t.ends_with("]]") && t.len() > 4 {
        &t[2..t.len() - 2]
    } else {
        t
    }
}

// Integration-level executor tests live in query/mod.rs, where lexing,
// parsing, validation, planning, and execution compose.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_wiki() {
        assert_eq!(strip_wiki("[[people/freya]]"), "people/freya");
        assert_eq!(strip_wiki("people/freya"), "people/freya");
        assert_eq!(strip_wiki("[[]]"), "[[]]");
    }

    #[test]
    fn test_trait_source_equality() {
        use crate::parser::TraitSource;
        assert_eq!(TraitSource::Inline, TraitSource::Inline);
        assert_ne!(TraitSource::Inline, TraitSource::Frontmatter);
    }
}
