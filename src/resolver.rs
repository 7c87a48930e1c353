//! Reference resolution
//!
//! Maps a reference's raw text to a concrete object id. Precedence,
//! stopping at the first level that matches (ties within a level are
//! reported as ambiguous):
//!
//! 1. alias (slug-normalised, case-insensitive)
//! 2. exact value of any type's `name_field`
//! 3. date shorthand `YYYY-MM-DD` -> `<daily_dir>/<date>`
//! 4. exact object id, with object/page roots prepended if absent
//! 5. unique short name across the vault

use std::collections::{HashMap, HashSet};

use crate::dates;
use crate::slug::slugify;

/// One candidate object fed into the resolver.
#[derive(Debug, Clone)]
pub struct ResolverEntry {
    pub id: String,
    pub alias: Option<String>,
    /// Value of the type's `name_field`, when declared and present.
    pub name_value: Option<String>,
}

/// Outcome of resolving a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Ambiguous(Vec<String>),
    Missing,
}

impl Resolution {
    pub fn resolved_id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Alias/name/short-name indexes over the full object set.
#[derive(Debug, Default)]
pub struct Resolver {
    ids: HashSet<String>,
    aliases: HashMap<String, Vec<String>>,
    names: HashMap<String, Vec<String>>,
    short_names: HashMap<String, Vec<String>>,
    daily_dir: String,
    object_root: Option<String>,
    page_root: Option<String>,
}

impl Resolver {
    pub fn new(
        daily_dir: impl Into<String>,
        object_root: Option<String>,
        page_root: Option<String>,
    ) -> Self {
        Resolver {
            daily_dir: daily_dir.into(),
            object_root,
            page_root,
            ..Default::default()
        }
    }

    pub fn insert(&mut self, entry: ResolverEntry) {
        if let Some(alias) = &entry.alias {
            let key = slugify(alias);
            if !key.is_empty() {
                push_unique(self.aliases.entry(key).or_default(), &entry.id);
            }
        }
        if let Some(name) = &entry.name_value {
            push_unique(self.names.entry(name.trim().to_string()).or_default(), &entry.id);
        }
        // Embedded objects are addressed through their file, never by
        // bare short name.
        if !entry.id.contains('#') {
            let short = entry.id.rsplit('/').next().unwrap_or(&entry.id).to_string();
            push_unique(self.short_names.entry(short).or_default(), &entry.id);
        }
        self.ids.insert(entry.id);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ResolverEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Resolve a raw reference target.
    pub fn resolve(&self, target_raw: &str) -> Resolution {
        let target = target_raw.trim();
        if target.is_empty() {
            return Resolution::Missing;
        }

        // Fragment refs resolve their file part first, then require the
        // combined id to exist.
        if let Some((file_part, fragment)) = target.split_once('#') {
            if self.ids.contains(target) {
                return Resolution::Resolved(target.to_string());
            }
            return match self.resolve(file_part) {
                Resolution::Resolved(file_id) => {
                    let combined = format!("{}#{}", file_id, fragment);
                    if self.ids.contains(&combined) {
                        Resolution::Resolved(combined)
                    } else {
                        Resolution::Missing
                    }
                }
                other => other,
            };
        }

        // 1. Alias. An alias that collides with other objects' short
        // names makes the reference ambiguous, never silently won.
        if let Some(hits) = self.aliases.get(&slugify(target)) {
            let mut all = hits.clone();
            if let Some(short_hits) = self.short_names.get(target) {
                for id in short_hits {
                    if !all.contains(id) {
                        all.push(id.clone());
                    }
                }
            }
            return one_or_ambiguous(&all);
        }

        // 2. name_field value
        if let Some(hits) = self.names.get(target) {
            return one_or_ambiguous(hits);
        }

        // 3. Date shorthand
        if dates::parse_iso_date(target).is_some() {
            let id = format!("{}/{}", self.daily_dir, target);
            return if self.ids.contains(&id) {
                Resolution::Resolved(id)
            } else {
                Resolution::Missing
            };
        }

        // 4. Exact id, with roots prepended if absent
        if self.ids.contains(target) {
            return Resolution::Resolved(target.to_string());
        }
        for root in [&self.object_root, &self.page_root].into_iter().flatten() {
            let prefixed = format!("{}/{}", root, target);
            if self.ids.contains(&prefixed) {
                return Resolution::Resolved(prefixed);
            }
        }

        // 5. Unique short name
        if let Some(hits) = self.short_names.get(target) {
            return one_or_ambiguous(hits);
        }

        Resolution::Missing
    }

    /// Alias integrity per the index invariants: an alias may not equal
    /// another object's id, another object's short name, or another
    /// alias. Returns (alias, holder ids) pairs that violate this.
    pub fn alias_conflicts(&self) -> Vec<(String, Vec<String>)> {
        let mut conflicts = Vec::new();
        for (alias_slug, holders) in &self.aliases {
            let mut clash: Vec<String> = Vec::new();
            if holders.len() > 1 {
                clash.extend(holders.iter().cloned());
            }
            for (short, ids) in &self.short_names {
                if &slugify(short) == alias_slug {
                    for id in ids {
                        if !holders.contains(id) {
                            clash.push(id.clone());
                        }
                    }
                }
            }
            for id in &self.ids {
                if &slugify(id) == alias_slug && !holders.contains(id) {
                    clash.push(id.clone());
                }
            }
            if !clash.is_empty() {
                let mut all = holders.clone();
                all.extend(clash);
                all.sort();
                all.dedup();
                conflicts.push((alias_slug.clone(), all));
            }
        }
        conflicts.sort();
        conflicts
    }
}

fn push_unique(v: &mut Vec<String>, id: &str) {
    if !v.iter().any(|x| x == id) {
        v.push(id.to_string());
    }
}

fn one_or_ambiguous(hits: &[String]) -> Resolution {
    match hits {
        [] => Resolution::Missing,
        [only] => Resolution::Resolved(only.clone()),
        many => {
            let mut ids = many.to_vec();
            ids.sort();
            Resolution::Ambiguous(ids)
        }
    }
}
