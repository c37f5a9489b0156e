//! Placeholder selectors
//!
//! A selector is the bracketed part of `{Name[...]}`: one or more
//! `;`-separated clauses in any order.
//!
//! | Clause     | Meaning                                   |
//! |------------|-------------------------------------------|
//! | `3`        | pick 3 variations at random (limit >= 1)  |
//! | `#0,2,4`   | pick by zero-based index                  |
//! | `red,blue` | pick by key                               |
//! | `$5`       | combinatorial weight (0 = sampled freely) |
//!
//! At most one of limit, index list and key list may appear; the weight
//! composes with any of them.

use std::fmt;

use rand::Rng;
use rand::seq::index;
use thiserror::Error;

use crate::document::{Variation, VariationSet};

/// Errors raised while parsing a selector
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector combines more than one of limit, index list and key list")]
    ConflictingSelection,

    #[error("selector declares more than one weight")]
    DuplicateWeight,

    #[error("invalid weight `{0}`")]
    InvalidWeight(String),

    #[error("invalid index `{0}`")]
    InvalidIndex(String),

    #[error("random limit must be at least 1")]
    ZeroLimit,

    #[error("invalid random limit `{0}`")]
    InvalidLimit(String),

    #[error("empty entry in `{0}`")]
    EmptyEntry(String),
}

/// Parsed selector of one placeholder occurrence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub limit: Option<usize>,
    pub indexes: Option<Vec<usize>>,
    pub keys: Option<Vec<String>>,
    pub weight: Option<u32>,
}

impl Selector {
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let mut selector = Self::default();
        for clause in text.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            if let Some(weight) = clause.strip_prefix('$') {
                if selector.weight.is_some() {
                    return Err(SelectorError::DuplicateWeight);
                }
                let weight = weight
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| SelectorError::InvalidWeight(weight.to_string()))?;
                selector.weight = Some(weight);
                continue;
            }

            if selector.has_selection() {
                return Err(SelectorError::ConflictingSelection);
            }

            if let Some(list) = clause.strip_prefix('#') {
                let indexes = split_list(list)?
                    .into_iter()
                    .map(|i| i.parse::<usize>().map_err(|_| SelectorError::InvalidIndex(i.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                selector.indexes = Some(indexes);
            } else if clause.chars().all(|c| c.is_ascii_digit()) {
                let limit = clause
                    .parse::<usize>()
                    .map_err(|_| SelectorError::InvalidLimit(clause.to_string()))?;
                if limit == 0 {
                    return Err(SelectorError::ZeroLimit);
                }
                selector.limit = Some(limit);
            } else {
                let keys = split_list(clause)?.into_iter().map(str::to_string).collect();
                selector.keys = Some(keys);
            }
        }
        Ok(selector)
    }

    fn has_selection(&self) -> bool {
        self.limit.is_some() || self.indexes.is_some() || self.keys.is_some()
    }

    /// Combinatorial weight; 1 when not declared
    pub fn weight(&self) -> u32 {
        self.weight.unwrap_or(1)
    }

    /// Apply the selection to a VariationSet
    ///
    /// Limits pick a random subset kept in set order. Index and key lists keep
    /// the order they were written in, skipping unknown entries and repeats.
    pub fn select<R: Rng + ?Sized>(&self, set: &VariationSet, rng: &mut R) -> Vec<Variation> {
        if let Some(limit) = self.limit {
            if limit >= set.len() {
                return set.iter().cloned().collect();
            }
            let mut picked = index::sample(rng, set.len(), limit).into_vec();
            picked.sort_unstable();
            return picked.into_iter().filter_map(|i| set.get_index(i).cloned()).collect();
        }

        let mut selected: Vec<Variation> = Vec::new();
        let mut keep = |variation: Option<&Variation>| {
            if let Some(v) = variation
                && !selected.iter().any(|s| s.key == v.key)
            {
                selected.push(v.clone());
            }
        };

        if let Some(indexes) = &self.indexes {
            indexes.iter().for_each(|&i| keep(set.get_index(i)));
        } else if let Some(keys) = &self.keys {
            keys.iter().for_each(|k| keep(set.get(k)));
        } else {
            set.iter().for_each(|v| keep(Some(v)));
        }
        selected
    }
}

fn split_list(list: &str) -> Result<Vec<&str>, SelectorError> {
    let entries: Vec<&str> = list.split(',').map(str::trim).collect();
    if entries.iter().any(|e| e.is_empty()) {
        return Err(SelectorError::EmptyEntry(list.to_string()));
    }
    Ok(entries)
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::new();
        if let Some(limit) = self.limit {
            clauses.push(limit.to_string());
        }
        if let Some(indexes) = &self.indexes {
            let list: Vec<String> = indexes.iter().map(|i| i.to_string()).collect();
            clauses.push(format!("#{}", list.join(",")));
        }
        if let Some(keys) = &self.keys {
            clauses.push(keys.join(","));
        }
        if let Some(weight) = self.weight {
            clauses.push(format!("${}", weight));
        }
        write!(f, "{}", clauses.join(";"))
    }
}
