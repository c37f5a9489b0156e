//! Combination generation
//!
//! [`Combinations`] is a pull-based iterator over [`ResolvedCombination`]s.
//! Nothing is precomputed beyond the slot pools; the caller stops pulling to
//! stop work.
//!
//! Combinatorial mode nests one loop per placeholder with weight > 0, lowest
//! weight outermost, ties broken by first appearance. Weight-0 placeholders
//! are left out of the product and drawn at random for every output.
//!
//! Random mode draws one value per placeholder and rejects combinations it
//! has already produced, until it has the requested count, the space is
//! exhausted or the attempt budget runs out.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info};

use super::cursor::{MixedRadixCursor, space_size};
use super::seed::SeedAssigner;
use crate::config::GenerationConfig;
use crate::document::{GenerationMode, GenerationSettings, Variation};
use crate::normalize::normalize;
use crate::resolve::{PreparedPrompt, Slot};

/// One final request, ready for the generation backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCombination {
    /// Emission index, starting at 0
    pub index: u64,
    pub positive: String,
    pub negative: String,
    pub seed: u64,
    /// Placeholder name -> chosen variation
    pub variations: BTreeMap<String, Variation>,
}

/// Slot indexes of the nested loops, outermost first
pub fn nesting_order(slots: &[Slot]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].weight() > 0).collect();
    // Stable sort keeps first-appearance order for equal weights
    order.sort_by_key(|&i| slots[i].weight());
    order
}

/// Size of the combinatorial product; weight-0 slots do not count
pub fn combinatorial_space(slots: &[Slot]) -> u128 {
    let radices: Vec<usize> = nesting_order(slots).iter().map(|&i| slots[i].pool.len()).collect();
    space_size(&radices)
}

/// Number of distinct assignments over every slot
pub fn random_space(slots: &[Slot]) -> u128 {
    let radices: Vec<usize> = slots.iter().map(|s| s.pool.len()).collect();
    space_size(&radices)
}

enum Strategy {
    Combinatorial {
        cursor: MixedRadixCursor,
        order: Vec<usize>,
        sampled: Vec<usize>,
    },
    Random {
        seen: HashSet<String>,
        by_name: Vec<usize>,
        attempts: u64,
        budget: u64,
        space: u128,
    },
    Exhausted,
}

/// Lazy sequence of resolved combinations for one prepared prompt
pub struct Combinations {
    prepared: Arc<PreparedPrompt>,
    separator: String,
    seeds: SeedAssigner,
    rng: StdRng,
    strategy: Strategy,
    target: Option<u64>,
    emitted: u64,
}

impl Combinations {
    pub fn new(
        prepared: Arc<PreparedPrompt>,
        settings: &GenerationSettings,
        config: &GenerationConfig,
        mut rng: StdRng,
    ) -> Self {
        debug!(mode = ?settings.mode, slots = prepared.slots.len(), "Combinations::new: called");
        let seeds = SeedAssigner::new(settings, &mut rng);
        debug!(seed_base = seeds.base(), seed_mode = ?settings.seed_mode, "Combinations::new: seeds");
        let slots = &prepared.slots;

        let (strategy, target) = if slots.iter().any(|s| s.pool.is_empty()) {
            (Strategy::Exhausted, None)
        } else {
            match settings.mode {
                GenerationMode::Combinatorial => {
                    let order = nesting_order(slots);
                    let radices = order.iter().map(|&i| slots[i].pool.len()).collect();
                    let sampled = (0..slots.len()).filter(|&i| slots[i].weight() == 0).collect();
                    info!(space = combinatorial_space(slots), "Starting combinatorial generation");
                    (
                        Strategy::Combinatorial {
                            cursor: MixedRadixCursor::new(radices),
                            order,
                            sampled,
                        },
                        settings.max_images,
                    )
                }
                GenerationMode::Random => {
                    let target = settings.max_images.unwrap_or(config.default_max_images);
                    let mut by_name: Vec<usize> = (0..slots.len()).collect();
                    by_name.sort_by(|&a, &b| slots[a].name.cmp(&slots[b].name));
                    let space = random_space(slots);
                    info!(target, space, "Starting random generation");
                    (
                        Strategy::Random {
                            seen: HashSet::new(),
                            by_name,
                            attempts: 0,
                            budget: target.saturating_mul(config.random_attempt_factor),
                            space,
                        },
                        Some(target),
                    )
                }
            }
        };

        Self {
            separator: config.separator.clone(),
            prepared,
            seeds,
            rng,
            strategy,
            target,
            emitted: 0,
        }
    }

    fn build(&mut self, choice: Vec<usize>) -> ResolvedCombination {
        let (positive, negative) = self.prepared.render(&choice);
        let variations = self
            .prepared
            .slots
            .iter()
            .zip(&choice)
            .filter_map(|(slot, &i)| Some((slot.name.clone(), slot.pool.get(i)?.clone())))
            .collect();
        let index = self.emitted;
        self.emitted += 1;
        ResolvedCombination {
            index,
            positive: normalize(&positive, &self.separator),
            negative: normalize(&negative, &self.separator),
            seed: self.seeds.seed_for(index, &mut self.rng),
            variations,
        }
    }
}

fn draw(slots: &[Slot], rng: &mut StdRng) -> Vec<usize> {
    slots.iter().map(|s| rng.random_range(0..s.pool.len())).collect()
}

fn canonical_key(slots: &[Slot], by_name: &[usize], choice: &[usize]) -> String {
    let mut key = String::new();
    for &i in by_name {
        key.push_str(&slots[i].name);
        key.push('=');
        key.push_str(&slots[i].pool[choice[i]].key);
        key.push(';');
    }
    key
}

impl Iterator for Combinations {
    type Item = ResolvedCombination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.target.is_some_and(|target| self.emitted >= target) {
            return None;
        }

        let slots = &self.prepared.slots;
        let choice = match &mut self.strategy {
            Strategy::Exhausted => return None,
            Strategy::Combinatorial { cursor, order, sampled } => {
                let digits = cursor.next()?;
                let mut choice = vec![0; slots.len()];
                for (&slot, digit) in order.iter().zip(digits) {
                    choice[slot] = digit;
                }
                for &slot in sampled.iter() {
                    choice[slot] = self.rng.random_range(0..slots[slot].pool.len());
                }
                choice
            }
            Strategy::Random {
                seen,
                by_name,
                attempts,
                budget,
                space,
            } => {
                let mut found = None;
                while (seen.len() as u128) < *space && *attempts < *budget {
                    *attempts += 1;
                    let choice = draw(slots, &mut self.rng);
                    if seen.insert(canonical_key(slots, by_name, &choice)) {
                        found = Some(choice);
                        break;
                    }
                }
                if found.is_none() {
                    debug!(attempts = *attempts, unique = seen.len(), "Combinations::next: random mode stopped");
                }
                found?
            }
        };

        Some(self.build(choice))
    }
}
