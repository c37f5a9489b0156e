//! Combination generation and seed assignment

mod cursor;
mod generator;
mod seed;

pub use cursor::{MixedRadixCursor, space_size};
pub use generator::{Combinations, ResolvedCombination, combinatorial_space, nesting_order, random_space};
pub use seed::SeedAssigner;
