//! promptmill - layered prompt compiler for image generation
//!
//! Prompt configurations are YAML documents that build on each other:
//! Templates describe the skeleton of a prompt, Chunks are reusable
//! fragments, VariationSets hold named alternatives and Prompts tie
//! everything together. promptmill validates a Prompt with all of its
//! dependencies and compiles it into a lazy sequence of fully rendered
//! requests for an image-generation backend.
//!
//! # Core Concepts
//!
//! - **Single-parent inheritance**: `implements` chains merge parameters and
//!   inject child text at the parent's `{prompt}` marker
//! - **Placeholders**: `{Name}` and `{Name[selector]}` draw from imported
//!   VariationSets
//! - **Weighted nesting**: lower weights vary slower; weight 0 is drawn once
//! - **Whole-graph validation**: every problem is reported before compiling
//!
//! # Modules
//!
//! - [`document`] - Loading, classification and typed configs
//! - [`resolve`] - Inheritance, imports and template resolution
//! - [`generate`] - Combination enumeration and seeds
//! - [`validation`] - Findings and the phased validator
//! - [`engine`] - Validation plus compilation entry point
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod generate;
pub mod hashing;
pub mod normalize;
pub mod resolve;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, GenerationConfig};
pub use document::{
    ConfigDocument, DocumentCache, DocumentKind, GenerationMode, GenerationSettings, SeedMode, Variation,
    VariationSet,
};
pub use engine::{CompiledPrompt, Engine, PromptSummary, discover_prompts};
pub use error::ResolveError;
pub use generate::{Combinations, ResolvedCombination};
pub use normalize::normalize;
pub use resolve::{Resolution, Selector, resolve_prompt};
pub use validation::{Category, Finding, Severity, ValidationReport, Validator};
