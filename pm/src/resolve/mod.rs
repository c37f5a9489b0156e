//! Resolution pipeline: inheritance, imports, templates
//!
//! [`resolve_prompt`] runs the three resolvers in order for one entry
//! document. Validation and compilation share it, so what validates is
//! exactly what compiles.

mod imports;
mod inheritance;
mod selector;
mod template;

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

pub use imports::{ImportResolver, Imports, is_value_ref, resolve_value_ref};
pub use inheritance::{
    ChunkDecl, ImportDecl, InheritanceResolver, Injection, ResolvedChunk, ResolvedConfig, inject, merge_maps,
    untyped_parent_warning,
};
pub use selector::{Selector, SelectorError};
pub use template::{
    ChunkMention, ChunkRef, PlaceholderRef, PreparedPrompt, Segment, Slot, TemplateResolver, chunk_mentions,
    parse_chunk_ref, placeholders, render_loras,
};

use crate::document::{Document, DocumentCache};
use crate::error::ResolveError;
use crate::validation::Finding;

/// Output of a full resolution of one entry document
#[derive(Debug, Clone)]
pub struct Resolution {
    pub config: Arc<ResolvedConfig>,
    pub prepared: PreparedPrompt,
    pub warnings: Vec<Finding>,
}

/// Resolve inheritance, imports and templates for `entry`
pub fn resolve_prompt<R: Rng + ?Sized>(
    cache: &Arc<DocumentCache>,
    entry: &Arc<Document>,
    separator: &str,
    rng: &mut R,
) -> Result<Resolution, Vec<ResolveError>> {
    debug!(entry = ?entry.path(), "resolve_prompt: called");
    let mut inheritance = InheritanceResolver::new(cache.clone());
    let imports = ImportResolver::new(cache.clone());

    let config = inheritance.resolve(entry).map_err(|e| vec![e])?;
    let scope = imports.resolve_all(&config.imports)?;

    let mut templates = TemplateResolver::new(cache.clone(), &mut inheritance, &imports, separator);
    let prepared = templates.prepare(&config, scope, rng)?;
    let template_warnings = templates.take_warnings();

    let mut warnings = inheritance.take_warnings();
    warnings.extend(template_warnings);
    Ok(Resolution {
        config,
        prepared,
        warnings,
    })
}
