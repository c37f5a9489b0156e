//! Configuration documents: loading, classification and typed configs

mod loader;
mod parser;
mod types;

pub use loader::{Document, DocumentCache, resolve_reference};
pub use parser::{classify, parse, scalar_to_string};
pub use types::{
    ChunkConfig, ConfigDocument, DocumentKind, GenerationMode, GenerationSettings, ImportSource, ImportSpec,
    LORAS_MARKER, NEGPROMPT_MARKER, PROMPT_MARKER, PromptConfig, RESERVED_PLACEHOLDERS, SeedMode, TemplateConfig,
    Variation, VariationSet, is_reserved,
};
