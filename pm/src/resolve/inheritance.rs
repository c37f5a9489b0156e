//! Inheritance resolution
//!
//! Templates and prompts extend a parent Template through `implements`;
//! chunks extend a parent chunk, one level deep at most.
//!
//! ## Merging
//!
//! Map-valued fields (parameters, imports, chunks, loras, chunk defaults and
//! overrides) are merged shallowly: child entries win, other parent entries
//! are inherited.
//!
//! Bodies use Template-Method injection: the parent keeps its outer structure
//! and the child body is substituted into the parent's marker (`{prompt}` for
//! the positive body, `{negprompt}` for the negative one). A parent body
//! without a marker is replaced by the child body and a warning is recorded.
//!
//! Resolved results are memoized by canonical source path, so ancestors shared
//! by several documents are resolved once.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{
    ChunkConfig, ConfigDocument, Document, DocumentCache, DocumentKind, GenerationSettings, ImportSpec,
    NEGPROMPT_MARKER, PROMPT_MARKER, PromptConfig, TemplateConfig, classify,
};
use crate::error::ResolveError;
use crate::validation::{Category, Finding};

/// An import declaration together with the document that declared it
///
/// Paths inside `spec` are relative to `origin`, which may be an ancestor of
/// the document being resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub spec: ImportSpec,
    pub origin: PathBuf,
}

/// A chunk declaration together with the document that declared it
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDecl {
    pub reference: String,
    pub origin: PathBuf,
}

/// A Template or Prompt with its whole `implements` chain merged in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    pub source: PathBuf,
    pub name: String,
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    pub imports: BTreeMap<String, ImportDecl>,
    pub chunks: BTreeMap<String, ChunkDecl>,
    pub loras: BTreeMap<String, f64>,
    pub positive: String,
    pub negative: String,
    /// Only set once a Prompt has been merged in
    pub generation: Option<GenerationSettings>,
}

/// A chunk with its (single) parent merged in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedChunk {
    pub source: PathBuf,
    pub name: String,
    pub chunk_type: Option<String>,
    pub imports: BTreeMap<String, ImportDecl>,
    pub defaults: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, String>,
    pub body: String,
}

/// The fields one Template or Prompt document contributes to a merge
struct Layer<'a> {
    source: &'a Path,
    name: &'a str,
    parameters: &'a BTreeMap<String, serde_yaml::Value>,
    imports: &'a BTreeMap<String, ImportSpec>,
    chunks: &'a BTreeMap<String, String>,
    loras: &'a BTreeMap<String, f64>,
    positive: Option<&'a str>,
    positive_field: &'static str,
    negative: Option<&'a str>,
    generation: Option<&'a GenerationSettings>,
}

impl<'a> Layer<'a> {
    fn template(t: &'a TemplateConfig) -> Self {
        Self {
            source: &t.source,
            name: &t.name,
            parameters: &t.parameters,
            imports: &t.imports,
            chunks: &t.chunks,
            loras: &t.loras,
            positive: t.template.as_deref(),
            positive_field: "template",
            negative: t.negative_prompt.as_deref(),
            generation: None,
        }
    }

    fn prompt(p: &'a PromptConfig) -> Self {
        Self {
            source: &p.source,
            name: &p.name,
            parameters: &p.parameters,
            imports: &p.imports,
            chunks: &p.chunks,
            loras: &p.loras,
            positive: p.prompt.as_deref(),
            positive_field: "prompt",
            negative: p.negative_prompt.as_deref(),
            generation: Some(&p.generation),
        }
    }
}

/// Shallow map merge: child entries override same-key parent entries
pub fn merge_maps<V: Clone>(parent: &BTreeMap<String, V>, child: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut merged = parent.clone();
    for (key, value) in child {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Outcome of merging a child body into a parent body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub text: String,
    /// The parent had content but no marker, so the child replaced it
    pub replaced: bool,
}

/// Substitute `child` into the `marker` of `parent`
pub fn inject(parent: &str, child: Option<&str>, marker: &str) -> Injection {
    match child {
        None => Injection {
            text: parent.to_string(),
            replaced: false,
        },
        Some(child) if parent.contains(marker) => Injection {
            text: parent.replace(marker, child),
            replaced: false,
        },
        Some(child) => Injection {
            text: child.to_string(),
            replaced: !parent.trim().is_empty(),
        },
    }
}

fn declare_imports(imports: &BTreeMap<String, ImportSpec>, origin: &Path) -> BTreeMap<String, ImportDecl> {
    imports
        .iter()
        .map(|(name, spec)| {
            (
                name.clone(),
                ImportDecl {
                    spec: spec.clone(),
                    origin: origin.to_path_buf(),
                },
            )
        })
        .collect()
}

fn declare_chunks(chunks: &BTreeMap<String, String>, origin: &Path) -> BTreeMap<String, ChunkDecl> {
    chunks
        .iter()
        .map(|(name, reference)| {
            (
                name.clone(),
                ChunkDecl {
                    reference: reference.clone(),
                    origin: origin.to_path_buf(),
                },
            )
        })
        .collect()
}

impl ResolvedConfig {
    fn root(layer: &Layer<'_>) -> Self {
        Self {
            source: layer.source.to_path_buf(),
            name: layer.name.to_string(),
            parameters: layer.parameters.clone(),
            imports: declare_imports(layer.imports, layer.source),
            chunks: declare_chunks(layer.chunks, layer.source),
            loras: layer.loras.clone(),
            positive: layer.positive.unwrap_or_default().to_string(),
            negative: layer.negative.unwrap_or_default().to_string(),
            generation: layer.generation.cloned(),
        }
    }

    /// Produce a new config with `layer` merged on top of this one
    fn merge_child(&self, layer: &Layer<'_>, warnings: &mut Vec<Finding>) -> Self {
        debug!(parent = ?self.source, child = ?layer.source, "ResolvedConfig::merge_child: called");

        let positive = inject(&self.positive, layer.positive, PROMPT_MARKER);
        if positive.replaced {
            warn!(child = %layer.source.display(), "Parent body has no {{prompt}} marker, replacing it");
            warnings.push(Finding::warning(
                Category::Inheritance,
                layer.source,
                Some(layer.positive_field),
                format!(
                    "{} has no {} marker; this body replaces it entirely",
                    self.source.display(),
                    PROMPT_MARKER
                ),
            ));
        }

        let negative = inject(&self.negative, layer.negative, NEGPROMPT_MARKER);
        if negative.replaced {
            warnings.push(Finding::warning(
                Category::Inheritance,
                layer.source,
                Some("negative-prompt"),
                format!(
                    "{} has no {} marker; this negative prompt replaces it entirely",
                    self.source.display(),
                    NEGPROMPT_MARKER
                ),
            ));
        }

        Self {
            source: layer.source.to_path_buf(),
            name: if layer.name.is_empty() {
                self.name.clone()
            } else {
                layer.name.to_string()
            },
            parameters: merge_maps(&self.parameters, layer.parameters),
            imports: merge_maps(&self.imports, &declare_imports(layer.imports, layer.source)),
            chunks: merge_maps(&self.chunks, &declare_chunks(layer.chunks, layer.source)),
            loras: merge_maps(&self.loras, layer.loras),
            positive: positive.text,
            negative: negative.text,
            generation: layer.generation.cloned().or_else(|| self.generation.clone()),
        }
    }
}

/// Warning for a typed chunk whose parent declares no type
pub fn untyped_parent_warning(child: &Path, parent: &Path, child_type: &str) -> Finding {
    Finding::warning(
        Category::Inheritance,
        child,
        Some("type"),
        format!("parent {} has no type; inferred `{}` from this chunk", parent.display(), child_type),
    )
}

fn first_error(file: &Path, errors: Vec<ResolveError>) -> ResolveError {
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| ResolveError::structural(file, None, "document could not be parsed"))
}

fn display_chain(chain: &[PathBuf], last: &Path) -> String {
    chain
        .iter()
        .map(|p| p.as_path())
        .chain(std::iter::once(last))
        .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Memoized resolver for `implements` chains
pub struct InheritanceResolver {
    cache: Arc<DocumentCache>,
    configs: HashMap<PathBuf, Arc<ResolvedConfig>>,
    chunks: HashMap<PathBuf, Arc<ResolvedChunk>>,
    warnings: Vec<Finding>,
    resolutions: usize,
}

impl InheritanceResolver {
    pub fn new(cache: Arc<DocumentCache>) -> Self {
        Self {
            cache,
            configs: HashMap::new(),
            chunks: HashMap::new(),
            warnings: Vec::new(),
            resolutions: 0,
        }
    }

    /// Resolve a Template or Prompt document and its whole parent chain
    pub fn resolve(&mut self, doc: &Arc<Document>) -> Result<Arc<ResolvedConfig>, ResolveError> {
        debug!(path = ?doc.path(), "InheritanceResolver::resolve: called");
        self.resolve_inner(doc, &mut Vec::new())
    }

    fn resolve_inner(&mut self, doc: &Arc<Document>, visiting: &mut Vec<PathBuf>) -> Result<Arc<ResolvedConfig>, ResolveError> {
        let path = doc.path().to_path_buf();

        // Cycle detection
        if visiting.contains(&path) {
            debug!(?path, ?visiting, "resolve_inner: cycle detected");
            return Err(ResolveError::inheritance(
                &path,
                Some("implements"),
                format!("inheritance cycle: {}", display_chain(visiting, &path)),
            ));
        }

        if let Some(resolved) = self.configs.get(&path) {
            debug!(?path, "resolve_inner: memoized");
            return Ok(resolved.clone());
        }

        let config = doc.parse().map_err(|errors| first_error(&path, errors))?;
        let resolved = match &config {
            ConfigDocument::Template(t) => {
                let layer = Layer::template(t);
                match &t.implements {
                    Some(parent_ref) => {
                        let parent = self.resolve_parent(&path, parent_ref, DocumentKind::Template, visiting)?;
                        parent.merge_child(&layer, &mut self.warnings)
                    }
                    None => ResolvedConfig::root(&layer),
                }
            }
            ConfigDocument::Prompt(p) => {
                let parent_ref = p.implements.as_deref().ok_or_else(|| {
                    ResolveError::structural(&path, Some("implements"), "a prompt must implement a template")
                })?;
                let parent = self.resolve_parent(&path, parent_ref, DocumentKind::Prompt, visiting)?;
                parent.merge_child(&Layer::prompt(p), &mut self.warnings)
            }
            other => {
                return Err(ResolveError::inheritance(
                    &path,
                    None,
                    format!("a {} cannot be resolved as a template or prompt", other.kind()),
                ));
            }
        };

        self.resolutions += 1;
        let resolved = Arc::new(resolved);
        self.configs.insert(path, resolved.clone());
        Ok(resolved)
    }

    /// Load and resolve the Template a `child_kind` document implements
    fn resolve_parent(
        &mut self,
        child: &Path,
        parent_ref: &str,
        child_kind: DocumentKind,
        visiting: &mut Vec<PathBuf>,
    ) -> Result<Arc<ResolvedConfig>, ResolveError> {
        let parent_doc = self.cache.load_relative(parent_ref, child, "implements")?;
        if let Some(kind) = classify(parent_doc.value())
            && kind != DocumentKind::Template
        {
            return Err(ResolveError::inheritance(
                child,
                Some("implements"),
                format!("`{}` is a {}; a {} can only implement a template", parent_ref, kind, child_kind),
            ));
        }

        visiting.push(child.to_path_buf());
        let parent = self.resolve_inner(&parent_doc, visiting);
        visiting.pop();
        parent
    }

    /// Resolve a chunk document and its optional parent chunk
    pub fn resolve_chunk(&mut self, doc: &Arc<Document>) -> Result<Arc<ResolvedChunk>, ResolveError> {
        let path = doc.path().to_path_buf();
        debug!(?path, "InheritanceResolver::resolve_chunk: called");
        if let Some(resolved) = self.chunks.get(&path) {
            return Ok(resolved.clone());
        }

        let child = match doc.parse().map_err(|errors| first_error(&path, errors))? {
            ConfigDocument::Chunk(c) => c,
            other => {
                return Err(ResolveError::structural(
                    &path,
                    None,
                    format!("expected a chunk, found a {}", other.kind()),
                ));
            }
        };

        let resolved = match &child.implements {
            None => ResolvedChunk {
                source: path.clone(),
                name: child.name.clone(),
                chunk_type: child.chunk_type.clone(),
                imports: declare_imports(&child.imports, &path),
                defaults: child.defaults.clone(),
                overrides: child.overrides.clone(),
                body: child.template.clone().unwrap_or_default(),
            },
            Some(parent_ref) => {
                let parent_doc = self.cache.load_relative(parent_ref, &path, "implements")?;
                let parent = match parent_doc.parse().map_err(|errors| first_error(parent_doc.path(), errors))? {
                    ConfigDocument::Chunk(c) => c,
                    other => {
                        return Err(ResolveError::inheritance(
                            &path,
                            Some("implements"),
                            format!("`{}` is a {}; a chunk can only implement another chunk", parent_ref, other.kind()),
                        ));
                    }
                };
                self.merge_chunk(&parent, &child)?
            }
        };

        self.resolutions += 1;
        let resolved = Arc::new(resolved);
        self.chunks.insert(path, resolved.clone());
        Ok(resolved)
    }

    fn merge_chunk(&mut self, parent: &ChunkConfig, child: &ChunkConfig) -> Result<ResolvedChunk, ResolveError> {
        debug!(parent = ?parent.source, child = ?child.source, "merge_chunk: called");
        if let Some(grandparent) = &parent.implements {
            return Err(ResolveError::inheritance(
                &child.source,
                Some("implements"),
                format!(
                    "{} already implements `{}`; chunk inheritance is limited to one level",
                    parent.source.display(),
                    grandparent
                ),
            ));
        }

        let chunk_type = match (&child.chunk_type, &parent.chunk_type) {
            (Some(c), Some(p)) if c != p => {
                return Err(ResolveError::inheritance(
                    &child.source,
                    Some("type"),
                    format!("chunk type `{}` does not match parent type `{}`", c, p),
                ));
            }
            (Some(c), None) => {
                self.warnings.push(untyped_parent_warning(&child.source, &parent.source, c));
                Some(c.clone())
            }
            (c, p) => c.clone().or_else(|| p.clone()),
        };

        let parent_body = parent.template.clone().unwrap_or_default();
        let body = inject(&parent_body, child.template.as_deref(), PROMPT_MARKER);
        if body.replaced {
            self.warnings.push(Finding::warning(
                Category::Inheritance,
                &child.source,
                Some("template"),
                format!("this body replaces the body of {} entirely", parent.source.display()),
            ));
        }

        Ok(ResolvedChunk {
            source: child.source.clone(),
            name: if child.name.is_empty() {
                parent.name.clone()
            } else {
                child.name.clone()
            },
            chunk_type,
            imports: merge_maps(
                &declare_imports(&parent.imports, &parent.source),
                &declare_imports(&child.imports, &child.source),
            ),
            defaults: merge_maps(&parent.defaults, &child.defaults),
            overrides: merge_maps(&parent.overrides, &child.overrides),
            body: body.text,
        })
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.warnings)
    }

    /// Number of documents actually merged (memo hits excluded)
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }
}
