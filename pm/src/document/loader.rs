//! Document loading and caching
//!
//! Documents are read once per canonical path and shared as immutable
//! `Arc<Document>`s. References are resolved strictly relative to the
//! directory of the referencing document; absolute references are rejected so
//! a document tree can be moved between machines unchanged.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::parser;
use super::types::ConfigDocument;
use crate::error::ResolveError;

/// A loaded document: canonical path plus raw YAML body
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    value: serde_yaml::Value,
}

impl Document {
    pub fn new(path: PathBuf, value: serde_yaml::Value) -> Self {
        Self { path, value }
    }

    /// Canonical path this document was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value(&self) -> &serde_yaml::Value {
        &self.value
    }

    /// Parse into a typed config
    pub fn parse(&self) -> Result<ConfigDocument, Vec<ResolveError>> {
        parser::parse(self)
    }
}

/// Resolve `reference` against the directory of `from_file`
pub fn resolve_reference(reference: &str, from_file: &Path, field: &str) -> Result<PathBuf, ResolveError> {
    debug!(%reference, ?from_file, "resolve_reference: called");
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::path(from_file, Some(field), "empty document reference"));
    }

    let candidate = Path::new(trimmed);
    if candidate.is_absolute() || candidate.has_root() {
        return Err(ResolveError::path(
            from_file,
            Some(field),
            format!("absolute reference `{}` is not allowed; use a path relative to this document", trimmed),
        ));
    }

    let base = from_file.parent().unwrap_or_else(|| Path::new("."));
    let joined = base.join(candidate);
    fs::canonicalize(&joined).map_err(|_| {
        ResolveError::path(
            from_file,
            Some(field),
            format!("`{}` does not exist (looked for {})", trimmed, joined.display()),
        )
    })
}

/// Process-wide cache of loaded documents keyed by canonical path
#[derive(Debug, Default)]
pub struct DocumentCache {
    docs: RwLock<HashMap<PathBuf, Arc<Document>>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a top-level entry document; the entry path may be absolute
    pub fn load_entry(&self, path: &Path) -> Result<Arc<Document>, ResolveError> {
        debug!(?path, "DocumentCache::load_entry: called");
        let canonical = fs::canonicalize(path)
            .map_err(|e| ResolveError::path(path, None, format!("cannot open entry document: {}", e)))?;
        self.load_canonical(&canonical)
    }

    /// Load a document referenced from `from_file` through `field`
    pub fn load_relative(&self, reference: &str, from_file: &Path, field: &str) -> Result<Arc<Document>, ResolveError> {
        let canonical = resolve_reference(reference, from_file, field)?;
        self.load_canonical(&canonical)
    }

    fn load_canonical(&self, canonical: &Path) -> Result<Arc<Document>, ResolveError> {
        if let Some(doc) = self.get(canonical) {
            debug!(?canonical, "load_canonical: cache hit");
            return Ok(doc);
        }

        debug!(?canonical, "load_canonical: reading from disk");
        let content = fs::read_to_string(canonical)
            .map_err(|e| ResolveError::path(canonical, None, format!("cannot read document: {}", e)))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content)
            .map_err(|e| ResolveError::structural(canonical, None, format!("invalid YAML: {}", e)))?;

        let doc = Arc::new(Document::new(canonical.to_path_buf(), value));
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        // Another resolution may have loaded it in the meantime; keep the first copy
        let doc = docs.entry(canonical.to_path_buf()).or_insert(doc).clone();
        debug!(path = %canonical.display(), "load_canonical: loaded");
        Ok(doc)
    }

    pub fn get(&self, canonical: &Path) -> Option<Arc<Document>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        docs.get(canonical).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
