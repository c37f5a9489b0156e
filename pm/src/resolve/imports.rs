//! Import resolution
//!
//! An import declaration resolves to a single [`VariationSet`]:
//!
//! - a single document reference loads that VariationSet
//! - a list merges document sources and inline literals in written order;
//!   a key defined by two document sources is an [`ResolveError::ImportConflict`]
//! - a nested map registers each child as `Parent.Child`
//!
//! Inline literals get content-hash keys and never take part in collision
//! detection.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::inheritance::ImportDecl;
use crate::document::{ConfigDocument, DocumentCache, ImportSource, ImportSpec, VariationSet};
use crate::error::ResolveError;

/// Resolved imports by registered name
pub type Imports = BTreeMap<String, VariationSet>;

/// `ImportName.Key`, where the import name may itself be dotted
static VALUE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*\.[A-Za-z0-9_~-]+$").expect("valid regex")
});

pub struct ImportResolver {
    cache: Arc<DocumentCache>,
}

impl ImportResolver {
    pub fn new(cache: Arc<DocumentCache>) -> Self {
        Self { cache }
    }

    /// Resolve every declaration, accumulating all errors
    pub fn resolve_all(&self, decls: &BTreeMap<String, ImportDecl>) -> Result<Imports, Vec<ResolveError>> {
        debug!(count = decls.len(), "ImportResolver::resolve_all: called");
        let mut imports = Imports::new();
        let mut errors = Vec::new();
        for (name, decl) in decls {
            self.resolve_spec(name, &decl.spec, &decl.origin, &mut imports, &mut errors);
        }
        if errors.is_empty() { Ok(imports) } else { Err(errors) }
    }

    /// Resolve one declaration made in `origin`, registering results in `out`
    pub fn resolve_spec(
        &self,
        name: &str,
        spec: &ImportSpec,
        origin: &Path,
        out: &mut Imports,
        errors: &mut Vec<ResolveError>,
    ) {
        let field = format!("imports.{}", name);
        match spec {
            ImportSpec::Document(reference) => match self.load_set(reference, origin, &field) {
                Ok((_, set)) => {
                    out.insert(name.to_string(), set);
                }
                Err(e) => errors.push(e),
            },
            ImportSpec::List(entries) => {
                let mut merged = VariationSet::new();
                let mut owners: HashMap<String, PathBuf> = HashMap::new();
                let mut failed = false;
                for entry in entries {
                    match ImportSource::classify(entry) {
                        ImportSource::Literal(literal) => {
                            merged.push_literal(literal);
                        }
                        ImportSource::Document(reference) => {
                            let (source, set) = match self.load_set(reference, origin, &field) {
                                Ok(loaded) => loaded,
                                Err(e) => {
                                    errors.push(e);
                                    failed = true;
                                    continue;
                                }
                            };
                            for variation in set.iter() {
                                if let Some(first) = owners.get(&variation.key) {
                                    errors.push(ResolveError::ImportConflict {
                                        file: origin.to_path_buf(),
                                        import: name.to_string(),
                                        key: variation.key.clone(),
                                        first: first.clone(),
                                        second: source.clone(),
                                    });
                                    failed = true;
                                    continue;
                                }
                                owners.insert(variation.key.clone(), source.clone());
                                merged.insert(variation.key.clone(), variation.value.clone());
                            }
                        }
                    }
                }
                if !failed {
                    debug!(%name, size = merged.len(), "resolve_spec: merged list import");
                    out.insert(name.to_string(), merged);
                }
            }
            ImportSpec::Nested(children) => {
                for (child, spec) in children {
                    self.resolve_spec(&format!("{}.{}", name, child), spec, origin, out, errors);
                }
            }
        }
    }

    fn load_set(&self, reference: &str, origin: &Path, field: &str) -> Result<(PathBuf, VariationSet), ResolveError> {
        let doc = self.cache.load_relative(reference, origin, field)?;
        match doc.parse() {
            Ok(ConfigDocument::VariationSet(set)) => Ok((doc.path().to_path_buf(), set)),
            Ok(other) => Err(ResolveError::structural(
                origin,
                Some(field),
                format!("`{}` is a {}; imports must be variation sets", reference, other.kind()),
            )),
            Err(errors) => Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ResolveError::structural(doc.path(), None, "document could not be parsed"))),
        }
    }
}

/// True when `value` has the `ImportName.Key` shape
pub fn is_value_ref(value: &str) -> bool {
    VALUE_REF.is_match(value.trim())
}

/// Resolve a default/override value
///
/// Values shaped like `ImportName.Key` are looked up in `scopes`, first match
/// wins; anything else is literal text. A leading `\` marks the rest as
/// literal, so `\v1.5` renders as `v1.5`.
pub fn resolve_value_ref(value: &str, scopes: &[&Imports], file: &Path, field: &str) -> Result<String, ResolveError> {
    let trimmed = value.trim();
    if let Some(literal) = trimmed.strip_prefix('\\') {
        return Ok(literal.to_string());
    }
    if !is_value_ref(trimmed) {
        return Ok(value.to_string());
    }

    // The regex guarantees at least one dot
    let Some((import, key)) = trimmed.rsplit_once('.') else {
        return Ok(value.to_string());
    };
    let Some(set) = scopes.iter().find_map(|scope| scope.get(import)) else {
        return Err(ResolveError::template(
            file,
            Some(field),
            format!("`{}` refers to unknown import `{}`", trimmed, import),
        ));
    };
    set.get(key).map(|v| v.value.clone()).ok_or_else(|| {
        ResolveError::template(
            file,
            Some(field),
            format!("`{}` refers to unknown key `{}` of import `{}`", trimmed, key, import),
        )
    })
}
