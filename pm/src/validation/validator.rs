//! Five-phase document validation
//!
//! The document graph reachable from the entry Prompt is loaded once, then
//! checked phase by phase:
//!
//! 1. Structural: required fields, shapes, body field names
//! 2. Path: every reference resolves, none is absolute
//! 3. Inheritance: parent kinds, chunk types and depth, cycles
//! 4. Imports: key collisions, imported documents are VariationSets
//! 5. Template: markers, reserved placeholders, selectors, placeholder and
//!    chunk references, full resolution
//!
//! Every phase runs even when an earlier one failed; findings are collected
//! into one [`ValidationReport`]. Reference checks work from the declarations
//! along the entry's chain, so a missing file elsewhere does not hide them.
//! Only the final full resolution waits for an otherwise clean graph.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use super::finding::{Category, Finding, ValidationReport};
use crate::document::{ChunkConfig, ConfigDocument, Document, DocumentCache, DocumentKind, PROMPT_MARKER, is_reserved};
use crate::error::ResolveError;
use crate::resolve::{
    ChunkRef, ImportResolver, Imports, InheritanceResolver, Selector, chunk_mentions, inject, placeholders,
    resolve_prompt, untyped_parent_warning,
};

/// One loaded document of the graph
struct Node {
    path: PathBuf,
    config: Option<ConfigDocument>,
}

/// Everything reachable from the entry, loaded breadth-first
#[derive(Default)]
struct Graph {
    entry: Option<Arc<Document>>,
    nodes: Vec<Node>,
    index: HashMap<PathBuf, usize>,
    /// Child path -> resolved parent path
    implements: HashMap<PathBuf, PathBuf>,
    /// (document, field) -> resolved target, for references that loaded
    edges: HashMap<(PathBuf, String), PathBuf>,
    load_errors: Vec<ResolveError>,
    parse_errors: Vec<ResolveError>,
}

impl Graph {
    fn config(&self, path: &Path) -> Option<&ConfigDocument> {
        self.index.get(path).and_then(|&i| self.nodes[i].config.as_ref())
    }

    /// `start` followed by its ancestors; stops at a cycle
    fn chain(&self, start: &Path) -> Vec<PathBuf> {
        let mut chain = vec![start.to_path_buf()];
        let mut current = start;
        while let Some(next) = self.implements.get(current) {
            if chain.contains(next) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Declarations of the chunk at `path` merged with its parent chunk
    fn chunk_outline(&self, path: &Path) -> Option<ChunkOutline> {
        let Some(ConfigDocument::Chunk(child)) = self.config(path) else {
            return None;
        };
        let parent = match self.implements.get(path).and_then(|p| self.config(p)) {
            Some(ConfigDocument::Chunk(parent)) => Some(parent),
            _ => None,
        };
        let body = match parent {
            Some(parent) => {
                inject(parent.template.as_deref().unwrap_or_default(), child.template.as_deref(), PROMPT_MARKER).text
            }
            None => child.template.clone().unwrap_or_default(),
        };

        let layers: Vec<&ChunkConfig> = parent.into_iter().chain(std::iter::once(child)).collect();
        Some(ChunkOutline {
            source: path.to_path_buf(),
            body,
            imports: layers
                .iter()
                .flat_map(|c| c.imports.iter().flat_map(|(name, spec)| spec.registered_names(name)))
                .collect(),
            filled: layers
                .iter()
                .flat_map(|c| c.overrides.keys().chain(c.defaults.keys()).cloned())
                .collect(),
        })
    }
}

/// What a chunk body can draw on, before anything is resolved
struct ChunkOutline {
    source: PathBuf,
    body: String,
    /// Registered import names
    imports: HashSet<String>,
    /// Keys with an override or default
    filled: HashSet<String>,
}

/// Body fields of a document as `(field, text)`
fn bodies(config: &ConfigDocument) -> Vec<(&'static str, &str)> {
    let fields = match config {
        ConfigDocument::Template(t) => vec![("template", &t.template), ("negative-prompt", &t.negative_prompt)],
        ConfigDocument::Prompt(p) => vec![("prompt", &p.prompt), ("negative-prompt", &p.negative_prompt)],
        ConfigDocument::Chunk(c) => vec![("template", &c.template)],
        ConfigDocument::VariationSet(_) => Vec::new(),
    };
    fields
        .into_iter()
        .filter_map(|(field, body)| Some((field, body.as_deref()?)))
        .collect()
}

pub struct Validator {
    cache: Arc<DocumentCache>,
    separator: String,
}

impl Validator {
    pub fn new(cache: Arc<DocumentCache>, separator: &str) -> Self {
        Self {
            cache,
            separator: separator.to_string(),
        }
    }

    /// Validate the Prompt at `entry` and everything it references
    pub fn validate(&self, entry: &Path) -> ValidationReport {
        debug!(?entry, "Validator::validate: called");
        let graph = self.load_graph(entry);
        let mut report = ValidationReport::new();

        self.check_structure(&graph, &mut report);
        self.check_paths(&graph, &mut report);
        self.check_inheritance(&graph, &mut report);
        self.check_imports(&graph, &mut report);
        self.check_templates(&graph, &mut report);

        info!(
            entry = %entry.display(),
            errors = report.errors().count(),
            warnings = report.warnings().count(),
            "Validation finished"
        );
        report
    }

    fn load_graph(&self, entry: &Path) -> Graph {
        let mut graph = Graph::default();
        let root = match self.cache.load_entry(entry) {
            Ok(doc) => doc,
            Err(e) => {
                graph.load_errors.push(e);
                return graph;
            }
        };
        graph.entry = Some(root.clone());

        let mut queue = VecDeque::from([root]);
        while let Some(doc) = queue.pop_front() {
            let path = doc.path().to_path_buf();
            if graph.index.contains_key(&path) {
                continue;
            }

            let config = match doc.parse() {
                Ok(config) => Some(config),
                Err(errors) => {
                    graph.parse_errors.extend(errors);
                    None
                }
            };

            if let Some(config) = &config {
                for (field, reference) in config.references() {
                    match self.cache.load_relative(reference, &path, &field) {
                        Ok(child) => {
                            if field == "implements" {
                                graph.implements.insert(path.clone(), child.path().to_path_buf());
                            }
                            graph.edges.insert((path.clone(), field), child.path().to_path_buf());
                            queue.push_back(child);
                        }
                        Err(e) => graph.load_errors.push(e),
                    }
                }
            }

            graph.index.insert(path.clone(), graph.nodes.len());
            graph.nodes.push(Node { path, config });
        }
        debug!(documents = graph.nodes.len(), "load_graph: loaded");
        graph
    }

    /// Phase 1
    fn check_structure(&self, graph: &Graph, report: &mut ValidationReport) {
        for e in graph.load_errors.iter().filter(|e| matches!(e, ResolveError::Structural { .. })) {
            report.error(e.clone());
        }
        for e in &graph.parse_errors {
            report.error(e.clone());
        }
        if let Some(entry) = &graph.entry
            && let Some(config) = graph.config(entry.path())
            && config.kind() != DocumentKind::Prompt
        {
            report.error(ResolveError::structural(
                entry.path(),
                None,
                format!("entry document must be a prompt, found a {}", config.kind()),
            ));
        }
    }

    /// Phase 2
    fn check_paths(&self, graph: &Graph, report: &mut ValidationReport) {
        for e in graph.load_errors.iter().filter(|e| e.is_path()) {
            report.error(e.clone());
        }
    }

    /// Phase 3
    fn check_inheritance(&self, graph: &Graph, report: &mut ValidationReport) {
        let mut failed = false;
        for node in &graph.nodes {
            let Some(child) = &node.config else { continue };
            let (Some(reference), Some(parent_path)) = (child.implements(), graph.implements.get(&node.path)) else {
                continue;
            };
            let Some(parent) = graph.config(parent_path) else { continue };

            let mismatch = |message: String| ResolveError::inheritance(&node.path, Some("implements"), message);
            match (child, parent) {
                (ConfigDocument::Template(_) | ConfigDocument::Prompt(_), ConfigDocument::Template(_)) => {}
                (ConfigDocument::Template(_) | ConfigDocument::Prompt(_), other) => {
                    failed = true;
                    report.error(mismatch(format!(
                        "`{}` is a {}; a {} can only implement a template",
                        reference,
                        other.kind(),
                        child.kind()
                    )));
                }
                (ConfigDocument::Chunk(c), ConfigDocument::Chunk(p)) => {
                    if let Some(grandparent) = &p.implements {
                        failed = true;
                        report.error(mismatch(format!(
                            "{} already implements `{}`; chunk inheritance is limited to one level",
                            parent_path.display(),
                            grandparent
                        )));
                    }
                    match (&c.chunk_type, &p.chunk_type) {
                        (Some(ct), Some(pt)) if ct != pt => {
                            failed = true;
                            report.error(ResolveError::inheritance(
                                &node.path,
                                Some("type"),
                                format!("chunk type `{}` does not match parent type `{}`", ct, pt),
                            ));
                        }
                        (Some(ct), None) => report.push(untyped_parent_warning(&node.path, parent_path, ct)),
                        _ => {}
                    }
                }
                (ConfigDocument::Chunk(_), other) => {
                    failed = true;
                    report.error(mismatch(format!(
                        "`{}` is a {}; a chunk can only implement another chunk",
                        reference,
                        other.kind()
                    )));
                }
                (ConfigDocument::VariationSet(_), _) => {}
            }
        }

        failed |= self.check_cycles(graph, report);

        // Body replacement warnings come from an actual merge
        if !failed
            && let Some(entry) = &graph.entry
            && graph.config(entry.path()).is_some_and(|c| c.kind() == DocumentKind::Prompt)
        {
            let mut resolver = InheritanceResolver::new(self.cache.clone());
            if let Err(e) = resolver.resolve(entry) {
                report.error(e);
            }
            report.extend(resolver.take_warnings());
        }
    }

    /// Report every `implements` cycle once; true when any was found
    fn check_cycles(&self, graph: &Graph, report: &mut ValidationReport) -> bool {
        let mut reported: HashSet<Vec<PathBuf>> = HashSet::new();
        for node in &graph.nodes {
            let mut chain = vec![node.path.clone()];
            let mut current = &node.path;
            while let Some(next) = graph.implements.get(current) {
                if *next == node.path {
                    let mut members = chain.clone();
                    members.sort();
                    if reported.insert(members) {
                        let names: Vec<String> = chain
                            .iter()
                            .chain(std::iter::once(&node.path))
                            .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
                            .collect();
                        report.error(ResolveError::inheritance(
                            &node.path,
                            Some("implements"),
                            format!("inheritance cycle: {}", names.join(" -> ")),
                        ));
                    }
                    break;
                }
                if chain.contains(next) {
                    // A cycle further up the chain; reported from its own members
                    break;
                }
                chain.push(next.clone());
                current = next;
            }
        }
        !reported.is_empty()
    }

    /// Phase 4
    fn check_imports(&self, graph: &Graph, report: &mut ValidationReport) {
        let resolver = ImportResolver::new(self.cache.clone());
        for node in &graph.nodes {
            let Some(imports) = node.config.as_ref().and_then(ConfigDocument::imports) else {
                continue;
            };
            let mut scratch = Imports::new();
            let mut errors = Vec::new();
            for (name, spec) in imports {
                resolver.resolve_spec(name, spec, &node.path, &mut scratch, &mut errors);
            }
            // Load and parse failures of the imported documents belong to phases 1 and 2
            for e in errors.into_iter().filter(|e| !e.is_path() && e.file() == node.path) {
                let mut finding = Finding::from(e);
                finding.category = Category::Import;
                report.push(finding);
            }
        }
    }

    /// Phase 5
    fn check_templates(&self, graph: &Graph, report: &mut ValidationReport) {
        for node in &graph.nodes {
            let Some(config) = &node.config else { continue };
            match config {
                ConfigDocument::Template(t) => {
                    if let Some(body) = &t.template
                        && !body.contains(PROMPT_MARKER)
                    {
                        report.error(ResolveError::template(
                            &node.path,
                            Some("template"),
                            format!("template body must contain the {} marker", PROMPT_MARKER),
                        ));
                    }
                }
                ConfigDocument::Chunk(c) => {
                    let body = c.template.as_deref().unwrap_or_default();
                    for placeholder in placeholders(body).iter().filter(|p| is_reserved(p.name)) {
                        report.error(ResolveError::template(
                            &node.path,
                            Some("template"),
                            format!("reserved placeholder `{{{}}}` is not allowed in a chunk", placeholder.name),
                        ));
                    }
                }
                ConfigDocument::Prompt(_) | ConfigDocument::VariationSet(_) => {}
            }

            for (field, body) in bodies(config) {
                for placeholder in placeholders(body) {
                    if let Some(selector) = placeholder.selector
                        && let Err(e) = Selector::parse(selector)
                    {
                        report.error(ResolveError::template(
                            &node.path,
                            Some(field),
                            format!("`{{{}[{}]}}`: {}", placeholder.name, selector, e),
                        ));
                    }
                }
            }
        }

        self.check_references(graph, report);

        // Full resolution only makes sense over a graph that is otherwise clean
        if report.has_errors() {
            debug!("check_templates: skipping full resolution");
            return;
        }
        let Some(entry) = &graph.entry else { return };
        let mut rng = StdRng::seed_from_u64(0);
        match resolve_prompt(&self.cache, entry, &self.separator, &mut rng) {
            Ok(resolution) => report.extend(resolution.warnings),
            Err(errors) => errors.into_iter().for_each(|e| report.error(e)),
        }
    }

    /// Placeholder and chunk references of every body along the entry's chain
    fn check_references(&self, graph: &Graph, report: &mut ValidationReport) {
        let Some(entry) = &graph.entry else { return };
        if !graph.config(entry.path()).is_some_and(|c| c.kind() == DocumentKind::Prompt) {
            return;
        }
        let chain = graph.chain(entry.path());

        // Root ancestor first so descendants override chunk declarations
        let mut scope: HashSet<String> = HashSet::new();
        let mut chunks: BTreeMap<&str, Option<ChunkOutline>> = BTreeMap::new();
        for path in chain.iter().rev() {
            let Some(config) = graph.config(path) else { continue };
            for (name, spec) in config.imports().into_iter().flatten() {
                scope.extend(spec.registered_names(name));
            }
            for name in config.chunks().into_iter().flat_map(|c| c.keys()) {
                let outline = graph
                    .edges
                    .get(&(path.clone(), format!("chunks.{}", name)))
                    .and_then(|target| graph.chunk_outline(target));
                chunks.insert(name.as_str(), outline);
            }
        }
        // Chunk imports are reachable from callers as `Chunk.Import`
        for (name, outline) in &chunks {
            if let Some(outline) = outline {
                scope.extend(outline.imports.iter().map(|import| format!("{}.{}", name, import)));
            }
        }

        for path in &chain {
            let Some(config) = graph.config(path) else { continue };
            for (field, body) in bodies(config) {
                let mentions = chunk_mentions(body);
                for mention in &mentions {
                    let chunk_ref = match &mention.parsed {
                        Ok(chunk_ref) => chunk_ref,
                        Err(message) => {
                            report.error(ResolveError::template(path, Some(field), message.clone()));
                            continue;
                        }
                    };
                    match chunks.get(chunk_ref.name.as_str()) {
                        None => report.error(ResolveError::template(
                            path,
                            Some(field),
                            format!("unknown chunk `@{}`", chunk_ref.name),
                        )),
                        Some(Some(outline)) => check_chunk_body(outline, chunk_ref, report),
                        // Unloadable chunk; reported by the path phase
                        Some(None) => {}
                    }
                }

                for placeholder in placeholders(body) {
                    // `@{Name}` is a chunk reference, not a placeholder
                    let is_chunk_ref = mentions.iter().any(|m| m.start + 1 == placeholder.start);
                    if is_chunk_ref || is_reserved(placeholder.name) || scope.contains(placeholder.name) {
                        continue;
                    }
                    report.error(ResolveError::template(
                        path,
                        Some(field),
                        format!("unknown placeholder `{{{}}}`", placeholder.name),
                    ));
                }
            }
        }
    }
}

/// Every chunk placeholder must be bound, overridden, defaulted or imported
fn check_chunk_body(outline: &ChunkOutline, chunk_ref: &ChunkRef, report: &mut ValidationReport) {
    for placeholder in placeholders(&outline.body) {
        let name = placeholder.name;
        let bound = chunk_ref.bindings.iter().any(|(param, _)| param == name);
        if bound || is_reserved(name) || outline.filled.contains(name) || outline.imports.contains(name) {
            continue;
        }
        report.error(ResolveError::template(
            &outline.source,
            Some("template"),
            format!(
                "placeholder `{{{}}}` of chunk `{}` is not bound, defaulted, overridden or imported",
                name, chunk_ref.name
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Severity;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn validate(entry: &Path) -> ValidationReport {
        Validator::new(Arc::new(DocumentCache::new()), ",").validate(entry)
    }

    #[test]
    fn test_clean_prompt_has_no_findings() {
        let dir = tempdir().unwrap();
        write(&dir, "hair.yaml", "red: red hair\nblue: blue hair\n");
        write(&dir, "base.yaml", "template: 'masterpiece, {prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: hair.yaml}\nprompt: '1girl, {Hair}'\n",
        );
        let report = validate(&prompt);
        assert!(report.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_all_phases_run() {
        let dir = tempdir().unwrap();
        write(&dir, "base.yaml", "template: 'no marker'\ncolour: red\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: missing.yaml}\nprompt: '{Hair[0]}'\n",
        );
        let report = validate(&prompt);
        assert!(report.in_category(Category::Structural).count() >= 1);
        assert_eq!(report.in_category(Category::Path).count(), 1);
        assert_eq!(report.in_category(Category::Template).count(), 1);
    }

    #[test]
    fn test_entry_must_be_prompt() {
        let dir = tempdir().unwrap();
        let template = write(&dir, "base.yaml", "template: '{prompt}'\n");
        let report = validate(&template);
        assert!(report.errors().any(|f| f.message.contains("entry document must be a prompt")));
    }

    #[test]
    fn test_missing_entry_is_path_error() {
        let dir = tempdir().unwrap();
        let report = validate(&dir.path().join("nope.yaml"));
        assert_eq!(report.len(), 1);
        assert_eq!(report.findings[0].category, Category::Path);
    }

    #[test]
    fn test_cycle_reported_once() {
        let dir = tempdir().unwrap();
        write(&dir, "a.yaml", "implements: b.yaml\ntemplate: '{prompt}'\n");
        write(&dir, "b.yaml", "implements: a.yaml\ntemplate: '{prompt}'\n");
        let prompt = write(&dir, "p.yaml", "implements: a.yaml\ngeneration: {}\nprompt: x\n");
        let report = validate(&prompt);
        let cycles: Vec<&Finding> = report.errors().filter(|f| f.message.contains("cycle")).collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].category, Category::Inheritance);
    }

    #[test]
    fn test_chunk_depth_two_rejected() {
        let dir = tempdir().unwrap();
        write(&dir, "gp.yaml", "type: character\ntemplate: base\n");
        write(&dir, "parent.yaml", "type: character\nimplements: gp.yaml\n");
        write(&dir, "child.yaml", "type: character\nimplements: parent.yaml\n");
        write(&dir, "base.yaml", "chunks: {C: child.yaml}\ntemplate: '{prompt}'\n");
        let prompt = write(&dir, "p.yaml", "implements: base.yaml\ngeneration: {}\nprompt: '@C'\n");
        let report = validate(&prompt);
        assert!(
            report
                .in_category(Category::Inheritance)
                .any(|f| f.severity == Severity::Error && f.message.contains("one level"))
        );
    }

    #[test]
    fn test_import_conflict_reported() {
        let dir = tempdir().unwrap();
        write(&dir, "a.yaml", "red: red hair\n");
        write(&dir, "b.yaml", "red: crimson hair\n");
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: [a.yaml, b.yaml]}\nprompt: '{Hair}'\n",
        );
        let report = validate(&prompt);
        let conflicts: Vec<&Finding> = report.in_category(Category::Import).collect();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].message.contains("red"));
    }

    #[test]
    fn test_import_must_be_variation_set() {
        let dir = tempdir().unwrap();
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: base.yaml}\nprompt: x\n",
        );
        let report = validate(&prompt);
        assert_eq!(report.in_category(Category::Import).count(), 1);
    }

    #[test]
    fn test_reserved_placeholder_in_chunk() {
        let dir = tempdir().unwrap();
        write(&dir, "c.yaml", "type: x\ntemplate: 'a, {prompt}'\n");
        write(&dir, "base.yaml", "chunks: {C: c.yaml}\ntemplate: '{prompt}'\n");
        let prompt = write(&dir, "p.yaml", "implements: base.yaml\ngeneration: {}\nprompt: '@C'\n");
        let report = validate(&prompt);
        assert!(
            report
                .in_category(Category::Template)
                .any(|f| f.message.contains("not allowed in a chunk"))
        );
    }

    #[test]
    fn test_warnings_do_not_block() {
        let dir = tempdir().unwrap();
        write(&dir, "parent.yaml", "type: ~\ntemplate: 'girl'\n");
        write(&dir, "c.yaml", "type: character\nimplements: parent.yaml\n");
        write(&dir, "base.yaml", "chunks: {C: c.yaml}\nloras: {detail: 0.5}\ntemplate: '{prompt}'\n");
        let prompt = write(&dir, "p.yaml", "implements: base.yaml\ngeneration: {}\nprompt: '@C'\n");
        let report = validate(&prompt);
        assert!(!report.has_errors(), "{:?}", report);
        // untyped parent (reported once despite two detections) and unrendered loras
        assert_eq!(report.warnings().count(), 2);
    }

    #[test]
    fn test_reference_errors_reported_next_to_path_errors() {
        let dir = tempdir().unwrap();
        write(&dir, "hair.yaml", "red: red hair\n");
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: hair.yaml, Eyes: missing.yaml}\nprompt: '{Hair}, {Eyes}, {Typo}, @Ghost'\n",
        );
        let report = validate(&prompt);
        assert_eq!(report.in_category(Category::Path).count(), 1);

        let template: Vec<&Finding> = report.in_category(Category::Template).collect();
        assert_eq!(template.len(), 2, "{:?}", report);
        assert!(template.iter().any(|f| f.message.contains("`{Typo}`")));
        assert!(template.iter().any(|f| f.message.contains("`@Ghost`")));
        assert!(template.iter().all(|f| f.field.as_deref() == Some("prompt")));
    }

    #[test]
    fn test_chunk_placeholders_checked_without_full_resolution() {
        let dir = tempdir().unwrap();
        write(&dir, "pose.yaml", "sit: sitting\n");
        write(
            &dir,
            "c.yaml",
            "type: character\nimports: {Pose: pose.yaml}\ndefaults: {Outfit: dress}\ntemplate: '{Outfit}, {Pose}, {Hair}, {Mood}'\n",
        );
        write(&dir, "base.yaml", "chunks: {C: c.yaml}\ntemplate: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Extra: gone.yaml, H: pose.yaml}\nprompt: x\nnegative-prompt: '@{C with Hair:{H}}, {C.Pose}'\n",
        );
        let report = validate(&prompt);
        assert!(report.in_category(Category::Path).count() == 1);

        let template: Vec<&Finding> = report.in_category(Category::Template).collect();
        assert_eq!(template.len(), 1, "{:?}", report);
        assert!(template[0].message.contains("`{Mood}`"));
        assert!(template[0].file.ends_with("c.yaml"));
    }

    #[test]
    fn test_braced_chunk_ref_is_not_a_placeholder() {
        let dir = tempdir().unwrap();
        write(&dir, "c.yaml", "type: x\ntemplate: hero\n");
        write(&dir, "base.yaml", "chunks: {Hero: c.yaml}\ntemplate: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nprompt: '@{Hero}, mail me@example'\n",
        );
        let report = validate(&prompt);
        assert!(report.is_empty(), "{:?}", report);
    }
}
