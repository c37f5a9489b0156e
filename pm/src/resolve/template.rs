//! Template resolution
//!
//! Turns the merged positive and negative bodies into a [`PreparedPrompt`]:
//! text segments interleaved with slots, one slot per distinct placeholder
//! name, each slot carrying the pool of variations its selector picked.
//!
//! Two passes run in order:
//!
//! 1. Chunk injection. `@Name` splices the resolved body of the chunk declared
//!    as `Name`; `@{Name with Param:{Import[sel]}, ...}` additionally binds
//!    chunk placeholders to caller placeholders. Chunk placeholders are filled
//!    from, in order, caller bindings, overrides, defaults and the chunk's own
//!    imports (lifted into the caller scope as `Name.Import`). An `@` only
//!    starts a reference at the start of the text or after a character that
//!    is not a letter, digit or underscore, so `artist@studio` stays text.
//! 2. Placeholder resolution. `{Name}` and `{Name[selector]}` become slots.
//!    Reserved markers become text: `{loras}` renders the merged LoRA map and
//!    leftover `{prompt}`/`{negprompt}` render empty.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use rand::Rng;
use regex::Regex;
use tracing::debug;

use super::imports::{ImportResolver, Imports, resolve_value_ref};
use super::inheritance::{InheritanceResolver, ResolvedChunk, ResolvedConfig};
use super::selector::Selector;
use crate::document::{DocumentCache, LORAS_MARKER, Variation, is_reserved};
use crate::error::ResolveError;
use crate::validation::{Category, Finding};

/// `{Name}` or `{Name[selector]}`; names may be dotted
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)(?:\[([^\[\]{}]*)\])?\}").expect("valid regex")
});

/// Name following a bare `@`
static CHUNK_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

/// One placeholder occurrence found in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRef<'t> {
    pub name: &'t str,
    pub selector: Option<&'t str>,
    pub start: usize,
    pub end: usize,
}

/// Every placeholder occurrence in `text`, in order
pub fn placeholders(text: &str) -> Vec<PlaceholderRef<'_>> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(PlaceholderRef {
                name: caps.get(1)?.as_str(),
                selector: caps.get(2).map(|m| m.as_str()),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// A parsed `@Name` / `@{Name with ...}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRef {
    pub name: String,
    /// Chunk placeholder name -> caller text (usually a placeholder)
    pub bindings: Vec<(String, String)>,
}

/// Parse the inside of `@{...}`
pub fn parse_chunk_ref(inner: &str) -> Result<ChunkRef, String> {
    let inner = inner.trim();
    let (name, bindings) = match inner.split_once(" with ") {
        Some((name, rest)) => (name.trim(), Some(rest)),
        None => (inner, None),
    };
    if !CHUNK_NAME.find(name).is_some_and(|m| m.end() == name.len()) {
        return Err(format!("invalid chunk name `{}`", name));
    }

    let mut parsed = Vec::new();
    for binding in bindings.map(split_top_level).unwrap_or_default() {
        let Some((param, value)) = binding.split_once(':') else {
            return Err(format!("binding `{}` must look like `Param:{{Import}}`", binding.trim()));
        };
        let (param, value) = (param.trim(), value.trim());
        if param.is_empty() || value.is_empty() {
            return Err(format!("binding `{}` must look like `Param:{{Import}}`", binding.trim()));
        }
        parsed.push((param.to_string(), value.to_string()));
    }

    Ok(ChunkRef {
        name: name.to_string(),
        bindings: parsed,
    })
}

/// Split at commas that are not nested inside braces or brackets
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Byte index of the `}` closing the `{` at the start of `text`
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// One chunk reference occurrence found in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMention {
    pub start: usize,
    pub end: usize,
    /// Parse failures carry the message to report
    pub parsed: Result<ChunkRef, String>,
}

/// Every `@Name` / `@{...}` occurrence in `text`, in order
///
/// An unterminated `@{` yields an error mention running to the end of text.
pub fn chunk_mentions(text: &str) -> Vec<ChunkMention> {
    let mut mentions = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find('@') {
        let at = from + offset;
        let after = &text[at + 1..];
        from = at + 1;

        let inside_word = text[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if inside_word {
            continue;
        }

        if after.starts_with('{') {
            let Some(close) = matching_brace(after) else {
                mentions.push(ChunkMention {
                    start: at,
                    end: text.len(),
                    parsed: Err("unterminated chunk reference `@{`".to_string()),
                });
                break;
            };
            let end = at + 1 + close + 1;
            mentions.push(ChunkMention {
                start: at,
                end,
                parsed: parse_chunk_ref(&after[1..close]),
            });
            from = end;
        } else if let Some(m) = CHUNK_NAME.find(after) {
            let end = at + 1 + m.end();
            mentions.push(ChunkMention {
                start: at,
                end,
                parsed: Ok(ChunkRef {
                    name: m.as_str().to_string(),
                    bindings: Vec::new(),
                }),
            });
            from = end;
        }
    }
    mentions
}

/// A piece of rendered body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Slot(usize),
}

/// A distinct placeholder and the variations it may take
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub selector: Selector,
    pub pool: Vec<Variation>,
}

impl Slot {
    pub fn weight(&self) -> u32 {
        self.selector.weight()
    }
}

/// Bodies split into segments, ready for combination
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedPrompt {
    pub positive: Vec<Segment>,
    pub negative: Vec<Segment>,
    /// In order of first appearance, positive body first
    pub slots: Vec<Slot>,
    /// Bodies after chunk injection, before placeholder resolution
    pub positive_text: String,
    pub negative_text: String,
}

impl PreparedPrompt {
    /// Render both bodies for one choice of pool index per slot
    pub fn render(&self, choice: &[usize]) -> (String, String) {
        (self.render_segments(&self.positive, choice), self.render_segments(&self.negative, choice))
    }

    fn render_segments(&self, segments: &[Segment], choice: &[usize]) -> String {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(slot) => {
                    let picked = choice
                        .get(*slot)
                        .and_then(|&i| self.slots.get(*slot)?.pool.get(i));
                    if let Some(variation) = picked {
                        out.push_str(&variation.value);
                    }
                }
            }
        }
        out
    }
}

/// Render the merged LoRA map as backend tags
pub fn render_loras(loras: &BTreeMap<String, f64>, separator: &str) -> String {
    let joiner = format!("{} ", separator.trim());
    loras
        .iter()
        .map(|(name, weight)| format!("<lora:{}:{}>", name, weight))
        .collect::<Vec<_>>()
        .join(&joiner)
}

/// Placeholder bookkeeping while segments are built
#[derive(Default)]
struct SlotTable {
    /// Name, selector text and the body field of the first occurrence
    slots: Vec<(String, Option<String>, &'static str)>,
}

impl SlotTable {
    /// Register an occurrence and return its slot index
    fn register(&mut self, name: &str, selector: Option<&str>, field: &'static str) -> Result<usize, String> {
        let selector = selector.map(str::trim).filter(|s| !s.is_empty());
        if let Some(index) = self.slots.iter().position(|(n, _, _)| n == name) {
            let current = self.slots[index].1.clone();
            match (current.as_deref(), selector) {
                (Some(a), Some(b)) if a != b => {
                    return Err(format!("`{{{}}}` is used with conflicting selectors `[{}]` and `[{}]`", name, a, b));
                }
                // A bare occurrence adopts the selector written elsewhere
                (None, Some(b)) => self.slots[index].1 = Some(b.to_string()),
                _ => {}
            }
            return Ok(index);
        }
        self.slots.push((name.to_string(), selector.map(str::to_string), field));
        Ok(self.slots.len() - 1)
    }
}

/// Chunk injection and placeholder resolution for one Prompt
pub struct TemplateResolver<'r> {
    cache: Arc<DocumentCache>,
    inheritance: &'r mut InheritanceResolver,
    imports: &'r ImportResolver,
    separator: String,
    warnings: Vec<Finding>,
}

impl<'r> TemplateResolver<'r> {
    pub fn new(
        cache: Arc<DocumentCache>,
        inheritance: &'r mut InheritanceResolver,
        imports: &'r ImportResolver,
        separator: &str,
    ) -> Self {
        Self {
            cache,
            inheritance,
            imports,
            separator: separator.to_string(),
            warnings: Vec::new(),
        }
    }

    /// Prepare `config` against the caller-scope imports `scope`
    pub fn prepare<R: Rng + ?Sized>(
        &mut self,
        config: &ResolvedConfig,
        mut scope: Imports,
        rng: &mut R,
    ) -> Result<PreparedPrompt, Vec<ResolveError>> {
        debug!(source = ?config.source, "TemplateResolver::prepare: called");
        let mut errors = Vec::new();

        let positive_text = self.inject_chunks(&config.positive, "prompt", config, &mut scope, &mut errors);
        let negative_text = self.inject_chunks(&config.negative, "negative-prompt", config, &mut scope, &mut errors);

        let mut table = SlotTable::default();
        let loras = render_loras(&config.loras, &self.separator);
        let positive = segments(&positive_text, &loras, &mut table, &config.source, "prompt", &mut errors);
        let negative = segments(&negative_text, &loras, &mut table, &config.source, "negative-prompt", &mut errors);

        if !config.loras.is_empty() && !format!("{}{}", config.positive, config.negative).contains(LORAS_MARKER) {
            self.warnings.push(Finding::warning(
                Category::Template,
                &config.source,
                Some("loras"),
                "loras are declared but no body renders {loras}",
            ));
        }

        let mut slots = Vec::with_capacity(table.slots.len());
        for (name, selector_text, field) in table.slots {
            let Some(set) = scope.get(&name) else {
                errors.push(ResolveError::template(
                    &config.source,
                    Some(field),
                    format!("unknown placeholder `{{{}}}`", name),
                ));
                continue;
            };
            let selector = match Selector::parse(selector_text.as_deref().unwrap_or_default()) {
                Ok(selector) => selector,
                Err(e) => {
                    errors.push(ResolveError::template(
                        &config.source,
                        Some(field),
                        format!("`{{{}[{}]}}`: {}", name, selector_text.unwrap_or_default(), e),
                    ));
                    continue;
                }
            };
            let pool = selector.select(set, rng);
            if pool.is_empty() {
                let message = if set.is_empty() {
                    format!("import `{}` has no variations", name)
                } else {
                    format!("selector `[{}]` on `{{{}}}` selects no variation", selector, name)
                };
                errors.push(ResolveError::template(&config.source, Some(field), message));
                continue;
            }
            debug!(%name, pool = pool.len(), weight = selector.weight(), "prepare: slot");
            slots.push(Slot { name, selector, pool });
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(PreparedPrompt {
            positive,
            negative,
            slots,
            positive_text,
            negative_text,
        })
    }

    /// Warnings recorded while preparing
    pub fn take_warnings(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.warnings)
    }

    fn inject_chunks(
        &mut self,
        text: &str,
        field: &str,
        config: &ResolvedConfig,
        scope: &mut Imports,
        errors: &mut Vec<ResolveError>,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for mention in chunk_mentions(text) {
            out.push_str(&text[last..mention.start]);
            last = mention.end;
            match mention.parsed {
                Ok(chunk_ref) => out.push_str(&self.expand_chunk(&chunk_ref, field, config, scope, errors)),
                Err(message) => {
                    errors.push(ResolveError::template(&config.source, Some(field), message));
                    out.push_str(&text[mention.start..mention.end]);
                }
            }
        }
        out.push_str(&text[last..]);
        out
    }

    fn expand_chunk(
        &mut self,
        chunk_ref: &ChunkRef,
        field: &str,
        config: &ResolvedConfig,
        scope: &mut Imports,
        errors: &mut Vec<ResolveError>,
    ) -> String {
        debug!(chunk = %chunk_ref.name, "expand_chunk: called");
        let Some(decl) = config.chunks.get(&chunk_ref.name) else {
            errors.push(ResolveError::template(
                &config.source,
                Some(field),
                format!("unknown chunk `@{}`", chunk_ref.name),
            ));
            return String::new();
        };

        let chunk = match self
            .cache
            .load_relative(&decl.reference, &decl.origin, &format!("chunks.{}", chunk_ref.name))
            .and_then(|doc| self.inheritance.resolve_chunk(&doc))
        {
            Ok(chunk) => chunk,
            Err(e) => {
                errors.push(e);
                return String::new();
            }
        };

        let own_imports = match self.imports.resolve_all(&chunk.imports) {
            Ok(imports) => imports,
            Err(e) => {
                errors.extend(e);
                return String::new();
            }
        };
        for (import, set) in &own_imports {
            scope.insert(format!("{}.{}", chunk_ref.name, import), set.clone());
        }

        for (param, _) in &chunk_ref.bindings {
            if !placeholders(&chunk.body).iter().any(|p| p.name == param) {
                self.warnings.push(Finding::warning(
                    Category::Template,
                    &config.source,
                    Some(field),
                    format!("binding `{}` is not used by chunk `{}`", param, chunk_ref.name),
                ));
            }
        }

        fill_chunk_body(&chunk, chunk_ref, &own_imports, scope, errors)
    }
}

/// Replace every placeholder of a chunk body
fn fill_chunk_body(
    chunk: &ResolvedChunk,
    chunk_ref: &ChunkRef,
    own_imports: &Imports,
    scope: &Imports,
    errors: &mut Vec<ResolveError>,
) -> String {
    let body = &chunk.body;
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for placeholder in placeholders(body) {
        out.push_str(&body[last..placeholder.start]);
        last = placeholder.end;
        let name = placeholder.name;

        if is_reserved(name) {
            errors.push(ResolveError::template(
                &chunk.source,
                Some("template"),
                format!("reserved placeholder `{{{}}}` is not allowed in a chunk", name),
            ));
            continue;
        }

        let filled = if let Some((_, bound)) = chunk_ref.bindings.iter().find(|(p, _)| p == name) {
            Ok(bound.clone())
        } else if let Some(value) = chunk.overrides.get(name) {
            resolve_value_ref(value, &[own_imports, scope], &chunk.source, &format!("overrides.{}", name))
        } else if let Some(value) = chunk.defaults.get(name) {
            resolve_value_ref(value, &[own_imports, scope], &chunk.source, &format!("defaults.{}", name))
        } else if own_imports.contains_key(name) {
            Ok(match placeholder.selector {
                Some(selector) => format!("{{{}.{}[{}]}}", chunk_ref.name, name, selector),
                None => format!("{{{}.{}}}", chunk_ref.name, name),
            })
        } else {
            Err(ResolveError::template(
                &chunk.source,
                Some("template"),
                format!(
                    "placeholder `{{{}}}` of chunk `{}` is not bound, defaulted, overridden or imported",
                    name, chunk_ref.name
                ),
            ))
        };

        match filled {
            Ok(text) => out.push_str(&text),
            Err(e) => errors.push(e),
        }
    }
    out.push_str(&body[last..]);
    out
}

/// Split `text` into text and slot segments
fn segments(
    text: &str,
    loras: &str,
    table: &mut SlotTable,
    file: &Path,
    field: &'static str,
    errors: &mut Vec<ResolveError>,
) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut pending = String::new();
    let mut last = 0;
    for placeholder in placeholders(text) {
        pending.push_str(&text[last..placeholder.start]);
        last = placeholder.end;

        if is_reserved(placeholder.name) {
            if placeholder.name == "loras" {
                pending.push_str(loras);
            }
            continue;
        }

        match table.register(placeholder.name, placeholder.selector, field) {
            Ok(slot) => {
                if !pending.is_empty() {
                    out.push(Segment::Text(std::mem::take(&mut pending)));
                }
                out.push(Segment::Slot(slot));
            }
            Err(message) => errors.push(ResolveError::template(file, Some(field), message)),
        }
    }
    pending.push_str(&text[last..]);
    if !pending.is_empty() {
        out.push(Segment::Text(pending));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::VariationSet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        fs::canonicalize(path).unwrap()
    }

    fn set(entries: &[(&str, &str)]) -> VariationSet {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn prepare(prompt: &Path) -> Result<PreparedPrompt, Vec<ResolveError>> {
        let cache = Arc::new(DocumentCache::new());
        let mut inheritance = InheritanceResolver::new(cache.clone());
        let imports = ImportResolver::new(cache.clone());
        let config = inheritance.resolve(&cache.load_entry(prompt).unwrap()).unwrap();
        let scope = imports.resolve_all(&config.imports).unwrap();
        let mut resolver = TemplateResolver::new(cache.clone(), &mut inheritance, &imports, ",");
        resolver.prepare(&config, scope, &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_placeholders_found_in_order() {
        let found = placeholders("a {Hair[2;$5]}, {Scene.Place}, {loras} {not valid}");
        let names: Vec<&str> = found.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Hair", "Scene.Place", "loras"]);
        assert_eq!(found[0].selector, Some("2;$5"));
        assert_eq!(found[1].selector, None);
    }

    #[test]
    fn test_parse_chunk_ref_with_bindings() {
        let parsed = parse_chunk_ref("Character with Hair:{Hair[#0,2]}, Eyes:{Eyes}").unwrap();
        assert_eq!(parsed.name, "Character");
        assert_eq!(
            parsed.bindings,
            vec![
                ("Hair".to_string(), "{Hair[#0,2]}".to_string()),
                ("Eyes".to_string(), "{Eyes}".to_string()),
            ]
        );
        assert!(parse_chunk_ref("Character").unwrap().bindings.is_empty());
        assert!(parse_chunk_ref("Bad Name with X:{Y}").is_err());
        assert!(parse_chunk_ref("C with X").is_err());
    }

    #[test]
    fn test_render_loras() {
        let loras: BTreeMap<String, f64> = [("detail".to_string(), 0.6), ("style".to_string(), 1.0)].into();
        assert_eq!(render_loras(&loras, ","), "<lora:detail:0.6>, <lora:style:1>");
        assert_eq!(render_loras(&BTreeMap::new(), ","), "");
    }

    #[test]
    fn test_slot_table_shares_and_conflicts() {
        let mut table = SlotTable::default();
        assert_eq!(table.register("Hair", None, "prompt").unwrap(), 0);
        assert_eq!(table.register("Eyes", Some("2"), "prompt").unwrap(), 1);
        assert_eq!(table.register("Hair", Some("#1"), "negative-prompt").unwrap(), 0);
        assert_eq!(table.register("Hair", Some("#1"), "prompt").unwrap(), 0);
        assert!(table.register("Hair", Some("#2"), "prompt").is_err());
        assert_eq!(table.slots[0].2, "prompt");
    }

    #[test]
    fn test_render_segments() {
        let prepared = PreparedPrompt {
            positive: vec![
                Segment::Text("1girl, ".to_string()),
                Segment::Slot(0),
                Segment::Text(", ".to_string()),
                Segment::Slot(0),
            ],
            negative: vec![Segment::Text("lowres".to_string())],
            slots: vec![Slot {
                name: "Hair".to_string(),
                selector: Selector::default(),
                pool: set(&[("red", "red hair"), ("blue", "blue hair")]).iter().cloned().collect(),
            }],
            ..Default::default()
        };
        let (positive, negative) = prepared.render(&[1]);
        assert_eq!(positive, "1girl, blue hair, blue hair");
        assert_eq!(negative, "lowres");
    }

    #[test]
    fn test_prepare_with_parameterized_chunk() {
        let dir = tempdir().unwrap();
        write(&dir, "vars/hair.yaml", "red: red hair\nblue: blue hair\nblack: black hair\n");
        write(&dir, "vars/eyes.yaml", "green: green eyes\nblue: blue eyes\n");
        write(&dir, "vars/poses.yaml", "sit: sitting\nstand: standing\n");
        write(
            &dir,
            "chunks/girl.yaml",
            "type: character\nimports: {Pose: ../vars/poses.yaml, Eyes: ../vars/eyes.yaml}\ndefaults: {Outfit: school uniform}\noverrides: {EyeColor: Eyes.blue}\ntemplate: '1girl, {HairStyle}, {Outfit}, {EyeColor}, {Pose[#1]}'\n",
        );
        write(
            &dir,
            "base.yaml",
            "chunks: {Character: chunks/girl.yaml}\nloras: {detail: 0.5}\ntemplate: 'masterpiece, {prompt}, {loras}'\n",
        );
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: vars/hair.yaml}\nprompt: '@{Character with HairStyle:{Hair[#0,2]}}, smiling'\n",
        );

        let prepared = prepare(&prompt).unwrap();
        assert_eq!(
            prepared.positive_text,
            "masterpiece, 1girl, {Hair[#0,2]}, school uniform, blue eyes, {Character.Pose[#1]}, smiling, {loras}"
        );

        let names: Vec<&str> = prepared.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Hair", "Character.Pose"]);
        assert_eq!(prepared.slots[0].pool.len(), 2);
        assert_eq!(prepared.slots[1].pool[0].value, "standing");

        let (positive, _) = prepared.render(&[1, 0]);
        assert_eq!(
            positive,
            "masterpiece, 1girl, black hair, school uniform, blue eyes, standing, smiling, <lora:detail:0.5>"
        );
    }

    #[test]
    fn test_unbound_chunk_placeholder_is_error() {
        let dir = tempdir().unwrap();
        write(&dir, "c.yaml", "type: x\ntemplate: '{Mystery}'\n");
        write(&dir, "base.yaml", "chunks: {C: c.yaml}\ntemplate: '{prompt}'\n");
        let prompt = write(&dir, "p.yaml", "implements: base.yaml\ngeneration: {}\nprompt: '@C'\n");

        let errors = prepare(&prompt).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_template());
        assert!(errors[0].message().contains("Mystery"));
    }

    #[test]
    fn test_unknown_placeholder_and_empty_selection() {
        let dir = tempdir().unwrap();
        write(&dir, "hair.yaml", "red: red hair\n");
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {Hair: hair.yaml}\nprompt: '{Hair[#5]}, {Nope}, @Ghost'\n",
        );

        let errors = prepare(&prompt).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.is_template()));
    }

    #[test]
    fn test_leftover_markers_render_empty() {
        let dir = tempdir().unwrap();
        let template = write(&dir, "base.yaml", "template: 'a, {prompt}, b'\nnegative-prompt: 'lowres, {negprompt}'\n");
        let cache = Arc::new(DocumentCache::new());
        let mut inheritance = InheritanceResolver::new(cache.clone());
        let imports = ImportResolver::new(cache.clone());
        let config = inheritance.resolve(&cache.load_entry(&template).unwrap()).unwrap();
        let mut resolver = TemplateResolver::new(cache.clone(), &mut inheritance, &imports, ",");
        let prepared = resolver
            .prepare(&config, Imports::new(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(prepared.render(&[]), ("a, , b".to_string(), "lowres, ".to_string()));
    }

    #[test]
    fn test_chunk_mentions_need_a_word_boundary() {
        let found = chunk_mentions("photo by artist@studio, @Hero and (@{Villain with Hat:{Hat}}) me@x_y");
        let names: Vec<&str> = found
            .iter()
            .map(|m| m.parsed.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["Hero", "Villain"]);
        assert_eq!(found[1].parsed.as_ref().unwrap().bindings.len(), 1);

        let unterminated = chunk_mentions("a, @{Hero with X:{Y}");
        assert_eq!(unterminated.len(), 1);
        assert!(unterminated[0].parsed.is_err());
        assert_eq!(unterminated[0].end, "a, @{Hero with X:{Y}".len());
    }

    #[test]
    fn test_at_inside_word_is_plain_text() {
        let dir = tempdir().unwrap();
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nprompt: 'photo by artist@studio, 1girl'\n",
        );

        let prepared = prepare(&prompt).unwrap();
        assert_eq!(prepared.positive_text, "photo by artist@studio, 1girl");
    }

    #[test]
    fn test_negative_body_errors_name_negative_field() {
        let dir = tempdir().unwrap();
        write(&dir, "hair.yaml", "red: red hair\n");
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {}\nimports: {HairStyle: hair.yaml}\nprompt: '{HairStyle}'\nnegative-prompt: '@Ghost, {Hair}'\n",
        );

        let errors = prepare(&prompt).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.field().as_deref() == Some("negative-prompt")));
    }
}
