//! Typed configuration documents
//!
//! The four document kinds form a closed set ([`ConfigDocument`]); callers
//! match on it exhaustively rather than probing fields.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Injection marker for the positive body
pub const PROMPT_MARKER: &str = "{prompt}";

/// Injection marker for the negative body
pub const NEGPROMPT_MARKER: &str = "{negprompt}";

/// Marker rendered from the merged LoRA map
pub const LORAS_MARKER: &str = "{loras}";

/// Placeholder names that are never variation references
pub const RESERVED_PLACEHOLDERS: [&str; 3] = ["prompt", "negprompt", "loras"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_PLACEHOLDERS.contains(&name)
}

/// Discriminant of a parsed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Template,
    Chunk,
    Prompt,
    VariationSet,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Template => "template",
            Self::Chunk => "chunk",
            Self::Prompt => "prompt",
            Self::VariationSet => "variation set",
        };
        write!(f, "{}", name)
    }
}

/// An import declaration as written in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportSpec {
    /// A single VariationSet document
    Document(String),
    /// Document references and inline literals, merged in order
    List(Vec<String>),
    /// Named sub-imports, registered as `Parent.Child`
    Nested(BTreeMap<String, ImportSpec>),
}

impl ImportSpec {
    /// Every document reference reachable from this declaration
    pub fn document_refs(&self) -> Vec<&str> {
        match self {
            Self::Document(path) => vec![path.as_str()],
            Self::List(entries) => entries
                .iter()
                .filter_map(|e| match ImportSource::classify(e) {
                    ImportSource::Document(path) => Some(path),
                    ImportSource::Literal(_) => None,
                })
                .collect(),
            Self::Nested(children) => children.values().flat_map(|c| c.document_refs()).collect(),
        }
    }

    /// Import names this declaration registers when declared as `name`
    pub fn registered_names(&self, name: &str) -> Vec<String> {
        match self {
            Self::Document(_) | Self::List(_) => vec![name.to_string()],
            Self::Nested(children) => children
                .iter()
                .flat_map(|(child, spec)| spec.registered_names(&format!("{}.{}", name, child)))
                .collect(),
        }
    }
}

/// One entry of an import list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource<'a> {
    Document(&'a str),
    Literal(&'a str),
}

impl<'a> ImportSource<'a> {
    /// Entries ending in `.yaml`/`.yml` are document references
    pub fn classify(entry: &'a str) -> Self {
        let trimmed = entry.trim();
        if trimmed.ends_with(".yaml") || trimmed.ends_with(".yml") {
            Self::Document(trimmed)
        } else {
            Self::Literal(entry)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Combinatorial,
    Random,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    Fixed,
    #[default]
    Progressive,
    Random,
}

/// Generation-run settings of a Prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub mode: GenerationMode,

    /// Seed base; absent or negative means a random base
    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(rename = "seed-mode", default)]
    pub seed_mode: SeedMode,

    /// Target number of outputs
    #[serde(rename = "max-images", default)]
    pub max_images: Option<u64>,
}

/// Base document providing shared settings and an injection shell
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TemplateConfig {
    #[serde(skip)]
    pub source: PathBuf,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub implements: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub imports: BTreeMap<String, ImportSpec>,

    #[serde(default)]
    pub chunks: BTreeMap<String, String>,

    #[serde(default)]
    pub loras: BTreeMap<String, f64>,

    /// Positive body; must contain `{prompt}`
    #[serde(default)]
    pub template: Option<String>,

    #[serde(rename = "negative-prompt", default)]
    pub negative_prompt: Option<String>,
}

/// Reusable, context-independent prompt fragment
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkConfig {
    #[serde(skip)]
    pub source: PathBuf,

    #[serde(rename = "type", default)]
    pub chunk_type: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub implements: Option<String>,

    #[serde(default)]
    pub imports: BTreeMap<String, ImportSpec>,

    /// Values for body placeholders the caller does not bind
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,

    /// Values that win over defaults
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,

    #[serde(default)]
    pub template: Option<String>,
}

/// Leaf document supplying final content and run settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PromptConfig {
    #[serde(skip)]
    pub source: PathBuf,

    #[serde(default)]
    pub name: String,

    /// Mandatory Template parent
    #[serde(default)]
    pub implements: Option<String>,

    pub generation: GenerationSettings,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub imports: BTreeMap<String, ImportSpec>,

    #[serde(default)]
    pub chunks: BTreeMap<String, String>,

    #[serde(default)]
    pub loras: BTreeMap<String, f64>,

    /// Positive body, injected into the template's `{prompt}`
    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(rename = "negative-prompt", default)]
    pub negative_prompt: Option<String>,
}

/// A single keyed variation value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variation {
    pub key: String,
    pub value: String,
}

impl Variation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered mapping of stable keys to literal text values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariationSet {
    entries: Vec<Variation>,
}

impl VariationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; an existing key is replaced in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|v| v.key == key) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Variation { key, value }),
        }
    }

    /// Append an inline literal under a content-hash key
    ///
    /// Returns the assigned key. A repeated literal gets a numeric suffix so
    /// keys stay unique within the set.
    pub fn push_literal(&mut self, literal: &str) -> String {
        let base = crate::hashing::literal_key(literal);
        let mut key = base.clone();
        let mut n = 1;
        while self.contains_key(&key) {
            n += 1;
            key = format!("{}-{}", base, n);
        }
        debug!(%key, "VariationSet::push_literal: assigned key");
        self.entries.push(Variation::new(key.clone(), literal));
        key
    }

    pub fn get(&self, key: &str) -> Option<&Variation> {
        self.entries.iter().find(|v| v.key == key)
    }

    pub fn get_index(&self, index: usize) -> Option<&Variation> {
        self.entries.get(index)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|v| v.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for VariationSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = VariationSet::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

/// A parsed document of one of the four kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDocument {
    Template(TemplateConfig),
    Chunk(ChunkConfig),
    Prompt(PromptConfig),
    VariationSet(VariationSet),
}

impl ConfigDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Template(_) => DocumentKind::Template,
            Self::Chunk(_) => DocumentKind::Chunk,
            Self::Prompt(_) => DocumentKind::Prompt,
            Self::VariationSet(_) => DocumentKind::VariationSet,
        }
    }

    /// Parent reference, for the kinds that can have one
    pub fn implements(&self) -> Option<&str> {
        match self {
            Self::Template(t) => t.implements.as_deref(),
            Self::Chunk(c) => c.implements.as_deref(),
            Self::Prompt(p) => p.implements.as_deref(),
            Self::VariationSet(_) => None,
        }
    }

    pub fn imports(&self) -> Option<&BTreeMap<String, ImportSpec>> {
        match self {
            Self::Template(t) => Some(&t.imports),
            Self::Chunk(c) => Some(&c.imports),
            Self::Prompt(p) => Some(&p.imports),
            Self::VariationSet(_) => None,
        }
    }

    pub fn chunks(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Template(t) => Some(&t.chunks),
            Self::Prompt(p) => Some(&p.chunks),
            Self::Chunk(_) | Self::VariationSet(_) => None,
        }
    }

    /// Every outgoing document reference as `(field, reference)`
    pub fn references(&self) -> Vec<(String, &str)> {
        let mut refs = Vec::new();
        if let Some(parent) = self.implements() {
            refs.push(("implements".to_string(), parent));
        }
        if let Some(imports) = self.imports() {
            for (name, spec) in imports {
                for path in spec.document_refs() {
                    refs.push((format!("imports.{}", name), path));
                }
            }
        }
        if let Some(chunks) = self.chunks() {
            for (name, path) in chunks {
                refs.push((format!("chunks.{}", name), path.as_str()));
            }
        }
        refs
    }

    /// Attach the canonical source path after deserialization
    pub(crate) fn with_source(mut self, source: &Path) -> Self {
        match &mut self {
            Self::Template(t) => t.source = source.to_path_buf(),
            Self::Chunk(c) => c.source = source.to_path_buf(),
            Self::Prompt(p) => p.source = source.to_path_buf(),
            Self::VariationSet(_) => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_source_classify() {
        assert_eq!(
            ImportSource::classify("variations/hair.yaml"),
            ImportSource::Document("variations/hair.yaml")
        );
        assert_eq!(ImportSource::classify("x.yml"), ImportSource::Document("x.yml"));
        assert_eq!(ImportSource::classify("silver hair"), ImportSource::Literal("silver hair"));
    }

    #[test]
    fn test_deserialize_import_spec_variants() {
        let yaml = r#"
Single: a.yaml
Mixed: [a.yaml, "red hair", b.yml]
Group:
  Place: places.yaml
  Light: [light.yaml, "rim light"]
"#;
        let imports: BTreeMap<String, ImportSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(imports["Single"], ImportSpec::Document("a.yaml".to_string()));
        assert_eq!(imports["Mixed"].document_refs(), vec!["a.yaml", "b.yml"]);
        assert_eq!(
            imports["Group"].registered_names("Group"),
            vec!["Group.Light".to_string(), "Group.Place".to_string()]
        );
    }

    #[test]
    fn test_variation_set_preserves_order() {
        let mut set = VariationSet::new();
        set.insert("z", "last letter");
        set.insert("a", "first letter");
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(set.get_index(1).unwrap().value, "first letter");
    }

    #[test]
    fn test_push_literal_keys_are_unique() {
        let mut set = VariationSet::new();
        let k1 = set.push_literal("red hair");
        let k2 = set.push_literal("red hair");
        let k3 = set.push_literal("blue hair");
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(&k2).unwrap().value, "red hair");
    }

    #[test]
    fn test_generation_settings_defaults() {
        let settings: GenerationSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.mode, GenerationMode::Combinatorial);
        assert_eq!(settings.seed_mode, SeedMode::Progressive);
        assert!(settings.seed.is_none());
        assert!(settings.max_images.is_none());
    }

    #[test]
    fn test_deserialize_generation_settings() {
        let yaml = r#"
mode: random
seed: 42
seed-mode: fixed
max-images: 10
"#;
        let settings: GenerationSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.mode, GenerationMode::Random);
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.seed_mode, SeedMode::Fixed);
        assert_eq!(settings.max_images, Some(10));
    }
}
