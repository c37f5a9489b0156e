//! Engine: validation and compilation of Prompt documents
//!
//! An [`Engine`] owns the document cache, the generation defaults and the
//! random source. [`Engine::compile`] validates a Prompt, resolves it and
//! hands back a [`CompiledPrompt`] from which combinations are pulled lazily.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::GenerationConfig;
use crate::document::{DocumentCache, DocumentKind, GenerationMode, GenerationSettings, classify};
use crate::error::ResolveError;
use crate::generate::{Combinations, combinatorial_space, nesting_order, random_space};
use crate::resolve::{PreparedPrompt, Slot, resolve_prompt};
use crate::validation::{Finding, ValidationReport, Validator};

pub struct Engine {
    cache: Arc<DocumentCache>,
    config: GenerationConfig,
    rng: StdRng,
}

impl Engine {
    pub fn new(config: GenerationConfig) -> Self {
        Self::with_cache(Arc::new(DocumentCache::new()), config)
    }

    /// Build an engine sharing an existing document cache
    pub fn with_cache(cache: Arc<DocumentCache>, config: GenerationConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { cache, config, rng }
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Run every validation phase for the Prompt at `entry`
    pub fn validate(&self, entry: &Path) -> ValidationReport {
        Validator::new(self.cache.clone(), &self.config.separator).validate(entry)
    }

    /// Validate and resolve the Prompt at `entry`
    pub fn compile(&mut self, entry: &Path) -> Result<CompiledPrompt, ValidationReport> {
        info!(entry = %entry.display(), "Compiling prompt");
        let report = self.validate(entry);
        if report.has_errors() {
            warn!(entry = %entry.display(), errors = report.errors().count(), "Validation failed");
            return Err(report);
        }

        let failed = |errors: Vec<ResolveError>| {
            let mut report = report.clone();
            errors.into_iter().for_each(|e| report.error(e));
            report
        };
        let doc = self.cache.load_entry(entry).map_err(|e| failed(vec![e]))?;
        let resolution = resolve_prompt(&self.cache, &doc, &self.config.separator, &mut self.rng).map_err(failed)?;

        let config = resolution.config;
        let generation = config.generation.clone().unwrap_or_default();
        let compiled = CompiledPrompt {
            name: config.name.clone(),
            source: config.source.clone(),
            parameters: config.parameters.clone(),
            loras: config.loras.clone(),
            generation,
            warnings: report.warnings().cloned().collect(),
            prepared: Arc::new(resolution.prepared),
            rng_seed: self.rng.random(),
            config: self.config.clone(),
        };
        info!(
            name = %compiled.name,
            slots = compiled.slots().len(),
            space = compiled.space_size(),
            "Compiled prompt"
        );
        Ok(compiled)
    }
}

/// Every YAML document under `root` classified as a Prompt, sorted by path
pub fn discover_prompts(root: &Path) -> Vec<PathBuf> {
    debug!(?root, "discover_prompts: called");
    let mut prompts = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }
        let value = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_yaml::from_str::<serde_yaml::Value>(&content).ok());
        match value {
            Some(value) if classify(&value) == Some(DocumentKind::Prompt) => prompts.push(path.to_path_buf()),
            Some(_) => {}
            None => warn!(path = %path.display(), "Skipping unreadable YAML document"),
        }
    }
    prompts
}

/// A validated, fully resolved Prompt
#[derive(Debug, Clone)]
pub struct CompiledPrompt {
    pub name: String,
    pub source: PathBuf,
    /// Generation parameters merged along the whole chain
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    pub loras: BTreeMap<String, f64>,
    pub generation: GenerationSettings,
    pub warnings: Vec<Finding>,
    prepared: Arc<PreparedPrompt>,
    rng_seed: u64,
    config: GenerationConfig,
}

impl CompiledPrompt {
    pub fn slots(&self) -> &[Slot] {
        &self.prepared.slots
    }

    pub fn prepared(&self) -> &PreparedPrompt {
        &self.prepared
    }

    /// Slots of the nested loops, outermost first
    pub fn nesting(&self) -> Vec<&Slot> {
        nesting_order(self.slots()).into_iter().map(|i| &self.slots()[i]).collect()
    }

    /// Number of distinct outputs the generation mode can produce
    pub fn space_size(&self) -> u128 {
        match self.generation.mode {
            GenerationMode::Combinatorial => combinatorial_space(self.slots()),
            GenerationMode::Random => random_space(self.slots()),
        }
    }

    /// A fresh lazy sequence; every call replays the same sequence
    pub fn combinations(&self) -> Combinations {
        Combinations::new(
            self.prepared.clone(),
            &self.generation,
            &self.config,
            StdRng::seed_from_u64(self.rng_seed),
        )
    }

    pub fn summary(&self) -> PromptSummary<'_> {
        PromptSummary {
            name: &self.name,
            source: &self.source,
            mode: self.generation.mode,
            parameters: &self.parameters,
            positive: &self.prepared.positive_text,
            negative: &self.prepared.negative_text,
            slots: self
                .slots()
                .iter()
                .map(|slot| SlotSummary {
                    name: &slot.name,
                    selector: slot.selector.to_string(),
                    weight: slot.weight(),
                    pool: slot.pool.len(),
                })
                .collect(),
            nesting: self.nesting().iter().map(|s| s.name.as_str()).collect(),
            space_size: self.space_size().to_string(),
            warnings: &self.warnings,
        }
    }
}

/// Serializable overview of a compiled prompt
#[derive(Debug, Serialize)]
pub struct PromptSummary<'a> {
    pub name: &'a str,
    pub source: &'a Path,
    pub mode: GenerationMode,
    pub parameters: &'a BTreeMap<String, serde_yaml::Value>,
    pub positive: &'a str,
    pub negative: &'a str,
    pub slots: Vec<SlotSummary<'a>>,
    pub nesting: Vec<&'a str>,
    /// Decimal string; may exceed what JSON numbers hold
    #[serde(rename = "space-size")]
    pub space_size: String,
    pub warnings: &'a [Finding],
}

#[derive(Debug, Serialize)]
pub struct SlotSummary<'a> {
    pub name: &'a str,
    pub selector: String,
    pub weight: u32,
    pub pool: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn seeded() -> Engine {
        Engine::new(GenerationConfig {
            rng_seed: Some(9),
            ..Default::default()
        })
    }

    #[test]
    fn test_compile_and_generate() {
        let dir = tempdir().unwrap();
        write(&dir, "hair.yaml", "red: red hair\nblue: blue hair\n");
        write(&dir, "base.yaml", "parameters: {steps: 20}\ntemplate: 'masterpiece, {prompt}, detailed'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "name: study\nimplements: base.yaml\ngeneration: {seed: 5, seed-mode: fixed}\nimports: {Hair: hair.yaml}\nprompt: '1girl, {Hair}'\n",
        );

        let compiled = seeded().compile(&prompt).unwrap();
        assert_eq!(compiled.name, "study");
        assert_eq!(compiled.space_size(), 2);
        assert_eq!(compiled.parameters["steps"], serde_yaml::Value::from(20));

        let all: Vec<_> = compiled.combinations().collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].positive, "masterpiece, 1girl, red hair, detailed");
        assert_eq!(all[1].positive, "masterpiece, 1girl, blue hair, detailed");
        assert!(all.iter().all(|c| c.seed == 5));
    }

    #[test]
    fn test_compile_returns_full_report() {
        let dir = tempdir().unwrap();
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: missing.yaml\ngeneration: {}\nimports: {Hair: gone.yaml}\nprompt: x\n",
        );
        let report = seeded().compile(&prompt).unwrap_err();
        assert_eq!(report.errors().count(), 2);
    }

    #[test]
    fn test_combinations_replay() {
        let dir = tempdir().unwrap();
        write(&dir, "v.yaml", "a: A\nb: B\nc: C\nd: D\n");
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        let prompt = write(
            &dir,
            "p.yaml",
            "implements: base.yaml\ngeneration: {mode: random, max-images: 3}\nimports: {V: v.yaml}\nprompt: '{V}'\n",
        );
        let compiled = seeded().compile(&prompt).unwrap();
        let first: Vec<_> = compiled.combinations().collect();
        let second: Vec<_> = compiled.combinations().collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_discover_prompts() {
        let dir = tempdir().unwrap();
        write(&dir, "base.yaml", "template: '{prompt}'\n");
        write(&dir, "prompts/a.yaml", "implements: ../base.yaml\ngeneration: {}\nprompt: x\n");
        write(&dir, "prompts/b.yml", "implements: ../base.yaml\ngeneration: {}\nprompt: y\n");
        write(&dir, "vars/v.yaml", "a: A\n");
        write(&dir, "notes.txt", "generation: {}\n");

        let found = discover_prompts(dir.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("prompts/a.yaml"));
    }
}
