//! Document classification and typed parsing
//!
//! Classification is purely structural:
//! 1. a `type` field makes a Chunk
//! 2. a `generation` block makes a Prompt
//! 3. a flat scalar-to-scalar map makes a VariationSet (unless it carries the
//!    Template body field `template`)
//! 4. anything else is a Template
//!
//! Structural problems are accumulated per document instead of stopping at the
//! first one.

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::loader::Document;
use super::types::{ChunkConfig, ConfigDocument, DocumentKind, PromptConfig, TemplateConfig, VariationSet};
use crate::error::ResolveError;

const TEMPLATE_FIELDS: &[&str] = &[
    "name",
    "version",
    "implements",
    "parameters",
    "imports",
    "chunks",
    "loras",
    "template",
    "negative-prompt",
];

const PROMPT_FIELDS: &[&str] = &[
    "name",
    "version",
    "implements",
    "generation",
    "parameters",
    "imports",
    "chunks",
    "loras",
    "prompt",
    "negative-prompt",
];

const CHUNK_FIELDS: &[&str] = &[
    "type",
    "name",
    "version",
    "implements",
    "imports",
    "defaults",
    "overrides",
    "template",
];

/// Classify a raw document body; `None` when the root is not a mapping
pub fn classify(value: &Value) -> Option<DocumentKind> {
    let map = value.as_mapping()?;
    let kind = if map.contains_key("type") {
        DocumentKind::Chunk
    } else if map.contains_key("generation") {
        DocumentKind::Prompt
    } else if is_flat_scalar_map(map) && !map.contains_key("template") {
        DocumentKind::VariationSet
    } else {
        DocumentKind::Template
    };
    Some(kind)
}

fn is_flat_scalar_map(map: &Mapping) -> bool {
    map.iter().all(|(k, v)| scalar_to_string(k).is_some() && scalar_to_string(v).is_some())
}

/// Render a YAML scalar as text
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a loaded document into its typed config
pub fn parse(doc: &Document) -> Result<ConfigDocument, Vec<ResolveError>> {
    let file = doc.path();
    debug!(?file, "parse: called");

    let Some(kind) = classify(doc.value()) else {
        return Err(vec![ResolveError::structural(
            file,
            None,
            "document root must be a mapping",
        )]);
    };
    debug!(?file, %kind, "parse: classified");

    // as_mapping cannot fail once classify succeeded
    let map = doc.value().as_mapping().cloned().unwrap_or_default();
    let mut errors = Vec::new();

    let parsed = match kind {
        DocumentKind::VariationSet => {
            let set = map
                .iter()
                .filter_map(|(k, v)| Some((scalar_to_string(k)?, scalar_to_string(v)?)))
                .collect::<VariationSet>();
            Some(ConfigDocument::VariationSet(set))
        }
        DocumentKind::Template => {
            check_fields(file, &map, TEMPLATE_FIELDS, kind, &mut errors);
            if map.contains_key("prompt") {
                errors.push(ResolveError::structural(
                    file,
                    Some("prompt"),
                    "templates carry their body in `template`, not `prompt`",
                ));
            }
            if !map.contains_key("template") && !map.contains_key("implements") {
                errors.push(ResolveError::structural(
                    file,
                    Some("template"),
                    "template body is required for a template without a parent",
                ));
            }
            check_string_field(file, &map, "template", &mut errors);
            check_string_field(file, &map, "negative-prompt", &mut errors);
            deserialize::<TemplateConfig>(file, doc.value(), &mut errors).map(ConfigDocument::Template)
        }
        DocumentKind::Prompt => {
            check_fields(file, &map, PROMPT_FIELDS, kind, &mut errors);
            if map.contains_key("template") {
                errors.push(ResolveError::structural(
                    file,
                    Some("template"),
                    "prompts carry their body in `prompt`, not `template`",
                ));
            }
            if !map.contains_key("implements") {
                errors.push(ResolveError::structural(
                    file,
                    Some("implements"),
                    "a prompt must implement a template",
                ));
            }
            if !map.contains_key("prompt") {
                errors.push(ResolveError::structural(file, Some("prompt"), "prompt body is required"));
            }
            if !map.get("generation").is_some_and(Value::is_mapping) {
                errors.push(ResolveError::structural(
                    file,
                    Some("generation"),
                    "generation must be a mapping",
                ));
            }
            check_string_field(file, &map, "prompt", &mut errors);
            check_string_field(file, &map, "negative-prompt", &mut errors);
            deserialize::<PromptConfig>(file, doc.value(), &mut errors).map(ConfigDocument::Prompt)
        }
        DocumentKind::Chunk => {
            check_fields(file, &map, CHUNK_FIELDS, kind, &mut errors);
            if map.contains_key("prompt") {
                errors.push(ResolveError::structural(
                    file,
                    Some("prompt"),
                    "chunks carry their body in `template`, not `prompt`",
                ));
            }
            if !map.contains_key("template") && !map.contains_key("implements") {
                errors.push(ResolveError::structural(
                    file,
                    Some("template"),
                    "chunk body is required for a chunk without a parent",
                ));
            }
            match map.get("type") {
                Some(Value::String(_)) | Some(Value::Null) => {}
                _ => errors.push(ResolveError::structural(
                    file,
                    Some("type"),
                    "chunk type must be a string or empty",
                )),
            }
            check_string_field(file, &map, "template", &mut errors);
            deserialize::<ChunkConfig>(file, doc.value(), &mut errors).map(|mut c| {
                // `type: ""` is treated the same as an absent type
                if c.chunk_type.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    c.chunk_type = None;
                }
                ConfigDocument::Chunk(c)
            })
        }
    };

    match parsed {
        Some(config) if errors.is_empty() => Ok(config.with_source(file)),
        _ => {
            debug!(?file, error_count = errors.len(), "parse: structural errors");
            Err(errors)
        }
    }
}

fn check_fields(
    file: &std::path::Path,
    map: &Mapping,
    allowed: &[&str],
    kind: DocumentKind,
    errors: &mut Vec<ResolveError>,
) {
    for key in map.keys() {
        let Some(name) = key.as_str() else {
            errors.push(ResolveError::structural(file, None, "field names must be strings"));
            continue;
        };
        // Wrong body fields get their own, more specific message
        if name == "prompt" || name == "template" {
            continue;
        }
        if !allowed.contains(&name) {
            errors.push(ResolveError::structural(
                file,
                Some(name),
                format!("unknown field `{}` for a {}", name, kind),
            ));
        }
    }
}

fn check_string_field(file: &std::path::Path, map: &Mapping, field: &str, errors: &mut Vec<ResolveError>) {
    if let Some(value) = map.get(field)
        && !value.is_string()
    {
        errors.push(ResolveError::structural(file, Some(field), format!("`{}` must be text", field)));
    }
}

fn deserialize<T: DeserializeOwned>(file: &std::path::Path, value: &Value, errors: &mut Vec<ResolveError>) -> Option<T> {
    match serde_yaml::from_value::<T>(value.clone()) {
        Ok(config) => Some(config),
        Err(e) => {
            errors.push(ResolveError::structural(file, None, format!("invalid shape: {}", e)));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::types::{GenerationMode, ImportSpec};
    use std::path::PathBuf;

    fn doc(yaml: &str) -> Document {
        Document::new(PathBuf::from("/fixtures/doc.yaml"), serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_classify_discriminants() {
        let chunk: Value = serde_yaml::from_str("type: character\ntemplate: x").unwrap();
        let prompt: Value = serde_yaml::from_str("generation: {}\nprompt: x").unwrap();
        let vars: Value = serde_yaml::from_str("red: red hair\nblue: blue hair").unwrap();
        let template: Value = serde_yaml::from_str("template: '{prompt}'\nparameters: {steps: 20}").unwrap();
        let minimal_template: Value = serde_yaml::from_str("name: t\ntemplate: '{prompt}'").unwrap();
        let list: Value = serde_yaml::from_str("- a\n- b").unwrap();

        assert_eq!(classify(&chunk), Some(DocumentKind::Chunk));
        assert_eq!(classify(&prompt), Some(DocumentKind::Prompt));
        assert_eq!(classify(&vars), Some(DocumentKind::VariationSet));
        assert_eq!(classify(&template), Some(DocumentKind::Template));
        assert_eq!(classify(&minimal_template), Some(DocumentKind::Template));
        assert_eq!(classify(&list), None);
    }

    #[test]
    fn test_parse_variation_set_keeps_order_and_stringifies() {
        let parsed = parse(&doc("z: zebra\n1: one\nyes_key: true")).unwrap();
        let ConfigDocument::VariationSet(set) = parsed else {
            panic!("expected variation set");
        };
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys, vec!["z", "1", "yes_key"]);
        assert_eq!(set.get("yes_key").unwrap().value, "true");
    }

    #[test]
    fn test_parse_prompt() {
        let yaml = r#"
name: study
implements: base.yaml
generation:
  mode: random
  max-images: 5
imports:
  Hair: [hair.yaml, "silver hair"]
prompt: "1girl, {Hair}"
"#;
        let ConfigDocument::Prompt(p) = parse(&doc(yaml)).unwrap() else {
            panic!("expected prompt");
        };
        assert_eq!(p.name, "study");
        assert_eq!(p.implements.as_deref(), Some("base.yaml"));
        assert_eq!(p.generation.mode, GenerationMode::Random);
        assert!(matches!(p.imports["Hair"], ImportSpec::List(_)));
        assert_eq!(p.source, PathBuf::from("/fixtures/doc.yaml"));
    }

    #[test]
    fn test_prompt_with_template_body_field_is_structural_error() {
        let yaml = r#"
implements: base.yaml
generation: {}
template: "1girl"
"#;
        let errors = parse(&doc(yaml)).unwrap_err();
        assert!(errors.iter().any(|e| e.field().as_deref() == Some("template")));
        // The missing `prompt` body is reported in the same pass
        assert!(errors.iter().any(|e| e.field().as_deref() == Some("prompt")));
    }

    #[test]
    fn test_template_with_prompt_field_is_structural_error() {
        let errors = parse(&doc("parameters: {steps: 1}\nprompt: 'x'\ntemplate: '{prompt}'")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("`template`"));
    }

    #[test]
    fn test_prompt_requires_implements() {
        let errors = parse(&doc("generation: {}\nprompt: x")).unwrap_err();
        assert!(errors.iter().any(|e| e.field().as_deref() == Some("implements")));
    }

    #[test]
    fn test_unknown_fields_accumulate() {
        let errors = parse(&doc("type: c\ntemplate: x\ncolour: red\nsize: 3")).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_empty_chunk_type_is_absent() {
        let ConfigDocument::Chunk(c) = parse(&doc("type: ''\ntemplate: x")).unwrap() else {
            panic!("expected chunk");
        };
        assert!(c.chunk_type.is_none());

        let ConfigDocument::Chunk(c) = parse(&doc("type: ~\ntemplate: x")).unwrap() else {
            panic!("expected chunk");
        };
        assert!(c.chunk_type.is_none());
    }

    #[test]
    fn test_non_mapping_root() {
        let errors = parse(&doc("- a")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ResolveError::Structural { .. }));
    }
}
