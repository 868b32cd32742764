//! Source documents: the file a user points the interpreter at.
//!
//! A source holds the run options and the raw instruction records. It may be
//! written as YAML, JSON or TOML and is checked against the embedded JSON
//! Schema before it is deserialized.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::types::{RunOnceScope, RunOptions, Strictness};

/// Value of the `plugin` field every source must carry.
pub const PLUGIN_NAME: &str = "reconstructed";

const SOURCE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/source.v1.schema.json"
));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub plugin: String,
    #[serde(default)]
    pub strictness: Strictness,
    #[serde(default)]
    pub run_once: RunOnceScope,
    pub instructions: Vec<Value>,
}

impl SourceFile {
    pub fn options(&self) -> RunOptions {
        RunOptions {
            strictness: self.strictness,
            run_once: self.run_once,
        }
    }
}

/// True if `path` has an extension this loader understands.
pub fn verify_file(path: &Path) -> bool {
    Format::from_path(path).is_some()
}

/// Read, validate and deserialize a source document.
pub fn load_source(path: &Path) -> Result<SourceFile> {
    let Some(format) = Format::from_path(path) else {
        bail!(
            "unsupported source file {} (expected .yml, .yaml, .json or .toml)",
            path.display()
        );
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read source {}", path.display()))?;
    let document = parse_document(format, &contents)
        .with_context(|| format!("parse source {}", path.display()))?;
    validate_schema(&document).with_context(|| format!("validate source {}", path.display()))?;
    let source: SourceFile = serde_json::from_value(document)
        .with_context(|| format!("decode source {}", path.display()))?;
    if source.plugin != PLUGIN_NAME {
        bail!(
            "source {} is not for this plugin (plugin: {})",
            path.display(),
            source.plugin
        );
    }
    debug!(
        path = %path.display(),
        instructions = source.instructions.len(),
        strictness = ?source.strictness,
        run_once = ?source.run_once,
        "source loaded"
    );
    Ok(source)
}

fn parse_document(format: Format, contents: &str) -> Result<Value> {
    let value: Value = match format {
        Format::Yaml => serde_yaml::from_str(contents)?,
        Format::Json => serde_json::from_str(contents)?,
        Format::Toml => toml::from_str(contents)?,
    };
    Ok(value)
}

fn validate_schema(document: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SOURCE_SCHEMA).context("parse source schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(document) {
        let messages = compiled
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "source schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
