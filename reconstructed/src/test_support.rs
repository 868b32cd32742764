//! Test-only helpers: a minimal template evaluator and inventory builders.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::io::inventory::{MemoryInventory, write_inventory};
use crate::io::template::{TemplateError, TemplateEvaluator};

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("reference regex")
});

/// Evaluator that only understands `{{ name }}` references.
///
/// A string made of a single reference evaluates to the variable's value
/// with its type intact; references mixed with text are substituted into a
/// string. Anything else inside `{{ }}`, or an unknown variable, is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstitutingTemplar;

impl TemplateEvaluator for SubstitutingTemplar {
    fn is_possibly_template(&self, text: &str) -> bool {
        text.contains("{{")
    }

    fn template_str(
        &self,
        source: &str,
        vars: &Map<String, Value>,
    ) -> Result<Value, TemplateError> {
        if !self.is_possibly_template(source) {
            return Ok(Value::String(source.to_string()));
        }
        let lookup = |name: &str| {
            vars.get(name)
                .cloned()
                .ok_or_else(|| TemplateError::new(source, format!("'{name}' is undefined")))
        };

        let trimmed = source.trim();
        if let Some(captures) = REFERENCE_RE.captures(trimmed)
            && captures.get(0).is_some_and(|whole| whole.as_str() == trimmed)
        {
            return lookup(&captures[1]);
        }

        let mut rendered = String::new();
        let mut last = 0;
        for captures in REFERENCE_RE.captures_iter(source) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            rendered.push_str(&source[last..whole.start()]);
            match lookup(&captures[1])? {
                Value::String(text) => rendered.push_str(&text),
                other => rendered.push_str(&other.to_string()),
            }
            last = whole.end();
        }
        rendered.push_str(&source[last..]);
        if rendered.contains("{{") {
            return Err(TemplateError::new(source, "unsupported expression"));
        }
        Ok(Value::String(rendered))
    }
}

/// Inventory holding the given hosts, without facts or extra groups.
pub fn inventory_with_hosts(hosts: &[&str]) -> MemoryInventory {
    let mut inventory = MemoryInventory::new();
    for host in hosts {
        inventory.add_host(host, Map::new());
    }
    inventory
}

/// Build a fact mapping from `(name, value)` pairs.
pub fn facts(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Unwrap a JSON list literal into instruction records.
pub fn records(list: Value) -> Vec<Value> {
    match list {
        Value::Array(records) => records,
        other => vec![other],
    }
}

/// Scratch directory holding source and inventory files.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `contents` to `name` and return its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write workspace file");
        path
    }

    /// Write `inventory` as JSON to `name` and return its path.
    pub fn write_inventory(&self, name: &str, inventory: &MemoryInventory) -> PathBuf {
        let path = self.path(name);
        write_inventory(&path, inventory).expect("write inventory");
        path
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_reference_keeps_type() {
        let vars = facts(&[("xs", json!([1, 2]))]);
        let value = SubstitutingTemplar
            .template_str("{{xs}}", &vars)
            .expect("template");
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn mixed_text_is_substituted() {
        let vars = facts(&[("a", json!("x")), ("b", json!(2))]);
        let value = SubstitutingTemplar
            .template_str("{{ a }}-{{ b }}", &vars)
            .expect("template");
        assert_eq!(value, json!("x-2"));
    }

    #[test]
    fn unknown_names_and_expressions_fail() {
        SubstitutingTemplar
            .template_str("{{ nope }}", &Map::new())
            .expect_err("undefined");
        SubstitutingTemplar
            .template_str("{{ 1 + 1 }}", &Map::new())
            .expect_err("expression");
    }
}
