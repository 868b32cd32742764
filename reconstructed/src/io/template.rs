//! Template evaluation boundary.
//!
//! The interpreter only talks to templates through [`TemplateEvaluator`].
//! [`JinjaTemplar`] is the production implementation on top of minijinja;
//! tests may inject simpler evaluators.

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

/// A template failed to compile or evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error while templating '{template}': {message}")]
pub struct TemplateError {
    pub template: String,
    pub message: String,
}

impl TemplateError {
    pub fn new(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            message: message.into(),
        }
    }
}

/// Abstraction over the expression/template engine.
pub trait TemplateEvaluator {
    /// True if `text` contains template syntax and must be evaluated.
    fn is_possibly_template(&self, text: &str) -> bool;

    /// Evaluate a single template string against `vars`.
    fn template_str(&self, source: &str, vars: &Map<String, Value>) -> Result<Value, TemplateError>;

    /// Start and end markers of an expression.
    fn expression_delimiters(&self) -> (&str, &str) {
        ("{{", "}}")
    }

    /// Evaluate a value: strings are templated, sequences and mappings are
    /// templated element by element (mapping keys are kept verbatim), other
    /// scalars are returned unchanged.
    fn template(&self, source: &Value, vars: &Map<String, Value>) -> Result<Value, TemplateError> {
        match source {
            Value::String(text) => self.template_str(text, vars),
            Value::Array(items) => items
                .iter()
                .map(|item| self.template(item, vars))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(entries) => {
                let mut templated = Map::new();
                for (key, value) in entries {
                    templated.insert(key.clone(), self.template(value, vars)?);
                }
                Ok(Value::Object(templated))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Jinja evaluator backed by minijinja, with strict undefined handling.
pub struct JinjaTemplar {
    env: Environment<'static>,
}

impl JinjaTemplar {
    /// Evaluator with the `lookup()` global available.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Evaluator where calling `lookup()` fails.
    pub fn without_lookups() -> Self {
        Self::build(false)
    }

    fn build(lookups: bool) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        if lookups {
            env.add_function("lookup", lookup);
        }
        Self { env }
    }
}

impl Default for JinjaTemplar {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEvaluator for JinjaTemplar {
    fn is_possibly_template(&self, text: &str) -> bool {
        ["{{", "{%", "{#"].iter().any(|marker| text.contains(marker))
    }

    fn template_str(
        &self,
        source: &str,
        vars: &Map<String, Value>,
    ) -> Result<Value, TemplateError> {
        if !self.is_possibly_template(source) {
            return Ok(Value::String(source.to_string()));
        }
        let fail = |err: minijinja::Error| TemplateError::new(source, err.to_string());

        // A lone expression keeps its native type (lists, booleans, numbers).
        if let Some(expr) = single_expression(source) {
            trace!(expr, "evaluating native expression");
            let compiled = self.env.compile_expression(expr).map_err(fail)?;
            let value = compiled.eval(vars).map_err(fail)?;
            // Expressions yield undefined instead of raising, even in strict mode.
            if value.is_undefined() {
                return Err(TemplateError::new(source, format!("'{expr}' is undefined")));
            }
            return serde_json::to_value(&value)
                .map_err(|err| TemplateError::new(source, err.to_string()));
        }

        trace!(source, "rendering template");
        let rendered = self.env.render_str(source, vars).map_err(fail)?;
        Ok(Value::String(rendered))
    }
}

/// Return the inner expression if `source` is exactly one `{{ ... }}` block.
fn single_expression(source: &str) -> Option<&str> {
    let inner = source.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if ["{{", "}}", "{%", "{#"]
        .iter()
        .any(|marker| inner.contains(marker))
    {
        return None;
    }
    let inner = inner.strip_prefix('-').unwrap_or(inner);
    let inner = inner.strip_suffix('-').unwrap_or(inner);
    let inner = inner.trim();
    (!inner.is_empty()).then_some(inner)
}

/// `lookup(plugin, term)` template global.
fn lookup(plugin: String, term: String) -> Result<String, minijinja::Error> {
    match plugin.as_str() {
        "env" => Ok(std::env::var(&term).unwrap_or_default()),
        other => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("unsupported lookup plugin '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn detects_template_markers() {
        let templar = JinjaTemplar::new();
        assert!(templar.is_possibly_template("{{ n }}"));
        assert!(templar.is_possibly_template("{% if x %}y{% endif %}"));
        assert!(templar.is_possibly_template("a{# note #}"));
        assert!(!templar.is_possibly_template("plain_group"));
    }

    #[test]
    fn plain_strings_are_returned_as_is() {
        let templar = JinjaTemplar::new();
        let value = templar.template_str("g1", &Map::new()).expect("template");
        assert_eq!(value, json!("g1"));
    }

    #[test]
    fn single_expression_keeps_native_type() {
        let templar = JinjaTemplar::new();
        let vars = vars(json!({"items": ["a", "b"], "x": "1"}));
        assert_eq!(
            templar.template_str("{{ items }}", &vars).expect("list"),
            json!(["a", "b"])
        );
        assert_eq!(
            templar.template_str("{{ x == '1' }}", &vars).expect("bool"),
            json!(true)
        );
        assert_eq!(
            templar.template_str(" {{ [1, 2] | length }} ", &vars).expect("number"),
            json!(2)
        );
    }

    #[test]
    fn mixed_text_renders_to_string() {
        let templar = JinjaTemplar::new();
        let vars = vars(json!({"n": "web", "i": 3}));
        assert_eq!(
            templar.template_str("{{ n }}_{{ i }}", &vars).expect("render"),
            json!("web_3")
        );
    }

    #[test]
    fn undefined_variables_are_errors() {
        let templar = JinjaTemplar::new();
        let err = templar
            .template_str("{{ missing }}", &Map::new())
            .expect_err("undefined");
        assert_eq!(err.template, "{{ missing }}");
        let vars = vars(json!({"facts": {}}));
        templar
            .template_str("{{ facts.missing }}", &vars)
            .expect_err("undefined attribute");
        templar
            .template_str("{{ missing }}_suffix", &Map::new())
            .expect_err("undefined in rendered text");
    }

    #[test]
    fn template_recurses_into_containers() {
        let templar = JinjaTemplar::new();
        let vars = vars(json!({"n": "a"}));
        let value = templar
            .template(&json!({"k": ["{{ n }}", 1, true], "{{ n }}": null}), &vars)
            .expect("template");
        assert_eq!(value, json!({"k": ["a", 1, true], "{{ n }}": null}));
    }

    #[test]
    fn lookup_reads_environment() {
        let templar = JinjaTemplar::new();
        let value = templar
            .template_str("{{ lookup('env', 'RECONSTRUCTED_SURELY_UNSET') }}", &Map::new())
            .expect("lookup");
        assert_eq!(value, json!(""));
    }

    #[test]
    fn lookups_can_be_disabled() {
        let templar = JinjaTemplar::without_lookups();
        templar
            .template_str("{{ lookup('env', 'HOME') }}", &Map::new())
            .expect_err("lookup disabled");
    }
}
