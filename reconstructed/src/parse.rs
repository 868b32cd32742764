//! Instruction record parsing.
//!
//! Records are generic structured values (parsed YAML, JSON or TOML). The
//! [`Parser`] validates them eagerly and builds the immutable instruction
//! tree; any schema problem is reported as a [`ParseError`] and aborts the
//! load.

use serde_json::{Map, Value};
use tracing::trace;

use crate::core::error::ParseError;
use crate::core::instruction::{
    Action, DEFAULT_LOOP_VAR, ERROR_VAR, Instruction, LoopSource, NameField, RunOnceId,
    SetTarget,
};
use crate::core::names::{is_identifier, is_valid_group_name};
use crate::io::template::TemplateEvaluator;

/// Fields every instruction accepts.
const COMMON_FIELDS: [&str; 6] = ["action", "when", "loop", "loop_var", "run_once", "vars"];

/// Known action tags.
pub const ACTIONS: [&str; 8] = [
    "create_group",
    "add_host",
    "add_child",
    "set_fact",
    "set_var",
    "fail",
    "stop",
    "block",
];

fn action_fields(action: &str) -> &'static [&'static str] {
    match action {
        "create_group" => &["group", "parent", "add_host"],
        "add_host" => &["group"],
        "add_child" => &["group", "child"],
        "set_fact" | "set_var" => &["name", "value"],
        "fail" => &["msg"],
        "block" => &["block", "rescue", "always"],
        _ => &[],
    }
}

/// Builds instructions from records.
///
/// The parser asks the template evaluator whether name fields may be
/// templates, and hands out the identifiers of `run_once` instructions.
pub struct Parser<'t> {
    templar: &'t dyn TemplateEvaluator,
    next_run_once: usize,
}

impl<'t> Parser<'t> {
    pub fn new(templar: &'t dyn TemplateEvaluator) -> Self {
        Self {
            templar,
            next_run_once: 0,
        }
    }

    /// Parse a top-level list of records.
    pub fn parse_list(&mut self, records: &[Value]) -> Result<Vec<Instruction>, ParseError> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.parse_instruction(record)
                    .map_err(|err| ParseError::AtIndex {
                        index,
                        inner: Box::new(err),
                    })
            })
            .collect()
    }

    /// Parse and validate a single instruction record.
    pub fn parse_instruction(&mut self, record: &Value) -> Result<Instruction, ParseError> {
        let Value::Object(record) = record else {
            return Err(ParseError::NotAMapping);
        };
        let action = match record.get("action") {
            None => return Err(ParseError::MissingAction),
            Some(Value::String(action)) => action.as_str(),
            Some(_) => return Err(ParseError::ActionNotAString),
        };
        let tag = ACTIONS
            .iter()
            .copied()
            .find(|known| *known == action)
            .ok_or_else(|| ParseError::UnknownAction(action.to_string()))?;
        trace!(action = tag, "parsing instruction");

        check_fields(tag, record)?;
        let condition = parse_condition(tag, record)?;
        let (loop_source, loop_var) = parse_loop(tag, record)?;
        let vars = parse_vars(tag, record)?;
        let run_once = self.parse_run_once(tag, record)?;

        let mut save: Vec<String> = vars.iter().map(|(name, _)| name.clone()).collect();
        if loop_source.is_some() && !save.contains(&loop_var) {
            save.push(loop_var.clone());
        }
        if tag == "block" && !save.iter().any(|name| name == ERROR_VAR) {
            save.push(ERROR_VAR.to_string());
        }

        let action = self.parse_action(tag, record)?;
        Ok(Instruction {
            condition,
            loop_source,
            loop_var,
            vars,
            run_once,
            save,
            action,
        })
    }

    fn parse_run_once(
        &mut self,
        tag: &'static str,
        record: &Map<String, Value>,
    ) -> Result<Option<RunOnceId>, ParseError> {
        match record.get("run_once") {
            None | Some(Value::Bool(false)) => Ok(None),
            Some(Value::Bool(true)) => {
                let id = RunOnceId(self.next_run_once);
                self.next_run_once += 1;
                Ok(Some(id))
            }
            Some(_) => Err(ParseError::invalid(tag, "'run_once' must be a boolean")),
        }
    }

    fn parse_action(
        &mut self,
        tag: &'static str,
        record: &Map<String, Value>,
    ) -> Result<Action, ParseError> {
        let action = match tag {
            "create_group" => Action::CreateGroup {
                group: self.required_group_name(tag, record, "group")?,
                parent: self.group_name(tag, record, "parent")?,
                add_host: match record.get("add_host") {
                    None => false,
                    Some(Value::Bool(flag)) => *flag,
                    Some(_) => {
                        return Err(ParseError::invalid(tag, "'add_host' must be a boolean"));
                    }
                },
            },
            "add_host" => Action::AddHost {
                group: self.required_group_name(tag, record, "group")?,
            },
            "add_child" => Action::AddChild {
                group: self.required_group_name(tag, record, "group")?,
                child: self.required_group_name(tag, record, "child")?,
            },
            "set_fact" | "set_var" => Action::Set {
                target: if tag == "set_fact" {
                    SetTarget::Fact
                } else {
                    SetTarget::Var
                },
                name: self.variable_name(tag, record)?,
                value: record
                    .get("value")
                    .cloned()
                    .ok_or(ParseError::MissingField {
                        action: tag,
                        field: "value",
                    })?,
            },
            "fail" => Action::Fail {
                msg: record.get("msg").cloned(),
            },
            "stop" => Action::Stop,
            "block" => Action::Block {
                block: self.nested_list(tag, record, "block", true)?,
                rescue: self.nested_list(tag, record, "rescue", false)?,
                always: self.nested_list(tag, record, "always", false)?,
            },
            other => return Err(ParseError::UnknownAction(other.to_string())),
        };
        Ok(action)
    }

    /// Parse an optional group name field.
    ///
    /// Strings that may be templates are kept verbatim; literal names are
    /// trimmed and validated now.
    fn group_name(
        &self,
        tag: &'static str,
        record: &Map<String, Value>,
        field: &'static str,
    ) -> Result<Option<NameField>, ParseError> {
        let Some(value) = record.get(field) else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(ParseError::invalid(
                tag,
                format!("'{field}' field must be a string"),
            ));
        };
        if self.templar.is_possibly_template(raw) {
            return Ok(Some(NameField::Template(raw.clone())));
        }
        let name = raw.trim();
        if !is_valid_group_name(name) {
            return Err(ParseError::invalid(
                tag,
                format!("invalid group name '{name}' in field '{field}'"),
            ));
        }
        Ok(Some(NameField::Literal(name.to_string())))
    }

    fn required_group_name(
        &self,
        tag: &'static str,
        record: &Map<String, Value>,
        field: &'static str,
    ) -> Result<NameField, ParseError> {
        self.group_name(tag, record, field)?
            .ok_or(ParseError::MissingField { action: tag, field })
    }

    fn variable_name(
        &self,
        tag: &'static str,
        record: &Map<String, Value>,
    ) -> Result<NameField, ParseError> {
        let raw = match record.get("name") {
            None => {
                return Err(ParseError::MissingField {
                    action: tag,
                    field: "name",
                });
            }
            Some(Value::String(raw)) => raw,
            Some(_) => return Err(ParseError::invalid(tag, "'name' must be a string")),
        };
        if self.templar.is_possibly_template(raw) {
            return Ok(NameField::Template(raw.clone()));
        }
        if !is_identifier(raw) {
            return Err(ParseError::invalid(
                tag,
                format!("'{raw}' is not a valid variable name"),
            ));
        }
        Ok(NameField::Literal(raw.clone()))
    }

    fn nested_list(
        &mut self,
        tag: &'static str,
        record: &Map<String, Value>,
        field: &'static str,
        required: bool,
    ) -> Result<Vec<Instruction>, ParseError> {
        let records = match record.get(field) {
            None if required => return Err(ParseError::MissingField { action: tag, field }),
            None => return Ok(Vec::new()),
            Some(Value::Array(records)) => records,
            Some(_) => {
                return Err(ParseError::invalid(
                    tag,
                    format!("'{field}' field must be a list"),
                ));
            }
        };
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.parse_instruction(record)
                    .map_err(|err| ParseError::Nested {
                        action: tag,
                        field,
                        index,
                        inner: Box::new(err),
                    })
            })
            .collect()
    }
}

fn check_fields(tag: &'static str, record: &Map<String, Value>) -> Result<(), ParseError> {
    let allowed = action_fields(tag);
    let mut extra: Vec<String> = record
        .keys()
        .filter(|key| !COMMON_FIELDS.contains(&key.as_str()) && !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort();
    Err(ParseError::UnsupportedFields {
        action: tag,
        fields: extra,
    })
}

fn parse_condition(
    tag: &'static str,
    record: &Map<String, Value>,
) -> Result<Option<String>, ParseError> {
    match record.get("when") {
        None => Ok(None),
        Some(Value::String(condition)) => Ok(Some(condition.clone())),
        Some(_) => Err(ParseError::invalid(tag, "'when' clause is not a string")),
    }
}

fn parse_loop(
    tag: &'static str,
    record: &Map<String, Value>,
) -> Result<(Option<LoopSource>, String), ParseError> {
    let source = match record.get("loop") {
        None => {
            if record.contains_key("loop_var") {
                return Err(ParseError::invalid(
                    tag,
                    "'loop_var' clause found without 'loop'",
                ));
            }
            return Ok((None, DEFAULT_LOOP_VAR.to_string()));
        }
        Some(Value::String(template)) => LoopSource::Template(template.clone()),
        Some(Value::Array(items)) => LoopSource::Items(items.clone()),
        Some(_) => {
            return Err(ParseError::invalid(
                tag,
                "'loop' clause is neither a string nor a list",
            ));
        }
    };
    let loop_var = match record.get("loop_var") {
        None => DEFAULT_LOOP_VAR.to_string(),
        Some(Value::String(name)) if is_identifier(name) => name.clone(),
        Some(Value::String(name)) => {
            return Err(ParseError::invalid(
                tag,
                format!("'loop_var' value '{name}' is not a valid identifier"),
            ));
        }
        Some(_) => return Err(ParseError::invalid(tag, "'loop_var' clause is not a string")),
    };
    Ok((Some(source), loop_var))
}

fn parse_vars(
    tag: &'static str,
    record: &Map<String, Value>,
) -> Result<Vec<(String, Value)>, ParseError> {
    let vars = match record.get("vars") {
        None => return Ok(Vec::new()),
        Some(Value::Object(vars)) => vars,
        Some(_) => return Err(ParseError::invalid(tag, "'vars' must be a mapping")),
    };
    vars.iter()
        .map(|(name, value)| {
            if is_identifier(name) {
                Ok((name.clone(), value.clone()))
            } else {
                Err(ParseError::invalid(
                    tag,
                    format!("'{name}' is not a valid variable name in 'vars'"),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SubstitutingTemplar;
    use serde_json::json;

    fn parse(record: Value) -> Result<Instruction, ParseError> {
        let templar = SubstitutingTemplar;
        Parser::new(&templar).parse_instruction(&record)
    }

    fn invalid_message(err: ParseError) -> String {
        match err {
            ParseError::Invalid { message, .. } => message,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_mapping_and_unknown_actions() {
        assert_eq!(parse(json!([1])), Err(ParseError::NotAMapping));
        assert_eq!(parse(json!({"group": "g"})), Err(ParseError::MissingAction));
        assert_eq!(parse(json!({"action": 3})), Err(ParseError::ActionNotAString));
        assert_eq!(
            parse(json!({"action": "nope"})),
            Err(ParseError::UnknownAction("nope".to_string()))
        );
    }

    #[test]
    fn unsupported_fields_are_sorted() {
        let err = parse(json!({"action": "stop", "zeta": 1, "alpha": 2})).expect_err("fields");
        assert_eq!(
            err,
            ParseError::UnsupportedFields {
                action: "stop",
                fields: vec!["alpha".to_string(), "zeta".to_string()],
            }
        );
    }

    #[test]
    fn when_must_be_a_string() {
        let instr = parse(json!({"action": "stop", "when": "x"})).expect("parse");
        assert_eq!(instr.condition(), Some("x"));
        let err = parse(json!({"action": "stop", "when": true})).expect_err("when");
        assert_eq!(invalid_message(err), "'when' clause is not a string");
    }

    #[test]
    fn loop_defaults_and_validation() {
        let instr = parse(json!({"action": "stop", "loop": [1, 2]})).expect("parse");
        assert_eq!(
            instr.loop_source(),
            Some(&LoopSource::Items(vec![json!(1), json!(2)]))
        );
        assert_eq!(instr.loop_var(), "item");
        assert_eq!(instr.save_set(), ["item".to_string()]);

        let instr = parse(json!({"action": "stop", "loop": "{{ xs }}", "loop_var": "x"}))
            .expect("parse");
        assert_eq!(
            instr.loop_source(),
            Some(&LoopSource::Template("{{ xs }}".to_string()))
        );
        assert_eq!(instr.loop_var(), "x");

        parse(json!({"action": "stop", "loop": 3})).expect_err("loop type");
        parse(json!({"action": "stop", "loop_var": "x"})).expect_err("loop_var alone");
        parse(json!({"action": "stop", "loop": [], "loop_var": "not valid"}))
            .expect_err("loop_var identifier");
        parse(json!({"action": "stop", "loop": [], "loop_var": 1})).expect_err("loop_var type");
    }

    #[test]
    fn vars_keep_declaration_order() {
        let instr = parse(json!({
            "action": "stop",
            "vars": {"zz": "1", "aa": "{{ zz }}"},
        }))
        .expect("parse");
        let names: Vec<&str> = instr.vars().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["zz", "aa"]);
        assert_eq!(instr.save_set(), ["zz".to_string(), "aa".to_string()]);

        parse(json!({"action": "stop", "vars": ["a"]})).expect_err("vars type");
        parse(json!({"action": "stop", "vars": {"not-valid": 1}})).expect_err("vars name");
    }

    #[test]
    fn run_once_allocates_distinct_slots() {
        let templar = SubstitutingTemplar;
        let mut parser = Parser::new(&templar);
        let first = parser
            .parse_instruction(&json!({"action": "stop", "run_once": true}))
            .expect("first");
        let second = parser
            .parse_instruction(&json!({"action": "stop", "run_once": true}))
            .expect("second");
        let off = parser
            .parse_instruction(&json!({"action": "stop", "run_once": false}))
            .expect("off");
        assert!(first.run_once().is_some());
        assert_ne!(first.run_once(), second.run_once());
        assert_eq!(off.run_once(), None);

        parser
            .parse_instruction(&json!({"action": "stop", "run_once": "yes"}))
            .expect_err("run_once type");
    }

    #[test]
    fn group_names_are_validated_unless_templated() {
        let instr = parse(json!({"action": "create_group", "group": "  web  "})).expect("parse");
        assert_eq!(
            instr.action(),
            &Action::CreateGroup {
                group: NameField::Literal("web".to_string()),
                parent: None,
                add_host: false,
            }
        );

        let instr = parse(json!({"action": "add_host", "group": "{{ g }}"})).expect("parse");
        assert_eq!(
            instr.action(),
            &Action::AddHost {
                group: NameField::Template("{{ g }}".to_string()),
            }
        );

        let err = parse(json!({"action": "create_group", "group": "1st"})).expect_err("name");
        assert_eq!(
            invalid_message(err),
            "invalid group name '1st' in field 'group'"
        );
        assert_eq!(
            parse(json!({"action": "add_child", "group": "g"})),
            Err(ParseError::MissingField {
                action: "add_child",
                field: "child",
            })
        );
        parse(json!({"action": "add_host", "group": 1})).expect_err("type");
    }

    #[test]
    fn create_group_options() {
        let instr = parse(json!({
            "action": "create_group",
            "group": "web",
            "parent": "prod",
            "add_host": true,
        }))
        .expect("parse");
        assert_eq!(
            instr.action(),
            &Action::CreateGroup {
                group: NameField::Literal("web".to_string()),
                parent: Some(NameField::Literal("prod".to_string())),
                add_host: true,
            }
        );
        parse(json!({"action": "create_group", "group": "web", "add_host": "yes"}))
            .expect_err("add_host type");
    }

    #[test]
    fn set_requires_name_and_value() {
        let instr = parse(json!({"action": "set_fact", "name": "role", "value": "{{ x }}"}))
            .expect("parse");
        assert_eq!(
            instr.action(),
            &Action::Set {
                target: SetTarget::Fact,
                name: NameField::Literal("role".to_string()),
                value: json!("{{ x }}"),
            }
        );
        assert_eq!(
            parse(json!({"action": "set_var", "name": "x"})),
            Err(ParseError::MissingField {
                action: "set_var",
                field: "value",
            })
        );
        parse(json!({"action": "set_var", "name": "in", "value": 1})).expect_err("reserved");
        let instr = parse(json!({"action": "set_var", "name": "{{ n }}", "value": 1}))
            .expect("templated name");
        assert_eq!(instr.tag(), "set_var");
    }

    #[test]
    fn block_parses_nested_lists() {
        let instr = parse(json!({
            "action": "block",
            "block": [{"action": "fail"}],
            "rescue": [{"action": "stop"}],
        }))
        .expect("parse");
        let Action::Block {
            block,
            rescue,
            always,
        } = instr.action()
        else {
            panic!("expected block");
        };
        assert_eq!(block.len(), 1);
        assert_eq!(rescue.len(), 1);
        assert!(always.is_empty());
        assert_eq!(instr.save_set(), [ERROR_VAR.to_string()]);
    }

    #[test]
    fn block_reports_nested_position() {
        let err = parse(json!({
            "action": "block",
            "block": [{"action": "stop"}],
            "always": [{"action": "stop"}, {"action": "bogus"}],
        }))
        .expect_err("nested");
        assert_eq!(err.to_string(), "block: always[1]: unknown action 'bogus'");

        assert_eq!(
            parse(json!({"action": "block"})),
            Err(ParseError::MissingField {
                action: "block",
                field: "block",
            })
        );
        parse(json!({"action": "block", "block": {"action": "stop"}})).expect_err("list");
    }

    #[test]
    fn parse_list_reports_top_level_index() {
        let templar = SubstitutingTemplar;
        let err = Parser::new(&templar)
            .parse_list(&[json!({"action": "stop"}), json!("oops")])
            .expect_err("list");
        assert_eq!(err.to_string(), "instruction #1: instruction record must be a mapping");
    }
}
