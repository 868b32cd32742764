//! A parsed program: the ordered top-level instructions of a source.

use serde_json::Value;
use tracing::debug;

use crate::core::error::{ParseError, RuntimeError};
use crate::core::instruction::Instruction;
use crate::exec::{ExecContext, run_list};
use crate::io::template::TemplateEvaluator;
use crate::parse::Parser;

/// Immutable instruction list, reused for every host.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Parse all records, failing on the first invalid one.
    pub fn parse(records: &[Value], templar: &dyn TemplateEvaluator) -> Result<Self, ParseError> {
        let instructions = Parser::new(templar).parse_list(records)?;
        let program = Self { instructions };
        debug!(
            instructions = program.len(),
            dump = %program.dump(),
            "program parsed"
        );
        Ok(program)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Run every instruction for the context's host.
    ///
    /// Returns `Ok(false)` if a `stop` ended the run early.
    pub fn run_for(&self, ctx: &mut ExecContext<'_>) -> Result<bool, RuntimeError> {
        run_list(&self.instructions, ctx)
    }

    /// Multi-line listing of the program.
    pub fn dump(&self) -> String {
        let mut lines = Vec::new();
        for instruction in &self.instructions {
            instruction.dump_into(0, &mut lines);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SubstitutingTemplar;
    use serde_json::json;

    #[test]
    fn parse_keeps_order() {
        let program = Program::parse(
            &[
                json!({"action": "create_group", "group": "a"}),
                json!({"action": "stop"}),
            ],
            &SubstitutingTemplar,
        )
        .expect("parse");
        assert_eq!(program.len(), 2);
        let tags: Vec<&str> = program.instructions().iter().map(Instruction::tag).collect();
        assert_eq!(tags, vec!["create_group", "stop"]);
    }

    #[test]
    fn empty_program() {
        let program = Program::parse(&[], &SubstitutingTemplar).expect("parse");
        assert!(program.is_empty());
        assert_eq!(program.dump(), "");
    }

    #[test]
    fn dump_lists_nested_instructions() {
        let program = Program::parse(
            &[
                json!({"action": "set_var", "name": "x", "value": 1, "when": "y"}),
                json!({
                    "action": "block",
                    "block": [{"action": "create_group", "group": "g"}],
                    "always": [{"action": "stop"}],
                }),
            ],
            &SubstitutingTemplar,
        )
        .expect("parse");
        assert_eq!(
            program.dump(),
            [
                r#"{when="y"}set_var(name="x", value=1)"#,
                "block(block=1, rescue=0, always=1)",
                "  block:",
                r#"    create_group(group="g")"#,
                "  always:",
                "    stop()",
            ]
            .join("\n")
        );
    }
}
