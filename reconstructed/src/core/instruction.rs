//! Parsed instruction tree.
//!
//! Instructions are immutable once parsed; everything that changes while a
//! program runs lives in the [`VariableStorage`], the inventory, or the
//! run-once tracker.
//!
//! [`VariableStorage`]: crate::core::storage::VariableStorage

use std::fmt;

use serde_json::Value;

/// Default name of the loop variable.
pub const DEFAULT_LOOP_VAR: &str = "item";

/// Variable bound to the error message while a `rescue` list runs.
pub const ERROR_VAR: &str = "reconstructed_error";

/// Identifies one `run_once` instruction within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunOnceId(pub(crate) usize);

/// A name field that is either checked at parse time or templated later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameField {
    Literal(String),
    Template(String),
}

impl NameField {
    pub fn raw(&self) -> &str {
        match self {
            NameField::Literal(name) | NameField::Template(name) => name,
        }
    }
}

/// Where a loop takes its values from.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSource {
    Items(Vec<Value>),
    Template(String),
}

/// Target layer of `set_fact` / `set_var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTarget {
    /// Host fact, persisted to the inventory.
    Fact,
    /// Script-local variable.
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreateGroup {
        group: NameField,
        parent: Option<NameField>,
        add_host: bool,
    },
    AddHost {
        group: NameField,
    },
    AddChild {
        group: NameField,
        child: NameField,
    },
    Set {
        target: SetTarget,
        name: NameField,
        value: Value,
    },
    Fail {
        msg: Option<Value>,
    },
    Stop,
    Block {
        block: Vec<Instruction>,
        rescue: Vec<Instruction>,
        always: Vec<Instruction>,
    },
}

impl Action {
    /// Tag used in the `action` field of instruction records.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::CreateGroup { .. } => "create_group",
            Action::AddHost { .. } => "add_host",
            Action::AddChild { .. } => "add_child",
            Action::Set {
                target: SetTarget::Fact,
                ..
            } => "set_fact",
            Action::Set {
                target: SetTarget::Var,
                ..
            } => "set_var",
            Action::Fail { .. } => "fail",
            Action::Stop => "stop",
            Action::Block { .. } => "block",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub(crate) condition: Option<String>,
    pub(crate) loop_source: Option<LoopSource>,
    pub(crate) loop_var: String,
    pub(crate) vars: Vec<(String, Value)>,
    pub(crate) run_once: Option<RunOnceId>,
    /// Names whose local bindings are saved around each invocation.
    pub(crate) save: Vec<String>,
    pub(crate) action: Action,
}

impl Instruction {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn tag(&self) -> &'static str {
        self.action.tag()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn loop_source(&self) -> Option<&LoopSource> {
        self.loop_source.as_ref()
    }

    pub fn loop_var(&self) -> &str {
        &self.loop_var
    }

    pub fn vars(&self) -> &[(String, Value)] {
        &self.vars
    }

    pub fn run_once(&self) -> Option<RunOnceId> {
        self.run_once
    }

    pub fn save_set(&self) -> &[String] {
        &self.save
    }

    /// One-line representation of the action and its own fields.
    pub fn repr_action(&self) -> String {
        let fields = match &self.action {
            Action::CreateGroup {
                group,
                parent,
                add_host,
            } => {
                let mut fields = vec![format!("group={:?}", group.raw())];
                if let Some(parent) = parent {
                    fields.push(format!("parent={:?}", parent.raw()));
                }
                if *add_host {
                    fields.push("add_host=true".to_string());
                }
                fields
            }
            Action::AddHost { group } => vec![format!("group={:?}", group.raw())],
            Action::AddChild { group, child } => vec![
                format!("group={:?}", group.raw()),
                format!("child={:?}", child.raw()),
            ],
            Action::Set { name, value, .. } => {
                vec![format!("name={:?}", name.raw()), format!("value={value}")]
            }
            Action::Fail { msg } => msg.iter().map(|msg| format!("msg={msg}")).collect(),
            Action::Stop => Vec::new(),
            Action::Block {
                block,
                rescue,
                always,
            } => vec![
                format!("block={}", block.len()),
                format!("rescue={}", rescue.len()),
                format!("always={}", always.len()),
            ],
        };
        format!("{}({})", self.tag(), fields.join(", "))
    }

    /// Flow-control prefix (`{when=..., loop=..., ...}`), empty when unused.
    fn repr_flow(&self) -> String {
        let mut parts = Vec::new();
        if let Some(condition) = &self.condition {
            parts.push(format!("when={condition:?}"));
        }
        if let Some(source) = &self.loop_source {
            let rendered = match source {
                LoopSource::Items(items) => Value::Array(items.clone()).to_string(),
                LoopSource::Template(template) => format!("{template:?}"),
            };
            parts.push(format!("loop={rendered}"));
            parts.push(format!("loop_var={:?}", self.loop_var));
        }
        if self.run_once.is_some() {
            parts.push("run_once".to_string());
        }
        if !self.vars.is_empty() {
            let vars: serde_json::Map<String, Value> = self.vars.iter().cloned().collect();
            parts.push(format!("vars={}", Value::Object(vars)));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", parts.join(", "))
        }
    }

    /// Append an indented multi-line listing of this instruction to `out`.
    pub fn dump_into(&self, depth: usize, out: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        out.push(format!("{indent}{self}"));
        if let Action::Block {
            block,
            rescue,
            always,
        } = &self.action
        {
            for (label, list) in [("block", block), ("rescue", rescue), ("always", always)] {
                if list.is_empty() {
                    continue;
                }
                out.push(format!("{indent}  {label}:"));
                for instruction in list {
                    instruction.dump_into(depth + 2, out);
                }
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.repr_flow(), self.repr_action())
    }
}
