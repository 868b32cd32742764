//! Instruction execution.
//!
//! Running an instruction for a host goes through the same steps for every
//! action: the run-once check, saving the bindings the instruction may
//! shadow, the loop, the per-iteration `vars` and condition, and finally the
//! action itself. Every step returns `Ok(true)` to continue, `Ok(false)` when
//! a `stop` interrupted the run, or a [`RuntimeError`].

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, trace};

use crate::core::boolean::boolean;
use crate::core::error::RuntimeError;
use crate::core::instruction::{
    Action, ERROR_VAR, Instruction, LoopSource, NameField, RunOnceId, SetTarget,
};
use crate::core::names::{is_identifier, is_valid_group_name};
use crate::core::storage::VariableStorage;
use crate::io::inventory::Inventory;
use crate::io::template::TemplateEvaluator;

/// Records which `run_once` instructions have already fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOnceTracker {
    fired: HashSet<RunOnceId>,
}

impl RunOnceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as fired. Returns false if it had already fired.
    pub fn fire(&mut self, id: RunOnceId) -> bool {
        self.fired.insert(id)
    }

    pub fn has_fired(&self, id: RunOnceId) -> bool {
        self.fired.contains(&id)
    }
}

/// Everything an instruction needs while running for one host.
pub struct ExecContext<'a> {
    pub host: &'a str,
    pub vars: &'a mut VariableStorage,
    pub inventory: &'a mut dyn Inventory,
    pub templar: &'a dyn TemplateEvaluator,
    pub run_once: &'a mut RunOnceTracker,
}

/// Run a list of instructions in order, stopping at the first interrupt.
pub fn run_list(
    instructions: &[Instruction],
    ctx: &mut ExecContext<'_>,
) -> Result<bool, RuntimeError> {
    for instruction in instructions {
        if !instruction.run_for(ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Instruction {
    /// Execute this instruction for the context's host.
    pub fn run_for(&self, ctx: &mut ExecContext<'_>) -> Result<bool, RuntimeError> {
        if let Some(id) = self.run_once
            && !ctx.run_once.fire(id)
        {
            trace!(host = ctx.host, instruction = %self, "run_once already fired, skipping");
            return Ok(true);
        }
        ctx.vars.push(&self.save);
        let result = match &self.loop_source {
            None => self.run_iteration(ctx),
            Some(source) => self.run_loop(source, ctx),
        };
        ctx.vars.pop();
        result
    }

    fn run_loop(
        &self,
        source: &LoopSource,
        ctx: &mut ExecContext<'_>,
    ) -> Result<bool, RuntimeError> {
        let items = evaluate_loop(source, ctx)?;
        for (index, item) in items.into_iter().enumerate() {
            trace!(
                host = ctx.host,
                action = self.tag(),
                index,
                loop_var = %self.loop_var,
                value = %item,
                "loop iteration"
            );
            ctx.vars.set_local(&self.loop_var, item);
            if !self.run_iteration(ctx)? {
                debug!(host = ctx.host, action = self.tag(), index, "loop interrupted");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_iteration(&self, ctx: &mut ExecContext<'_>) -> Result<bool, RuntimeError> {
        for (name, template) in &self.vars {
            let value = ctx.templar.template(template, ctx.vars.as_map())?;
            ctx.vars.set_local(name, value);
        }
        if !self.evaluate_condition(ctx)? {
            return Ok(true);
        }
        self.execute_action(ctx)
    }

    fn evaluate_condition(&self, ctx: &ExecContext<'_>) -> Result<bool, RuntimeError> {
        let Some(condition) = &self.condition else {
            return Ok(true);
        };
        let (start, end) = ctx.templar.expression_delimiters();
        let expression = format!("{start}{condition}{end}");
        let value = ctx.templar.template_str(&expression, ctx.vars.as_map())?;
        let result = boolean(&value)?;
        trace!(host = ctx.host, condition = condition.as_str(), result, "condition evaluated");
        Ok(result)
    }

    fn execute_action(&self, ctx: &mut ExecContext<'_>) -> Result<bool, RuntimeError> {
        debug!(host = ctx.host, instruction = %self, "executing action");
        let tag = self.tag();
        match &self.action {
            Action::CreateGroup {
                group,
                parent,
                add_host,
            } => {
                let group = resolve_group(tag, group, false, ctx)?;
                let parent = parent
                    .as_ref()
                    .map(|parent| resolve_group(tag, parent, true, ctx))
                    .transpose()?;
                ctx.inventory.add_group(&group)?;
                if let Some(parent) = parent {
                    ctx.inventory.add_child(&parent, &group)?;
                }
                if *add_host {
                    ctx.inventory.add_child(&group, ctx.host)?;
                }
                Ok(true)
            }
            Action::AddHost { group } => {
                let group = resolve_group(tag, group, true, ctx)?;
                ctx.inventory.add_child(&group, ctx.host)?;
                Ok(true)
            }
            Action::AddChild { group, child } => {
                let group = resolve_group(tag, group, true, ctx)?;
                let child = resolve_group(tag, child, true, ctx)?;
                ctx.inventory.add_child(&group, &child)?;
                Ok(true)
            }
            Action::Set {
                target,
                name,
                value,
            } => {
                let name = resolve_variable(tag, name, ctx)?;
                let value = ctx.templar.template(value, ctx.vars.as_map())?;
                match target {
                    SetTarget::Fact => {
                        ctx.inventory.set_variable(ctx.host, &name, value.clone())?;
                        ctx.vars.set_host_var(&name, value);
                    }
                    SetTarget::Var => ctx.vars.set_local(&name, value),
                }
                Ok(true)
            }
            Action::Fail { msg } => {
                let message = match msg {
                    None => format!("fail requested ({})", ctx.host),
                    Some(msg) => match ctx.templar.template(msg, ctx.vars.as_map())? {
                        Value::String(message) => message,
                        other => other.to_string(),
                    },
                };
                Err(RuntimeError::Failed(message))
            }
            Action::Stop => {
                debug!(host = ctx.host, "stop requested");
                Ok(false)
            }
            Action::Block {
                block,
                rescue,
                always,
            } => run_block(block, rescue, always, ctx),
        }
    }
}

fn evaluate_loop(source: &LoopSource, ctx: &ExecContext<'_>) -> Result<Vec<Value>, RuntimeError> {
    match source {
        LoopSource::Items(items) => Ok(items.clone()),
        LoopSource::Template(template) => {
            match ctx.templar.template_str(template, ctx.vars.as_map())? {
                Value::Array(items) => Ok(items),
                _ => Err(RuntimeError::LoopNotAList(template.clone())),
            }
        }
    }
}

fn run_block(
    block: &[Instruction],
    rescue: &[Instruction],
    always: &[Instruction],
    ctx: &mut ExecContext<'_>,
) -> Result<bool, RuntimeError> {
    debug!(host = ctx.host, "running block");
    let mut outcome = run_list(block, ctx);
    if let Err(err) = &outcome
        && !rescue.is_empty()
    {
        debug!(host = ctx.host, error = %err, "block failed, running rescue");
        ctx.vars.set_local(ERROR_VAR, Value::String(err.to_string()));
        outcome = run_list(rescue, ctx);
    }
    if always.is_empty() {
        return outcome;
    }
    debug!(host = ctx.host, "running always");
    let always_outcome = run_list(always, ctx)?;
    Ok(outcome? && always_outcome)
}

/// Resolve a group name field to the actual group name.
fn resolve_group(
    tag: &'static str,
    field: &NameField,
    must_exist: bool,
    ctx: &ExecContext<'_>,
) -> Result<String, RuntimeError> {
    let name = match field {
        NameField::Literal(name) => name.clone(),
        NameField::Template(template) => {
            let name = template_name(tag, template, ctx)?;
            if !is_valid_group_name(&name) {
                return Err(RuntimeError::InvalidGroupName { action: tag, name });
            }
            name
        }
    };
    if must_exist && !ctx.inventory.has_group(&name) {
        return Err(RuntimeError::MissingGroup {
            action: tag,
            group: name,
        });
    }
    Ok(name)
}

fn resolve_variable(
    tag: &'static str,
    field: &NameField,
    ctx: &ExecContext<'_>,
) -> Result<String, RuntimeError> {
    match field {
        NameField::Literal(name) => Ok(name.clone()),
        NameField::Template(template) => {
            let name = template_name(tag, template, ctx)?;
            if !is_identifier(&name) {
                return Err(RuntimeError::InvalidVariableName { action: tag, name });
            }
            Ok(name)
        }
    }
}

fn template_name(
    tag: &'static str,
    template: &str,
    ctx: &ExecContext<'_>,
) -> Result<String, RuntimeError> {
    match ctx.templar.template_str(template, ctx.vars.as_map())? {
        Value::String(name) => Ok(name.trim().to_string()),
        _ => Err(RuntimeError::NotAString {
            action: tag,
            template: template.to_string(),
        }),
    }
}
