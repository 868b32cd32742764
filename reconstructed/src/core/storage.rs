//! Per-host variable environment.
//!
//! A [`VariableStorage`] layers script-local variables over the host's facts
//! and keeps a merged cache that templates are evaluated against. Instructions
//! that bind variables for the duration of their own execution (loop
//! variables, `vars` entries) bracket that execution with [`push`] and
//! [`pop`], which save and restore the local bindings of a set of names.
//!
//! [`push`]: VariableStorage::push
//! [`pop`]: VariableStorage::pop

use serde_json::{Map, Value};
use tracing::trace;

/// Previous local binding of each saved name (`None` when it had none).
type SaveRecord = Vec<(String, Option<Value>)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStorage {
    host_vars: Map<String, Value>,
    script_vars: Map<String, Value>,
    /// Host facts overlaid by script-locals.
    cache: Map<String, Value>,
    stack: Vec<SaveRecord>,
}

impl VariableStorage {
    /// Create a storage seeded with a host's facts and no locals.
    pub fn new(host_vars: Map<String, Value>) -> Self {
        Self {
            cache: host_vars.clone(),
            host_vars,
            script_vars: Map::new(),
            stack: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.cache.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Merged view used as the template context.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.cache
    }

    pub fn host_vars(&self) -> &Map<String, Value> {
        &self.host_vars
    }

    pub fn script_vars(&self) -> &Map<String, Value> {
        &self.script_vars
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.cache.keys()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of save records currently on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Bind a script-local variable, hiding any host fact with the same name.
    pub fn set_local(&mut self, name: &str, value: Value) {
        trace!(name, %value, "set local variable");
        self.script_vars.insert(name.to_string(), value.clone());
        self.cache.insert(name.to_string(), value);
    }

    /// Remove a script-local variable.
    ///
    /// Host facts are never removed; if one was hidden by the local it becomes
    /// visible again. Returns the removed local value.
    pub fn remove_local(&mut self, name: &str) -> Option<Value> {
        let removed = self.script_vars.shift_remove(name)?;
        self.refresh(name);
        Some(removed)
    }

    /// Update a host fact. A local with the same name keeps precedence.
    pub fn set_host_var(&mut self, name: &str, value: Value) {
        trace!(name, %value, "set host fact");
        self.host_vars.insert(name.to_string(), value);
        self.refresh(name);
    }

    /// Save the current local bindings of `names`.
    pub fn push<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let record = names
            .into_iter()
            .map(|name| (name.clone(), self.script_vars.get(name).cloned()))
            .collect();
        self.stack.push(record);
    }

    /// Restore the bindings saved by the matching [`push`](Self::push).
    ///
    /// Names that had no local binding lose the one they may have gained
    /// since, which makes a shadowed host fact visible again.
    pub fn pop(&mut self) {
        let Some(record) = self.stack.pop() else {
            debug_assert!(false, "pop without matching push");
            return;
        };
        for (name, previous) in record {
            match previous {
                Some(value) => {
                    self.script_vars.insert(name.clone(), value.clone());
                    self.cache.insert(name, value);
                }
                None => {
                    self.script_vars.shift_remove(&name);
                    self.refresh(&name);
                }
            }
        }
    }

    /// Recompute the cache entry for `name` from the two layers.
    fn refresh(&mut self, name: &str) {
        let value = self
            .script_vars
            .get(name)
            .or_else(|| self.host_vars.get(name))
            .cloned();
        match value {
            Some(value) => {
                self.cache.insert(name.to_string(), value);
            }
            None => {
                self.cache.shift_remove(name);
            }
        }
    }
}
