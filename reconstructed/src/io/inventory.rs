//! Inventory abstraction and the JSON-backed in-memory implementation.
//!
//! The [`Inventory`] trait is everything the interpreter needs from the host
//! and group store. [`MemoryInventory`] keeps the whole graph in memory and
//! can be loaded from and written to a JSON document.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Groups every inventory has.
pub const BUILTIN_GROUPS: [&str; 2] = ["all", "ungrouped"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("unknown group '{0}'")]
    UnknownGroup(String),
    #[error("unknown host '{0}'")]
    UnknownHost(String),
    #[error("'{0}' is neither a group nor a host")]
    UnknownChild(String),
    #[error("adding group '{child}' as child to '{group}' creates a recursive dependency loop")]
    RecursiveGroup { group: String, child: String },
}

/// Host and group store mutated by instructions.
pub trait Inventory {
    /// Names of all hosts, in a stable order.
    fn hosts(&self) -> Vec<String>;

    fn has_group(&self, name: &str) -> bool;

    /// Create a group; existing groups are left unchanged.
    fn add_group(&mut self, name: &str) -> Result<(), InventoryError>;

    /// Add `child` (a group or a host) to `group`.
    fn add_child(&mut self, group: &str, child: &str) -> Result<(), InventoryError>;

    /// Set a fact on a host.
    fn set_variable(&mut self, host: &str, name: &str, value: Value)
    -> Result<(), InventoryError>;

    /// Variables visible for a host at the start of its run.
    fn host_vars(&self, host: &str) -> Result<Map<String, Value>, InventoryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub hosts: BTreeSet<String>,
    pub children: BTreeSet<String>,
    pub vars: Map<String, Value>,
}

/// Inventory document kept in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryInventory {
    pub hosts: BTreeMap<String, Map<String, Value>>,
    pub groups: BTreeMap<String, Group>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        let mut inventory = Self {
            hosts: BTreeMap::new(),
            groups: BTreeMap::new(),
        };
        inventory.ensure_builtin_groups();
        inventory
    }
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host with its facts, replacing any previous entry.
    pub fn add_host(&mut self, name: &str, vars: Map<String, Value>) {
        self.hosts.insert(name.to_string(), vars);
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    fn ensure_builtin_groups(&mut self) {
        for name in BUILTIN_GROUPS {
            self.groups.entry(name.to_string()).or_default();
        }
    }

    /// True if `target` is `group` or reachable from it through children.
    fn reaches(&self, group: &str, target: &str) -> bool {
        let mut pending = vec![group];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(entry) = self.groups.get(current) {
                pending.extend(entry.children.iter().map(String::as_str));
            }
        }
        false
    }

    /// Sorted names of the groups containing `host`, directly or through
    /// sub-group links, excluding `all`.
    pub fn group_names(&self, host: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|(name, _)| name.as_str() != "all")
            .filter(|(name, _)| {
                self.groups
                    .iter()
                    .filter(|(_, group)| group.hosts.contains(host))
                    .any(|(direct, _)| self.reaches(name, direct))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Inventory for MemoryInventory {
    fn hosts(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    fn add_group(&mut self, name: &str) -> Result<(), InventoryError> {
        if !self.groups.contains_key(name) {
            debug!(group = name, "adding group");
            self.groups.insert(name.to_string(), Group::default());
        }
        Ok(())
    }

    fn add_child(&mut self, group: &str, child: &str) -> Result<(), InventoryError> {
        if !self.groups.contains_key(group) {
            return Err(InventoryError::UnknownGroup(group.to_string()));
        }
        if self.groups.contains_key(child) {
            if self.reaches(child, group) {
                return Err(InventoryError::RecursiveGroup {
                    group: group.to_string(),
                    child: child.to_string(),
                });
            }
            debug!(group, child, "adding child group");
            if let Some(entry) = self.groups.get_mut(group) {
                entry.children.insert(child.to_string());
            }
            return Ok(());
        }
        if self.hosts.contains_key(child) {
            debug!(group, host = child, "adding host to group");
            if let Some(entry) = self.groups.get_mut(group) {
                entry.hosts.insert(child.to_string());
            }
            return Ok(());
        }
        Err(InventoryError::UnknownChild(child.to_string()))
    }

    fn set_variable(
        &mut self,
        host: &str,
        name: &str,
        value: Value,
    ) -> Result<(), InventoryError> {
        let vars = self
            .hosts
            .get_mut(host)
            .ok_or_else(|| InventoryError::UnknownHost(host.to_string()))?;
        vars.insert(name.to_string(), value);
        Ok(())
    }

    fn host_vars(&self, host: &str) -> Result<Map<String, Value>, InventoryError> {
        let mut vars = self
            .hosts
            .get(host)
            .cloned()
            .ok_or_else(|| InventoryError::UnknownHost(host.to_string()))?;
        let short = host.split('.').next().unwrap_or(host);
        vars.insert("inventory_hostname".to_string(), Value::from(host));
        vars.insert("inventory_hostname_short".to_string(), Value::from(short));
        vars.insert(
            "group_names".to_string(),
            Value::from(self.group_names(host)),
        );
        Ok(vars)
    }
}

/// Load an inventory document from a JSON file.
pub fn load_inventory(path: &Path) -> Result<MemoryInventory> {
    debug!(path = %path.display(), "loading inventory");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read inventory {}", path.display()))?;
    let mut inventory: MemoryInventory = serde_json::from_str(&contents)
        .with_context(|| format!("parse inventory {}", path.display()))?;
    inventory.ensure_builtin_groups();
    debug!(
        hosts = inventory.hosts.len(),
        groups = inventory.groups.len(),
        "inventory loaded"
    );
    Ok(inventory)
}

/// Atomically write an inventory document (temp file + rename).
pub fn write_inventory(path: &Path, inventory: &MemoryInventory) -> Result<()> {
    debug!(path = %path.display(), "writing inventory");
    let mut buf = serde_json::to_string_pretty(inventory).context("serialize inventory")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("inventory path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp inventory {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace inventory {}", path.display()))?;
    Ok(())
}
