//! Per-host execution of a program over a whole inventory.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::error::RuntimeError;
use crate::core::storage::VariableStorage;
use crate::core::types::{RunOnceScope, RunOptions, Strictness};
use crate::exec::{ExecContext, RunOnceTracker};
use crate::io::inventory::Inventory;
use crate::io::template::TemplateEvaluator;
use crate::program::Program;

/// An unrescued runtime error, tagged with the host it happened on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("error on host {host}: {error}")]
pub struct HostFailure {
    pub host: String,
    pub error: RuntimeError,
}

/// How the program ended for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome {
    Completed,
    Stopped,
}

/// Summary of a multi-host run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Hosts the program completed for, including stopped ones.
    pub completed: Vec<String>,
    /// Hosts where a `stop` ended the program early.
    pub stopped: Vec<String>,
    /// Hosts skipped after an error under `host` strictness.
    pub failures: Vec<HostFailure>,
}

impl RunReport {
    pub fn hosts(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Run the program for one host with a fresh variable environment.
pub fn exec_for_host(
    program: &Program,
    host: &str,
    inventory: &mut dyn Inventory,
    templar: &dyn TemplateEvaluator,
    run_once: &mut RunOnceTracker,
) -> Result<HostOutcome, RuntimeError> {
    let mut vars = VariableStorage::new(inventory.host_vars(host)?);
    let mut ctx = ExecContext {
        host,
        vars: &mut vars,
        inventory,
        templar,
        run_once,
    };
    if program.run_for(&mut ctx)? {
        Ok(HostOutcome::Completed)
    } else {
        debug!(host, "program stopped");
        Ok(HostOutcome::Stopped)
    }
}

/// Run the program for every host of the inventory, in inventory order.
///
/// Under `full` strictness the first host failure aborts the run and is
/// returned. Under `host` strictness failures are logged, collected in the
/// report and the next host runs; changes already made to the inventory are
/// kept in both cases.
pub fn run_program(
    program: &Program,
    inventory: &mut dyn Inventory,
    templar: &dyn TemplateEvaluator,
    options: RunOptions,
) -> Result<RunReport, HostFailure> {
    let mut report = RunReport::default();
    let mut tracker = RunOnceTracker::new();
    for host in inventory.hosts() {
        if options.run_once == RunOnceScope::Host {
            tracker = RunOnceTracker::new();
        }
        info!(host = %host, "running program");
        match exec_for_host(program, &host, inventory, templar, &mut tracker) {
            Ok(outcome) => {
                info!(host = %host, ?outcome, "host done");
                if outcome == HostOutcome::Stopped {
                    report.stopped.push(host.clone());
                }
                report.completed.push(host);
            }
            Err(error) => {
                let failure = HostFailure { host, error };
                match options.strictness {
                    Strictness::Full => return Err(failure),
                    Strictness::Host => {
                        warn!(%failure, "skipping host after error");
                        report.failures.push(failure);
                    }
                }
            }
        }
    }
    Ok(report)
}
