//! Shared run configuration types.
//!
//! These types define the stable options a program run is configured with.
//! They are read from source files and may be overridden on the command line.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How an unrescued runtime error affects the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Log the error, skip the failing host and continue with the next one.
    #[default]
    Host,
    /// Abort the whole run on the first error.
    Full,
}

/// Lifetime of the "already executed" state of `run_once` instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunOnceScope {
    /// Run once for the whole multi-host run.
    #[default]
    Run,
    /// Run once for each host.
    Host,
}

/// Options for a multi-host program run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub strictness: Strictness,
    pub run_once: RunOnceScope,
}
