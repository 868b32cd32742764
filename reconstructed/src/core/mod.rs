//! Deterministic, pure building blocks of the interpreter.
//!
//! Core modules are free of I/O. They define the instruction tree, the
//! per-host variable environment and the validation rules shared by the
//! parser and the executor.

pub mod boolean;
pub mod error;
pub mod instruction;
pub mod names;
pub mod storage;
pub mod types;
