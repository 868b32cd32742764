//! Declarative instruction interpreter for host inventories.
//!
//! A program is a list of instruction records (conditions, loops, variable
//! assignment, group and membership changes, `block`/`rescue`/`always`). It is
//! parsed once and then executed for every host of an inventory.
//!
//! - **[`core`]**: Pure building blocks (instruction tree, variable storage,
//!   name and boolean rules, errors). No I/O.
//! - **[`io`]**: Collaborators: the template evaluator, the inventory and
//!   source file loading.
//!
//! [`parse`], [`exec`], [`program`] and [`driver`] tie them together.

pub mod core;
pub mod driver;
pub mod exec;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod parse;
pub mod program;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
