//! Collaborators with side effects: templating, inventory storage and
//! source files.

pub mod inventory;
pub mod source;
pub mod template;
