//! CLI commands

pub mod format;
pub mod provision;
pub mod recipes;
