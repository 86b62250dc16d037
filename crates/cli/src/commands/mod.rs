//! Subcommand implementations

pub mod local;
pub mod remote;
