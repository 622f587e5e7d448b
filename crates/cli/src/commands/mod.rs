//! Subcommand implementations

pub mod history;
pub mod push;
pub mod status;
pub mod summary;
