//! CLI subcommand implementations.

pub mod compute;
pub mod course;
pub mod import;
pub mod status;
