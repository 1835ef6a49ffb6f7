//! Engagement computer CLI library.
//!
//! Wires the core pipeline to the `SQLite` store, the course worker pool and
//! the CSV writer.

mod cli;
pub mod commands;
mod config;
pub mod dispatch;
pub mod pipeline;
pub mod writer;

pub use cli::{Cli, Commands, CourseAction};
pub use config::Config;
