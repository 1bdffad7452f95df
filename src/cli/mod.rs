//! Command-line interface

mod args;
pub mod cache;
pub mod doctor;
pub mod output;
pub mod scan;
pub mod style;

pub use args::{CacheCommands, Cli, Commands};
