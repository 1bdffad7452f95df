//! Core module - shared types, cross-cutting services, and utilities

pub mod cache;
pub mod error;
pub mod http;
pub mod path_safety;
pub mod paths;
pub mod rate_limit;
pub mod reader;
mod types;

pub use error::{NullVoidError, Result};
pub use types::*;
