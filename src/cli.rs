//! Command line interface for building partitioned indexes through the writer pool.

pub mod args;
pub mod commands;
pub mod output;

pub use args::*;
pub use commands::*;
pub use output::*;
