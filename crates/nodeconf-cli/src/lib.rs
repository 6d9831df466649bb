//! nodeconf CLI library
//!
//! Exposes the CLI entry point so the binary and other tools can share it.

mod cli;

pub use cli::run;
