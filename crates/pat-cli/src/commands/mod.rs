//! Subcommand implementations.
//!
//! Commands write user-facing output to the writers they are given so that
//! tests can capture it; `main` passes stdout and stderr.

pub mod deploy;
pub mod pat;
