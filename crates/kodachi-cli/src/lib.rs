// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Kodachi developer CLI.
//!
//! Loads a graph description from JSON, commits it to a runtime backed by
//! the in-memory host and cooks, traverses or culls the resulting
//! scenegraph.
//!
//! # Usage
//! ```text
//! kodachi [--config FILE] [-v...] <command> [options]
//! ```
//!
//! The CLI exits with code `0` on success and non-zero on error.

#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// Argument parsing and command dispatch.
pub mod cli;
/// Culling locations against a camera frustum.
pub mod cull;
/// Loading and committing graph descriptions.
pub mod graph;

pub use cli::entrypoint;
