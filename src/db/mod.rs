//! High-level store API and REPL interface.
//!
//! This module provides a clean, user-facing API for the store
//! and an interactive command-line interface.

mod api;
mod repl;

pub use api::{Backend, Edb, EdbConfig, EdbError, EdbResult, EdbStats};
pub use repl::{Repl, ReplConfig};
