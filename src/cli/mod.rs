//! Command Line Interface (CLI) layer for SATSR.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the `infer` and `patches`
//! subcommands. It wires user-provided options and JSON parameter files to
//! the library functionality exposed via `satsr::api`.
//!
//! If you are embedding SATSR into another application, prefer using
//! the high-level `satsr::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
