//! Palaver is a terminal chat client for providers that speak the
//! OpenAI-compatible chat API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the run context, provider resolution, request dispatch
//!   (streaming or blocking, always interruptible), catalog aggregation,
//!   conversation history and session persistence.
//! - [`commands`] implements slash-command parsing for the chat loop.
//! - [`cli`] parses arguments and runs the line-oriented chat loop and the
//!   one-shot subcommands.
//! - [`api`] defines the chat and catalog payloads exchanged with providers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod logging;
pub mod utils;
