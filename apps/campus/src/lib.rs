//! # campus
//!
//! Operator CLI for a campus services store. The binary in `main.rs` wires
//! tracing and hands the parsed [`cli::Cli`] to [`cli::execute`].

pub mod cli;
pub mod config;
