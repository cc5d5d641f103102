//! chart-mirror library.
//!
//! This crate provides the command-line surface over `chart_mirror_core`:
//! argument definitions, validation, the command handlers and the output
//! sinks. It is used by the `chart-mirror` binary and by the behaviour tests.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`error`] - CLI error type and result alias
//! - [`inspect`] - The inspect-images command
//! - [`mirror`] - The default mirror command
//! - [`output`] - Output sinks for extracted image lists
//! - [`validation`] - Argument validation and engine configuration

pub mod cli;
pub mod error;
pub mod inspect;
pub mod mirror;
pub mod output;
pub mod validation;
