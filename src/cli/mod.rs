//! CLI module for sourced - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
