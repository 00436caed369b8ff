//! CLI interface for Concierge
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Concierge
///
/// Answers free-text requests by planning and running search, weather,
/// greeting and memory capabilities, then summarising their results.
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session identifier used for memory (defaults to core.default_session)
    #[arg(long, global = true, value_name = "ID")]
    pub session: Option<String>,

    /// Keep memories in process only; nothing is written to disk
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single request
    Ask {
        /// The request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Interactive conversation; type `quit` or `exit` to leave
    Chat,

    /// Manage session memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show registered capabilities and provider health
    Status,
}

/// Memory management actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAction {
    /// List remembered records for the session
    List,

    /// Forget everything remembered for the session
    Clear,
}
