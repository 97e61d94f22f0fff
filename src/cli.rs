//! Command-line interface definition for Bazaarly
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, listing management, and
//! session maintenance.

use clap::{Parser, Subcommand};

/// Bazaarly - conversational marketplace assistant
///
/// Chat your way from "I want to sell my phone" to a priced, published
/// listing, or search the catalog as a buyer.
#[derive(Parser, Debug, Clone)]
#[command(name = "bazaarly")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Bazaarly
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session with the assistant
    Chat {
        /// User id to chat as
        #[arg(short, long, default_value = "local-user")]
        user: String,

        /// Platform label recorded on the session
        #[arg(short, long, default_value = "cli")]
        platform: String,
    },

    /// Show a user's published listings
    Listings {
        /// Seller id to list for
        #[arg(short, long, default_value = "local-user")]
        user: String,
    },

    /// Session store maintenance
    Sessions {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Configuration helpers
    Config {
        /// Config subcommand
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Session maintenance subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Remove expired sessions from the store
    Cleanup,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init,
    /// Validate the configuration file
    Validate,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
