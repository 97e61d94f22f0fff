//! Bazaarly - conversational marketplace assistant library
//!
//! This library provides the core functionality for the Bazaarly
//! assistant: the conversation state machine, session persistence,
//! intent classification, workflow orchestration, and the marketplace
//! catalog.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session state model and sled-backed persistence
//! - `intent`: Rule-based intent classification and price extraction
//! - `engine`: Per-stage message handlers producing routing signals
//! - `flow`: Workflow orchestration (listing chain, reprice, edit, search)
//! - `collaborators`: Extraction, pricing, writing, and market lookup seams
//! - `catalog`: SQLite-backed listings and orders
//! - `assistant`: The `handle_turn` facade tying it all together
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use bazaarly::commands::build_assistant;
//! use bazaarly::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let assistant = build_assistant(&config)?;
//!     let turn = assistant
//!         .handle_turn("user-1", "selling a used iphone 13", "web", None)
//!         .await?;
//!     println!("{}", turn.reply_text);
//!     Ok(())
//! }
//! ```

pub mod assistant;
pub mod catalog;
pub mod cli;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod intent;
pub mod prompts;
pub mod session;

// Re-export commonly used types
pub use assistant::{Assistant, TurnReply};
pub use config::Config;
pub use engine::{ConversationEngine, ResponseSignal};
pub use error::{BazaarlyError, Result};
pub use session::{ConversationStage, SessionState, SessionStore, UserIntent};
