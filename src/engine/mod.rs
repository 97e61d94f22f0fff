//! Stage handlers for the conversation state machine
//!
//! The engine turns one user message plus the current session into a
//! reply and a routing signal. Anything that needs a collaborator or the
//! catalog is signalled to the workflow layer rather than done here; the
//! engine itself is synchronous and deterministic.

pub mod handlers;

pub use handlers::ConversationEngine;

use serde::{Deserialize, Serialize};

/// Routing signal attached to every handler reply
///
/// A closed enum: the workflow matches it exhaustively, so a new signal
/// cannot be silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSignal {
    /// Plain reply; no flow work
    Conversation,
    /// Still collecting required attributes
    GatheringInfo,
    /// Kick off the listing chain
    StartListingFlow,
    /// Kick off the buyer search
    StartSearchFlow,
    /// Recompute the draft with the user's price
    RepriceListing,
    /// Apply a targeted draft edit
    EditField,
    /// Publish the draft
    ReadyToConfirm,
    /// Flow abandoned and session reset
    Cancelled,
    /// A general question was answered in place
    QuestionAnswered,
}

/// Which draft field an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Title,
    Description,
    Price,
    Category,
}

impl EditField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Price => "price",
            Self::Category => "category",
        }
    }
}

/// A parsed edit request from the Editing stage
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub field: EditField,
    /// Direct replacement value when the message carries one (price edits)
    pub new_value: Option<String>,
    /// The user's instruction, for collaborator-driven rewrites
    pub description: String,
}

/// What a stage handler produced for one turn
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub reply: String,
    pub signal: ResponseSignal,
    /// A price the user stated, for the reprice path
    pub user_price: Option<f64>,
    pub edit: Option<EditRequest>,
}

impl HandlerOutcome {
    pub fn reply(text: impl Into<String>, signal: ResponseSignal) -> Self {
        Self {
            reply: text.into(),
            signal,
            user_price: None,
            edit: None,
        }
    }
}
