//! Session data model for marketplace conversations
//!
//! `SessionState` is the single source of truth for one user's ongoing
//! conversation: the stage machine, the classified intent, the gathered
//! product attributes, pricing results, and the listing draft. All types
//! here are serde-serializable so the store can persist them as JSON.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Attribute names that must be known before a listing can be priced.
///
/// Collaborators may suggest further missing attributes, but only these
/// gate the flow. Keeping the set fixed guarantees the gathering loop
/// terminates.
pub const REQUIRED_FIELDS: [&str; 2] = ["brand", "condition"];

/// The stage of a marketplace conversation
///
/// Stages form an explicit state machine; `can_transition_to` encodes the
/// legal moves. `Cancelled` is reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    /// No active flow; greeting, questions, search
    #[default]
    Initial,
    /// Collecting required product attributes
    GatheringInfo,
    /// Attributes complete; handing off to the listing or search flow
    Analyzing,
    /// Computing a price recommendation
    Pricing,
    /// Draft shown; awaiting confirm, edit, negotiate, or cancel
    Preview,
    /// User proposed their own price
    Negotiation,
    /// User asked to change a draft field
    Editing,
    /// Awaiting final confirmation
    Confirming,
    /// Listing published
    Completed,
    /// Flow abandoned
    Cancelled,
}

impl ConversationStage {
    /// Whether this stage is terminal for the current flow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a transition from this stage to `next` is legal
    pub fn can_transition_to(&self, next: ConversationStage) -> bool {
        use ConversationStage::*;
        if self == &next {
            return true;
        }
        // Cancellation is allowed from anywhere non-terminal, and both
        // terminal stages restart at Initial.
        if next == Cancelled && !self.is_terminal() {
            return true;
        }
        match self {
            Initial => matches!(next, GatheringInfo | Analyzing),
            GatheringInfo => matches!(next, Analyzing | Initial),
            Analyzing => matches!(next, Pricing | Preview | GatheringInfo | Initial),
            Pricing => matches!(next, Preview | GatheringInfo),
            Preview => matches!(next, Negotiation | Editing | Confirming | Completed),
            Negotiation => matches!(next, Preview | Confirming),
            Editing => matches!(next, Preview),
            Confirming => matches!(next, Completed | Preview),
            Completed | Cancelled => matches!(next, Initial),
        }
    }
}

/// What the user is trying to do, as classified from their message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    /// Sell something
    Listing,
    /// Find something to buy
    Searching,
    /// Argue about the price
    Negotiating,
    /// Change a draft field
    Editing,
    /// Approve the draft
    Confirming,
    /// Abandon the flow
    Cancelling,
    /// Ask a general question
    Question,
    /// Could not tell
    #[default]
    Unknown,
}

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Product attributes gathered over the conversation
///
/// Brand and condition are the required attributes; everything else the
/// extractor finds (model, year, color, storage, ...) lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProductInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProductInfo {
    pub fn is_empty(&self) -> bool {
        self.brand.is_none() && self.condition.is_none() && self.extra.is_empty()
    }

    /// Merge another partial extraction into this one
    ///
    /// Fields present in `other` overwrite the same field here; fields
    /// absent in `other` are left untouched. Later turns refine, they
    /// never erase.
    pub fn merge(&mut self, other: ProductInfo) {
        if other.brand.is_some() {
            self.brand = other.brand;
        }
        if other.condition.is_some() {
            self.condition = other.condition;
        }
        for (key, value) in other.extra {
            self.extra.insert(key, value);
        }
    }

    /// Required attributes still unknown, in stable order
    pub fn required_missing(&self) -> Vec<String> {
        REQUIRED_FIELDS
            .iter()
            .filter(|field| {
                let value = match **field {
                    "brand" => &self.brand,
                    "condition" => &self.condition,
                    _ => return false,
                };
                value.as_deref().map_or(true, str::is_empty)
            })
            .map(|field| field.to_string())
            .collect()
    }

    /// Short human-readable label for prompts and market queries
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(brand) = &self.brand {
            parts.push(brand.clone());
        }
        if let Some(model) = self.extra.get("model").and_then(|v| v.as_str()) {
            parts.push(model.to_string());
        }
        if parts.is_empty() {
            if let Some(category) = self.extra.get("category").and_then(|v| v.as_str()) {
                parts.push(category.to_string());
            }
        }
        if parts.is_empty() {
            "item".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Stable fingerprint of the current snapshot
    ///
    /// Used to detect when product details changed materially since a
    /// price was computed. BTreeMap ordering makes the serialization
    /// deterministic.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Aggregate price statistics over similar listings in our own catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceStats {
    pub similar_count: usize,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Aggregate price statistics from external market sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketStats {
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sources_checked: usize,
}

/// Where a price recommendation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Derived from catalog and market statistics
    Computed,
    /// Set explicitly by the seller; always wins over computed prices
    UserDefined,
}

/// A price recommendation for the product under discussion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub recommended_price: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub rationale: String,
    pub source: PriceSource,
}

/// The listing draft shown to the seller in the Preview stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub summary: String,
    pub price: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// The full per-user conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub stage: ConversationStage,
    pub intent: UserIntent,
    pub conversation_history: Vec<ChatMessage>,
    pub product_info: ProductInfo,
    /// Required attributes still to gather; non-empty only while gathering
    pub missing_fields: Vec<String>,
    /// Similarity stats from our own catalog, cached for repricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_stats: Option<PriceStats>,
    /// External market stats, cached for repricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_stats: Option<MarketStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    /// Fingerprint of product_info at the time `pricing` was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_snapshot: Option<String>,
    /// A price the seller stated themselves; overrides any computed price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_price_preference: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_draft: Option<ListingDraft>,
    /// Bumped each time the draft is regenerated or edited
    #[serde(default)]
    pub draft_version: u32,
    /// Media the user attached this flow, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Catalog id of the published listing, set on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl SessionState {
    /// Create a fresh session for a user on a platform
    pub fn new(user_id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            platform: platform.into(),
            stage: ConversationStage::Initial,
            intent: UserIntent::Unknown,
            conversation_history: Vec::new(),
            product_info: ProductInfo::default(),
            missing_fields: Vec::new(),
            internal_stats: None,
            external_stats: None,
            pricing: None,
            pricing_snapshot: None,
            user_price_preference: None,
            listing_draft: None,
            draft_version: 0,
            image_url: None,
            listing_id: None,
            created_at: now,
            updated_at: now,
            last_message_at: now,
        }
    }

    /// Append a message and refresh the activity timestamps
    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.conversation_history.push(ChatMessage::new(role, content));
        let now = Utc::now();
        self.last_message_at = now;
        self.updated_at = now;
    }

    /// Move to a new stage
    ///
    /// Illegal transitions are logged and ignored rather than applied, so
    /// a routing bug cannot corrupt the state machine.
    pub fn set_stage(&mut self, next: ConversationStage) {
        if self.stage.can_transition_to(next) {
            self.stage = next;
            self.updated_at = Utc::now();
        } else {
            tracing::warn!(
                from = ?self.stage,
                to = ?next,
                user_id = %self.user_id,
                "Ignoring illegal stage transition"
            );
        }
    }

    /// Record which required attributes are still missing
    ///
    /// A non-empty set forces the GatheringInfo stage; an empty set leaves
    /// the stage alone.
    pub fn set_missing_fields(&mut self, missing: Vec<String>) {
        if !missing.is_empty() && self.stage != ConversationStage::GatheringInfo {
            self.set_stage(ConversationStage::GatheringInfo);
        }
        self.missing_fields = missing;
        self.updated_at = Utc::now();
    }

    /// Merge a partial extraction into the gathered attributes
    pub fn merge_product_info(&mut self, partial: ProductInfo) {
        self.product_info.merge(partial);
        self.updated_at = Utc::now();
    }

    /// Install a new draft and bump the draft version
    pub fn replace_draft(&mut self, draft: ListingDraft) {
        self.listing_draft = Some(draft);
        self.draft_version += 1;
        self.updated_at = Utc::now();
    }

    /// Record the seller's own price and enter negotiation
    pub fn set_user_price(&mut self, price: f64) {
        self.user_price_preference = Some(price);
        self.set_stage(ConversationStage::Negotiation);
    }

    /// Whether the cached pricing still matches the current product snapshot
    pub fn pricing_is_current(&self) -> bool {
        match (&self.pricing, &self.pricing_snapshot) {
            (Some(_), Some(snapshot)) => snapshot == &self.product_info.fingerprint(),
            _ => false,
        }
    }

    /// Store a computed pricing result together with its snapshot
    pub fn set_pricing(&mut self, pricing: Pricing) {
        self.pricing_snapshot = Some(self.product_info.fingerprint());
        self.pricing = Some(pricing);
        self.updated_at = Utc::now();
    }

    /// Whether the session has gone stale
    pub fn is_expired(&self, timeout: Duration) -> bool {
        Utc::now() - self.last_message_at > timeout
    }

    /// Clear all flow state while keeping the conversation history
    ///
    /// Used after completion or cancellation so the user can start a new
    /// listing without losing the transcript.
    pub fn reset(&mut self) {
        self.stage = ConversationStage::Initial;
        self.intent = UserIntent::Unknown;
        self.product_info = ProductInfo::default();
        self.missing_fields.clear();
        self.internal_stats = None;
        self.external_stats = None;
        self.pricing = None;
        self.pricing_snapshot = None;
        self.user_price_preference = None;
        self.listing_draft = None;
        self.draft_version = 0;
        self.image_url = None;
        self.listing_id = None;
        self.updated_at = Utc::now();
    }

    /// Drop the oldest messages so the history stays within `max` entries
    pub fn trim_history(&mut self, max: usize) {
        if self.conversation_history.len() > max {
            let excess = self.conversation_history.len() - max;
            self.conversation_history.drain(..excess);
        }
    }

    /// The most recent user messages, oldest first, for extraction context
    pub fn recent_user_text(&self, limit: usize) -> String {
        let texts: Vec<&str> = self
            .conversation_history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        let start = texts.len().saturating_sub(limit);
        texts[start..].join("\n")
    }
}
