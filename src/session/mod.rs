//! Conversation session state and persistence
//!
//! A session is the per-user record of a marketplace conversation: the
//! stage machine, gathered product attributes, pricing, and the listing
//! draft under construction. `state` holds the data model, `store` the
//! sled-backed persistence layer.

pub mod state;
pub mod store;

pub use state::{
    ChatMessage, ConversationStage, ListingDraft, MarketStats, PriceSource, PriceStats, Pricing,
    ProductInfo, Role, SessionState, UserIntent,
};
pub use store::SessionStore;
