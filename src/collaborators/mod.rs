//! Collaborator interfaces
//!
//! The assistant delegates the open-ended parts of a turn to
//! collaborators behind async traits: attribute extraction, price
//! recommendation, listing copywriting, and external market lookup.
//! Two families implement them: LLM-backed (`llm`) and deterministic
//! heuristics (`heuristic`). The LLM family falls back to the heuristics
//! on any failure, so a collaborator can degrade a turn but never sink it.

use crate::config::Config;
use crate::error::Result;
use crate::session::{MarketStats, PriceStats, Pricing, ProductInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod heuristic;
pub mod llm;

pub use heuristic::{HeuristicExtractor, HeuristicPricing, HeuristicWriter, OfflineMarketLookup};
pub use llm::{LlmClient, LlmExtractor, LlmMarketLookup, LlmPricing, LlmWriter};

/// Listing copy produced by a writer collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenListing {
    pub title: String,
    pub description: String,
    pub summary: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Extracts structured product attributes from free text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract attributes from `text`, with recent conversation as context
    async fn extract(&self, text: &str, context: &str) -> Result<ProductInfo>;
}

/// Recommends a price from product attributes and market statistics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricingService: Send + Sync {
    async fn suggest_price(
        &self,
        product: &ProductInfo,
        internal: &PriceStats,
        external: &MarketStats,
    ) -> Result<Pricing>;
}

/// Writes and rewrites listing copy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingWriter: Send + Sync {
    /// Compose a full listing for a product at a given price
    async fn write_listing(&self, product: &ProductInfo, price: f64) -> Result<WrittenListing>;

    /// Rewrite one text field of a draft following an instruction
    async fn rewrite_field(
        &self,
        field: &str,
        current: &str,
        instruction: &str,
    ) -> Result<String>;
}

/// Looks up price statistics on external markets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketLookup: Send + Sync {
    async fn lookup(&self, product_label: &str, category: &str) -> Result<MarketStats>;
}

/// The full collaborator set handed to the workflow
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub pricing: Arc<dyn PricingService>,
    pub writer: Arc<dyn ListingWriter>,
    pub market: Arc<dyn MarketLookup>,
}

/// Build the collaborator set for the configured mode
///
/// `offline` wires the deterministic heuristics; `llm` wires the
/// reqwest-backed implementations, each of which already degrades to its
/// heuristic twin on failure.
///
/// # Errors
///
/// Returns error if the mode is unknown or the HTTP client cannot be built
pub fn create_collaborators(config: &Config) -> Result<Collaborators> {
    match config.collaborators.mode.as_str() {
        "offline" => Ok(Collaborators {
            extractor: Arc::new(HeuristicExtractor::new()),
            pricing: Arc::new(HeuristicPricing::new(config.pricing.clone())),
            writer: Arc::new(HeuristicWriter::new()),
            market: Arc::new(OfflineMarketLookup::default()),
        }),
        "llm" => {
            let client = LlmClient::new(&config.collaborators)?;
            Ok(Collaborators {
                extractor: Arc::new(LlmExtractor::new(client.clone())),
                pricing: Arc::new(LlmPricing::new(client.clone(), config.pricing.clone())),
                writer: Arc::new(LlmWriter::new(client.clone())),
                market: Arc::new(LlmMarketLookup::new(client)),
            })
        }
        other => Err(crate::error::BazaarlyError::Config(format!(
            "Unknown collaborator mode: {}",
            other
        ))
        .into()),
    }
}
