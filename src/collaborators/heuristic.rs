//! Deterministic collaborator implementations
//!
//! Keyword tables and templates, no network. These serve two roles:
//! the whole collaborator set in offline mode, and the substitute an
//! LLM-backed collaborator falls back to when its call fails.

use crate::config::PricingConfig;
use crate::error::Result;
use crate::intent::KNOWN_BRANDS;
use crate::session::{MarketStats, PriceSource, PriceStats, Pricing, ProductInfo};
use crate::collaborators::{Extractor, ListingWriter, MarketLookup, PricingService, WrittenListing};
use async_trait::async_trait;
use std::collections::BTreeMap;

const CONDITION_KEYWORDS: [(&str, &str); 10] = [
    ("sıfır", "new"),
    ("yeni", "new"),
    ("brand new", "new"),
    ("az kullanılmış", "lightly used"),
    ("temiz", "lightly used"),
    ("ikinci el", "used"),
    ("kullanılmış", "used"),
    ("used", "used"),
    ("hasarlı", "damaged"),
    ("damaged", "damaged"),
];

const CATEGORY_KEYWORDS: [(&str, &str); 12] = [
    ("telefon", "electronics"),
    ("iphone", "electronics"),
    ("phone", "electronics"),
    ("laptop", "electronics"),
    ("bilgisayar", "electronics"),
    ("tablet", "electronics"),
    ("bisiklet", "sports"),
    ("bike", "sports"),
    ("koltuk", "furniture"),
    ("masa", "furniture"),
    ("sofa", "furniture"),
    ("kitap", "books"),
];

/// Keyword-table extraction from raw text
///
/// Shared by the heuristic extractor trait impl and by the engine's
/// gathering-stage parsing, which works on single short answers.
pub fn keyword_extract(text: &str) -> ProductInfo {
    let lower = text.to_lowercase();
    let mut info = ProductInfo::default();

    for brand in KNOWN_BRANDS {
        if lower.contains(brand) {
            // "iphone" implies the brand and doubles as the model family
            if brand == "iphone" {
                info.brand = Some("Apple".to_string());
            } else {
                info.brand = Some(capitalize(brand));
            }
            break;
        }
    }

    for (keyword, condition) in CONDITION_KEYWORDS {
        if lower.contains(keyword) {
            info.condition = Some(condition.to_string());
            break;
        }
    }

    for (keyword, category) in CATEGORY_KEYWORDS {
        if lower.contains(keyword) {
            info.extra
                .insert("category".to_string(), serde_json::json!(category));
            break;
        }
    }

    if let Some(model) = extract_model(&lower) {
        info.extra.insert("model".to_string(), serde_json::json!(model));
    }

    info
}

fn extract_model(lower: &str) -> Option<String> {
    // "iphone 13", "galaxy s22" style brand-plus-token models
    for family in ["iphone", "galaxy", "redmi", "thinkpad", "macbook"] {
        if let Some(pos) = lower.find(family) {
            let rest = &lower[pos..];
            let tokens: Vec<&str> = rest.split_whitespace().take(2).collect();
            if tokens.len() == 2 && tokens[1].chars().any(|c| c.is_ascii_digit()) {
                return Some(format!("{} {}", capitalize(tokens[0]), tokens[1]));
            }
            return Some(capitalize(tokens[0]));
        }
    }
    None
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Offline extractor over the keyword tables
#[derive(Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for HeuristicExtractor {
    async fn extract(&self, text: &str, context: &str) -> Result<ProductInfo> {
        // Context first, so the current message overrides what it repeats
        let mut info = keyword_extract(context);
        info.merge(keyword_extract(text));
        Ok(info)
    }
}

/// Statistics-driven pricing with a configured fallback
pub struct HeuristicPricing {
    config: PricingConfig,
}

impl HeuristicPricing {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PricingService for HeuristicPricing {
    async fn suggest_price(
        &self,
        product: &ProductInfo,
        internal: &PriceStats,
        external: &MarketStats,
    ) -> Result<Pricing> {
        let (base, rationale) = if let Some(avg) = internal.avg_price {
            (
                avg,
                format!(
                    "Average of {} similar listings in the catalog",
                    internal.similar_count
                ),
            )
        } else if let Some(avg) = external.avg_price {
            (
                avg,
                format!(
                    "Average across {} external market sources",
                    external.sources_checked
                ),
            )
        } else {
            (
                self.config.fallback_price,
                format!("No market data for {}; starting estimate", product.label()),
            )
        };

        // Damaged goods price well under the market
        let adjusted = match product.condition.as_deref() {
            Some("damaged") => base * 0.6,
            Some("new") => base * 1.1,
            _ => base,
        };
        let band = self.config.price_band;
        Ok(Pricing {
            recommended_price: round2(adjusted),
            min_price: Some(round2(adjusted * (1.0 - band))),
            max_price: Some(round2(adjusted * (1.0 + band))),
            rationale,
            source: PriceSource::Computed,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Template-based listing writer
#[derive(Default)]
pub struct HeuristicWriter;

impl HeuristicWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ListingWriter for HeuristicWriter {
    async fn write_listing(&self, product: &ProductInfo, price: f64) -> Result<WrittenListing> {
        let label = product.label();
        let condition = product.condition.as_deref().unwrap_or("used");
        let category = product
            .extra
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("other")
            .to_string();

        let title = format!("{} ({})", label, condition);
        let description = format!(
            "{} for sale. Condition: {}. Asking price {:.0} TL. Message for details.",
            label, condition, price
        );
        let summary = format!("{}, {}, {:.0} TL", label, condition, price);

        let mut attributes = BTreeMap::new();
        if let Some(brand) = &product.brand {
            attributes.insert("brand".to_string(), serde_json::json!(brand));
        }
        attributes.insert("condition".to_string(), serde_json::json!(condition));
        for (key, value) in &product.extra {
            attributes.insert(key.clone(), value.clone());
        }

        Ok(WrittenListing {
            title,
            description,
            summary,
            category,
            attributes,
        })
    }

    async fn rewrite_field(
        &self,
        _field: &str,
        current: &str,
        instruction: &str,
    ) -> Result<String> {
        // Without a language model, the best rewrite is the instruction
        // itself when it reads like replacement text, else the original.
        let trimmed = instruction.trim();
        if trimmed.len() > 3 && !trimmed.ends_with('?') {
            Ok(trimmed.to_string())
        } else {
            Ok(current.to_string())
        }
    }
}

/// Market lookup that reports no external data
///
/// Offline mode has no market to consult; empty stats push the pricer to
/// internal statistics or the fallback price.
#[derive(Default)]
pub struct OfflineMarketLookup;

#[async_trait]
impl MarketLookup for OfflineMarketLookup {
    async fn lookup(&self, _product_label: &str, _category: &str) -> Result<MarketStats> {
        Ok(MarketStats::default())
    }
}
