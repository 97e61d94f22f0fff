//! LLM-backed collaborator implementations
//!
//! A thin chat-completions client (OpenAI-compatible endpoint, so local
//! Ollama and hosted services both work) plus one implementation per
//! collaborator trait. Each prompts for strict JSON, strips markdown
//! fences, and falls back to its heuristic twin when the call or the
//! parse fails.

use crate::config::{CollaboratorConfig, PricingConfig};
use crate::error::{BazaarlyError, Result};
use crate::collaborators::heuristic::{
    keyword_extract, HeuristicPricing, HeuristicWriter,
};
use crate::collaborators::{Extractor, ListingWriter, MarketLookup, PricingService, WrittenListing};
use crate::prompts;
use crate::session::{MarketStats, PriceSource, PriceStats, Pricing, ProductInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request structure for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: String,
    content: String,
}

/// Response structure from the chat completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Minimal chat-completions client shared by the LLM collaborators
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// Build a client from the collaborator configuration
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be constructed
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("bazaarly/0.2.0")
            .build()
            .map_err(BazaarlyError::Http)?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Send one system+user exchange and return the assistant text
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatRequestMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatRequestMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(BazaarlyError::Http)?;
        if !response.status().is_success() {
            return Err(BazaarlyError::Collaborator(format!(
                "Chat endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let body: ChatResponse = response.json().await.map_err(BazaarlyError::Http)?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BazaarlyError::Collaborator("Empty completion".to_string()))?;
        Ok(content)
    }

    /// Chat and parse the reply as JSON of type `T`
    ///
    /// Models wrap JSON in markdown fences more often than not; strip
    /// them before parsing.
    pub async fn chat_json<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T> {
        let raw = self.chat(system, user).await?;
        let cleaned = strip_fences(&raw);
        serde_json::from_str(cleaned).map_err(|e| {
            BazaarlyError::Collaborator(format!("Unparseable collaborator JSON: {}", e)).into()
        })
    }
}

/// Strip a leading/trailing markdown code fence from model output
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

/// LLM attribute extractor with keyword fallback
pub struct LlmExtractor {
    client: LlmClient,
}

impl LlmExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, text: &str, context: &str) -> Result<ProductInfo> {
        let user = format!("Conversation so far:\n{}\n\nLatest message:\n{}", context, text);
        match self
            .client
            .chat_json::<ProductInfo>(prompts::EXTRACTION_SYSTEM, &user)
            .await
        {
            Ok(info) => Ok(info),
            Err(e) => {
                tracing::warn!(error = %e, "Extraction call failed, using keyword fallback");
                let mut info = keyword_extract(context);
                info.merge(keyword_extract(text));
                Ok(info)
            }
        }
    }
}

/// Shape the pricing prompt asks the model to emit
#[derive(Debug, Deserialize)]
struct PricingJson {
    recommended_price: f64,
    #[serde(default)]
    min_price: Option<f64>,
    #[serde(default)]
    max_price: Option<f64>,
    #[serde(default)]
    rationale: String,
}

/// LLM price recommender with statistics fallback
pub struct LlmPricing {
    client: LlmClient,
    fallback: HeuristicPricing,
}

impl LlmPricing {
    pub fn new(client: LlmClient, config: PricingConfig) -> Self {
        Self {
            client,
            fallback: HeuristicPricing::new(config),
        }
    }
}

#[async_trait]
impl PricingService for LlmPricing {
    async fn suggest_price(
        &self,
        product: &ProductInfo,
        internal: &PriceStats,
        external: &MarketStats,
    ) -> Result<Pricing> {
        let user = format!(
            "Product: {}\nCatalog stats: {}\nMarket stats: {}",
            serde_json::to_string(product)?,
            serde_json::to_string(internal)?,
            serde_json::to_string(external)?,
        );
        match self
            .client
            .chat_json::<PricingJson>(prompts::PRICING_SYSTEM, &user)
            .await
        {
            Ok(json) if json.recommended_price > 0.0 => Ok(Pricing {
                recommended_price: json.recommended_price,
                min_price: json.min_price,
                max_price: json.max_price,
                rationale: json.rationale,
                source: PriceSource::Computed,
            }),
            Ok(_) => {
                tracing::warn!("Pricing call returned a non-positive price, using fallback");
                self.fallback.suggest_price(product, internal, external).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pricing call failed, using fallback");
                self.fallback.suggest_price(product, internal, external).await
            }
        }
    }
}

/// LLM listing writer with template fallback
pub struct LlmWriter {
    client: LlmClient,
    fallback: HeuristicWriter,
}

impl LlmWriter {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            fallback: HeuristicWriter::new(),
        }
    }
}

#[async_trait]
impl ListingWriter for LlmWriter {
    async fn write_listing(&self, product: &ProductInfo, price: f64) -> Result<WrittenListing> {
        let user = format!(
            "Product: {}\nPrice: {:.2}",
            serde_json::to_string(product)?,
            price
        );
        match self
            .client
            .chat_json::<WrittenListing>(prompts::WRITER_SYSTEM, &user)
            .await
        {
            Ok(listing) => Ok(listing),
            Err(e) => {
                tracing::warn!(error = %e, "Listing writer call failed, using template fallback");
                self.fallback.write_listing(product, price).await
            }
        }
    }

    async fn rewrite_field(
        &self,
        field: &str,
        current: &str,
        instruction: &str,
    ) -> Result<String> {
        let user = format!(
            "Field: {}\nCurrent text: {}\nInstruction: {}",
            field, current, instruction
        );
        match self.client.chat(prompts::REWRITE_SYSTEM, &user).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => Ok(rewritten.trim().to_string()),
            Ok(_) => Ok(current.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Rewrite call failed, using heuristic fallback");
                self.fallback.rewrite_field(field, current, instruction).await
            }
        }
    }
}

/// LLM market lookup; failure means no external data, never an error
pub struct LlmMarketLookup {
    client: LlmClient,
}

impl LlmMarketLookup {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketLookup for LlmMarketLookup {
    async fn lookup(&self, product_label: &str, category: &str) -> Result<MarketStats> {
        let user = format!("Product: {}\nCategory: {}", product_label, category);
        match self
            .client
            .chat_json::<MarketStats>(prompts::MARKET_SYSTEM, &user)
            .await
        {
            Ok(stats) => Ok(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Market lookup failed, reporting no data");
                Ok(MarketStats::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    async fn client_for(server: &MockServer) -> LlmClient {
        let config = CollaboratorConfig {
            mode: "llm".to_string(),
            api_base: server.uri(),
            model: "test-model".to_string(),
            api_key: None,
            timeout_seconds: 5,
        };
        LlmClient::new(&config).unwrap()
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_chat_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hello")))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let reply = client.chat("system", "user").await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_chat_json_parses_fenced_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                "```json\n{\"brand\": \"Apple\", \"condition\": \"used\"}\n```",
            )))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let info: ProductInfo = client.chat_json("system", "user").await.unwrap();
        assert_eq!(info.brand.as_deref(), Some("Apple"));
        assert_eq!(info.condition.as_deref(), Some("used"));
    }

    #[tokio::test]
    async fn test_extractor_falls_back_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let extractor = LlmExtractor::new(client_for(&server).await);
        let info = extractor
            .extract("ikinci el iphone satıyorum", "")
            .await
            .unwrap();
        // Keyword fallback still produced attributes
        assert_eq!(info.brand.as_deref(), Some("Apple"));
        assert_eq!(info.condition.as_deref(), Some("used"));
    }

    #[tokio::test]
    async fn test_pricing_falls_back_on_garbage_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("not json at all")),
            )
            .mount(&server)
            .await;

        let pricing = LlmPricing::new(client_for(&server).await, PricingConfig::default());
        let internal = PriceStats {
            similar_count: 2,
            avg_price: Some(800.0),
            min_price: Some(700.0),
            max_price: Some(900.0),
        };
        let result = pricing
            .suggest_price(&ProductInfo::default(), &internal, &MarketStats::default())
            .await
            .unwrap();
        assert!((result.recommended_price - 800.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_market_lookup_swallows_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let lookup = LlmMarketLookup::new(client_for(&server).await);
        let stats = lookup.lookup("Apple iPhone 13", "electronics").await.unwrap();
        assert_eq!(stats.sources_checked, 0);
        assert!(stats.avg_price.is_none());
    }
}
