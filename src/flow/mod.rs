//! Listing workflow orchestration
//!
//! The flow layer acts on the engine's routing signal: it runs the
//! listing chain (extract, gate, similar listings, market lookup,
//! pricing, draft writing), the reprice and edit paths, buyer search,
//! and publication. Collaborator failures are caught at every call site
//! and degrade to safe defaults; nothing here aborts a turn.

use crate::catalog::{CatalogStore, SearchFilters, SimilarListings};
use crate::collaborators::Collaborators;
use crate::engine::{EditField, EditRequest, HandlerOutcome, ResponseSignal};
use crate::session::{
    ConversationStage, ListingDraft, MarketStats, PriceSource, Pricing, ProductInfo, SessionState,
};
use std::sync::Arc;

/// Stateless workflow runner shared across users
pub struct ListingFlow {
    collaborators: Collaborators,
    catalog: Arc<CatalogStore>,
    fallback_price: f64,
    search_limit: usize,
}

impl ListingFlow {
    pub fn new(
        collaborators: Collaborators,
        catalog: Arc<CatalogStore>,
        fallback_price: f64,
        search_limit: usize,
    ) -> Self {
        Self {
            collaborators,
            catalog,
            fallback_price,
            search_limit,
        }
    }

    /// Act on a handler outcome; returns the final reply text for the turn
    pub async fn run(
        &self,
        session: &mut SessionState,
        outcome: &HandlerOutcome,
        message: &str,
    ) -> String {
        match outcome.signal {
            ResponseSignal::StartListingFlow => self.listing_chain(session, message).await,
            ResponseSignal::StartSearchFlow => self.search(session, message),
            ResponseSignal::RepriceListing => self.reprice(session, outcome.user_price).await,
            ResponseSignal::EditField => match &outcome.edit {
                Some(edit) => self.edit(session, edit).await,
                None => outcome.reply.clone(),
            },
            ResponseSignal::ReadyToConfirm => self.publish(session),
            ResponseSignal::Conversation
            | ResponseSignal::GatheringInfo
            | ResponseSignal::Cancelled
            | ResponseSignal::QuestionAnswered => outcome.reply.clone(),
        }
    }

    /// The full listing chain: extract, gate, stats, price, write, preview
    async fn listing_chain(&self, session: &mut SessionState, message: &str) -> String {
        let context = session.recent_user_text(6);
        let extracted = match self.collaborators.extractor.extract(message, &context).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "Extraction failed outright");
                ProductInfo::default()
            }
        };
        session.merge_product_info(extracted);

        // Required-field gate. The flow never re-invokes itself; the next
        // user turn goes through the gathering handler instead.
        let missing = session.product_info.required_missing();
        if !missing.is_empty() {
            let question = match missing[0].as_str() {
                "brand" => "Almost there. What brand is it?",
                _ => "Almost there. What condition is it in?",
            };
            session.set_missing_fields(missing);
            return question.to_string();
        }

        let similar = self
            .catalog
            .find_similar(&session.product_info, self.search_limit)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Similarity lookup failed");
                SimilarListings::default()
            });
        session.internal_stats = Some(similar.stats.clone());

        let label = session.product_info.label();
        let category = session
            .product_info
            .extra
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("other")
            .to_string();
        let market = match self.collaborators.market.lookup(&label, &category).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Market lookup failed");
                MarketStats::default()
            }
        };
        session.external_stats = Some(market.clone());

        let pricing = self.resolve_pricing(session, &similar, &market).await;
        session.set_pricing(pricing.clone());

        let draft = self.compose_draft(session, pricing.recommended_price).await;
        session.replace_draft(draft);
        session.set_stage(ConversationStage::Preview);
        self.render_preview(session)
    }

    /// Pricing gate: user preference wins, then the cached result, then a
    /// fresh computation
    async fn resolve_pricing(
        &self,
        session: &SessionState,
        similar: &SimilarListings,
        market: &MarketStats,
    ) -> Pricing {
        if let Some(price) = session.user_price_preference {
            return user_pricing(price);
        }
        if session.pricing_is_current() {
            if let Some(pricing) = &session.pricing {
                tracing::debug!(user_id = %session.user_id, "Reusing cached pricing");
                return pricing.clone();
            }
        }
        match self
            .collaborators
            .pricing
            .suggest_price(&session.product_info, &similar.stats, market)
            .await
        {
            Ok(pricing) => pricing,
            Err(e) => {
                tracing::warn!(error = %e, "Pricing failed, using flat fallback");
                Pricing {
                    recommended_price: self.fallback_price,
                    min_price: None,
                    max_price: None,
                    rationale: "Starting estimate".to_string(),
                    source: PriceSource::Computed,
                }
            }
        }
    }

    async fn compose_draft(&self, session: &SessionState, price: f64) -> ListingDraft {
        let written = match self
            .collaborators
            .writer
            .write_listing(&session.product_info, price)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(error = %e, "Listing writer failed, using bare draft");
                let label = session.product_info.label();
                crate::collaborators::WrittenListing {
                    title: label.clone(),
                    description: format!("{} for sale.", label),
                    summary: label,
                    category: "other".to_string(),
                    attributes: Default::default(),
                }
            }
        };
        ListingDraft {
            title: written.title,
            description: written.description,
            summary: written.summary,
            price,
            category: written.category,
            attributes: written.attributes,
        }
    }

    /// Reprice path: cached stats, the user's price, fresh copy only
    async fn reprice(&self, session: &mut SessionState, stated: Option<f64>) -> String {
        let price = match stated.or(session.user_price_preference) {
            Some(price) => price,
            None => return "What price should I set?".to_string(),
        };
        session.user_price_preference = Some(price);
        session.set_pricing(user_pricing(price));

        let draft = self.compose_draft(session, price).await;
        session.replace_draft(draft);
        session.set_stage(ConversationStage::Preview);
        self.render_preview(session)
    }

    /// Targeted edit of one draft field
    async fn edit(&self, session: &mut SessionState, edit: &EditRequest) -> String {
        let Some(mut draft) = session.listing_draft.clone() else {
            session.set_stage(ConversationStage::Preview);
            return "There's no draft to edit yet.".to_string();
        };

        match edit.field {
            EditField::Price => {
                let parsed = edit.new_value.as_deref().and_then(|v| v.parse::<f64>().ok());
                match parsed {
                    Some(price) if price > 0.0 => {
                        draft.price = price;
                        session.user_price_preference = Some(price);
                        session.set_pricing(user_pricing(price));
                    }
                    _ => return "I couldn't read that price. What should it be?".to_string(),
                }
            }
            EditField::Title | EditField::Description | EditField::Category => {
                let current = match edit.field {
                    EditField::Title => draft.title.clone(),
                    EditField::Description => draft.description.clone(),
                    _ => draft.category.clone(),
                };
                let rewritten = match self
                    .collaborators
                    .writer
                    .rewrite_field(edit.field.as_str(), &current, &edit.description)
                    .await
                {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Rewrite failed");
                        return "I couldn't work out that change. Could you phrase it \
                                differently?"
                            .to_string();
                    }
                };
                match edit.field {
                    EditField::Title => draft.title = rewritten,
                    EditField::Description => draft.description = rewritten,
                    _ => draft.category = rewritten,
                }
            }
        }

        session.replace_draft(draft);
        session.set_stage(ConversationStage::Preview);
        self.render_preview(session)
    }

    /// Publish the draft to the catalog
    fn publish(&self, session: &mut SessionState) -> String {
        let Some(draft) = session.listing_draft.clone() else {
            session.set_stage(ConversationStage::Preview);
            return "There's no draft to publish.".to_string();
        };
        match self.catalog.insert_listing(&draft, &session.user_id) {
            Ok(id) => {
                session.listing_id = Some(id.clone());
                session.set_stage(ConversationStage::Completed);
                format!(
                    "Done! Your listing \"{}\" is live at {:.0} TL (ref {}). \
                     Message me when you want to sell something else.",
                    draft.title, draft.price, id
                )
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %session.user_id, "Publish failed");
                session.set_stage(ConversationStage::Preview);
                "Sorry, I couldn't publish the listing just now. Your draft is \
                 safe; say 'confirm' to try again."
                    .to_string()
            }
        }
    }

    /// Buyer search path
    fn search(&self, session: &mut SessionState, message: &str) -> String {
        let results = match self
            .catalog
            .search(message, &SearchFilters::default(), self.search_limit)
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Search failed");
                session.set_stage(ConversationStage::Initial);
                return "Search isn't working right now, sorry. Try again in a bit."
                    .to_string();
            }
        };
        session.set_stage(ConversationStage::Initial);

        if results.is_empty() {
            return "I couldn't find anything matching that. Try different words?"
                .to_string();
        }
        let mut lines = vec![format!("Found {} listing(s):", results.len())];
        for listing in results {
            lines.push(format!(
                "- {}: {:.0} TL ({})",
                listing.title, listing.price, listing.category
            ));
        }
        lines.join("\n")
    }

    fn render_preview(&self, session: &SessionState) -> String {
        let Some(draft) = &session.listing_draft else {
            return "Something went wrong preparing the preview.".to_string();
        };
        let rationale = session
            .pricing
            .as_ref()
            .map(|p| p.rationale.clone())
            .unwrap_or_default();
        let mut text = format!(
            "Here's your listing:\n\nTitle: {}\nCategory: {}\nPrice: {:.0} TL\n\n{}\n",
            draft.title, draft.category, draft.price, draft.description
        );
        if !rationale.is_empty() {
            text.push_str(&format!("\nPrice note: {}\n", rationale));
        }
        text.push_str(
            "\nSay 'confirm' to publish, name a different price, ask me to edit \
             a field, or 'cancel' to drop it.",
        );
        text
    }
}

fn user_pricing(price: f64) -> Pricing {
    Pricing {
        recommended_price: price,
        min_price: None,
        max_price: None,
        rationale: "Price set by you".to_string(),
        source: PriceSource::UserDefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MockExtractor, MockListingWriter, MockMarketLookup, MockPricingService, WrittenListing,
    };
    use crate::session::{PriceStats, Role};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn catalog(dir: &TempDir) -> Arc<CatalogStore> {
        Arc::new(CatalogStore::open(dir.path().join("catalog.db"), 0.025, 0.78).unwrap())
    }

    fn product(brand: &str, condition: &str) -> ProductInfo {
        let mut info = ProductInfo::default();
        info.brand = Some(brand.to_string());
        info.condition = Some(condition.to_string());
        info
    }

    fn written(title: &str) -> WrittenListing {
        WrittenListing {
            title: title.to_string(),
            description: format!("{} in good condition.", title),
            summary: title.to_string(),
            category: "electronics".to_string(),
            attributes: Default::default(),
        }
    }

    fn computed(price: f64) -> Pricing {
        Pricing {
            recommended_price: price,
            min_price: Some(price * 0.85),
            max_price: Some(price * 1.15),
            rationale: "test".to_string(),
            source: PriceSource::Computed,
        }
    }

    fn flow_with(
        extractor: MockExtractor,
        pricing: MockPricingService,
        writer: MockListingWriter,
        market: MockMarketLookup,
        catalog: Arc<CatalogStore>,
    ) -> ListingFlow {
        ListingFlow::new(
            Collaborators {
                extractor: Arc::new(extractor),
                pricing: Arc::new(pricing),
                writer: Arc::new(writer),
                market: Arc::new(market),
            },
            catalog,
            1000.0,
            5,
        )
    }

    fn listing_outcome() -> HandlerOutcome {
        HandlerOutcome::reply("", ResponseSignal::StartListingFlow)
    }

    #[tokio::test]
    async fn test_listing_chain_reaches_preview() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .returning(|_, _| Ok(product("Apple", "used")));
        let mut pricing = MockPricingService::new();
        pricing
            .expect_suggest_price()
            .returning(|_, _, _| Ok(computed(1200.0)));
        let mut writer = MockListingWriter::new();
        writer
            .expect_write_listing()
            .returning(|_, _| Ok(written("Apple iPhone 13")));
        let mut market = MockMarketLookup::new();
        market
            .expect_lookup()
            .returning(|_, _| Ok(MarketStats::default()));

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.set_stage(ConversationStage::GatheringInfo);
        session.set_stage(ConversationStage::Analyzing);

        let reply = flow
            .run(&mut session, &listing_outcome(), "iphone satıyorum")
            .await;
        assert_eq!(session.stage, ConversationStage::Preview);
        assert!(reply.contains("Apple iPhone 13"));
        assert!(reply.contains("1200"));
        assert!(session.listing_draft.is_some());
        assert!(session.pricing_is_current());
    }

    #[tokio::test]
    async fn test_missing_fields_gate_returns_to_gathering() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .returning(|_, _| Ok(ProductInfo::default()));
        let pricing = MockPricingService::new();
        let writer = MockListingWriter::new();
        let market = MockMarketLookup::new();

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.set_stage(ConversationStage::GatheringInfo);
        session.set_stage(ConversationStage::Analyzing);

        let reply = flow
            .run(&mut session, &listing_outcome(), "something vague")
            .await;
        assert_eq!(session.stage, ConversationStage::GatheringInfo);
        assert_eq!(session.missing_fields, vec!["brand", "condition"]);
        assert!(reply.contains("brand"));
    }

    #[tokio::test]
    async fn test_pricing_computed_once_per_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .returning(|_, _| Ok(product("Apple", "used")));
        let mut pricing = MockPricingService::new();
        // The pricer must be consulted exactly once across two runs with
        // an unchanged product snapshot
        pricing
            .expect_suggest_price()
            .times(1)
            .returning(|_, _, _| Ok(computed(900.0)));
        let mut writer = MockListingWriter::new();
        writer
            .expect_write_listing()
            .returning(|_, _| Ok(written("Apple iPhone")));
        let mut market = MockMarketLookup::new();
        market
            .expect_lookup()
            .returning(|_, _| Ok(MarketStats::default()));

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.set_stage(ConversationStage::GatheringInfo);
        session.set_stage(ConversationStage::Analyzing);

        flow.run(&mut session, &listing_outcome(), "iphone").await;
        let first = session.pricing.clone().unwrap();

        // Second pass with the same snapshot reuses the cache
        session.set_stage(ConversationStage::Cancelled);
        session.stage = ConversationStage::Analyzing;
        flow.run(&mut session, &listing_outcome(), "iphone").await;
        let second = session.pricing.clone().unwrap();
        assert_eq!(first.recommended_price, second.recommended_price);
    }

    #[tokio::test]
    async fn test_user_price_overrides_computed() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .returning(|_, _| Ok(product("Apple", "used")));
        // The pricer must never be called when the user named a price
        let pricing = MockPricingService::new();
        let mut writer = MockListingWriter::new();
        writer
            .expect_write_listing()
            .returning(|_, _| Ok(written("Apple iPhone")));
        let mut market = MockMarketLookup::new();
        market
            .expect_lookup()
            .returning(|_, _| Ok(MarketStats::default()));

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.user_price_preference = Some(1750.0);
        session.set_stage(ConversationStage::GatheringInfo);
        session.set_stage(ConversationStage::Analyzing);

        flow.run(&mut session, &listing_outcome(), "iphone").await;
        let pricing = session.pricing.unwrap();
        assert_eq!(pricing.source, PriceSource::UserDefined);
        assert!((pricing.recommended_price - 1750.0).abs() < f64::EPSILON);
        assert!((session.listing_draft.unwrap().price - 1750.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reprice_reuses_stats_and_marks_user_defined() {
        let dir = TempDir::new().unwrap();
        let extractor = MockExtractor::new();
        let pricing = MockPricingService::new();
        let mut writer = MockListingWriter::new();
        writer
            .expect_write_listing()
            .returning(|_, price| {
                let mut w = written("Apple iPhone");
                w.description = format!("Now at {:.0} TL.", price);
                Ok(w)
            });
        let market = MockMarketLookup::new();

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.merge_product_info(product("Apple", "used"));
        session.internal_stats = Some(PriceStats::default());
        session.stage = ConversationStage::Negotiation;
        session.user_price_preference = Some(1500.0);

        let mut outcome = HandlerOutcome::reply("", ResponseSignal::RepriceListing);
        outcome.user_price = Some(1500.0);
        let reply = flow.run(&mut session, &outcome, "1500 tl").await;

        assert_eq!(session.stage, ConversationStage::Preview);
        assert_eq!(session.pricing.as_ref().unwrap().source, PriceSource::UserDefined);
        assert!(reply.contains("1500"));
        assert_eq!(session.draft_version, 1);
    }

    #[tokio::test]
    async fn test_edit_title_rewrites_and_returns_to_preview() {
        let dir = TempDir::new().unwrap();
        let extractor = MockExtractor::new();
        let pricing = MockPricingService::new();
        let mut writer = MockListingWriter::new();
        writer
            .expect_rewrite_field()
            .returning(|_, _, _| Ok("Pristine Apple iPhone 13".to_string()));
        let market = MockMarketLookup::new();

        let flow = flow_with(extractor, pricing, writer, market, catalog(&dir));
        let mut session = SessionState::new("user-1", "web");
        session.replace_draft(ListingDraft {
            title: "Apple iPhone 13".to_string(),
            description: "desc".to_string(),
            summary: "sum".to_string(),
            price: 1200.0,
            category: "electronics".to_string(),
            attributes: Default::default(),
        });
        session.stage = ConversationStage::Editing;

        let mut outcome = HandlerOutcome::reply("", ResponseSignal::EditField);
        outcome.edit = Some(EditRequest {
            field: EditField::Title,
            new_value: None,
            description: "make the title say pristine".to_string(),
        });
        let reply = flow.run(&mut session, &outcome, "...").await;

        assert_eq!(session.stage, ConversationStage::Preview);
        assert!(reply.contains("Pristine Apple iPhone 13"));
        assert_eq!(session.listing_draft.unwrap().title, "Pristine Apple iPhone 13");
    }

    #[tokio::test]
    async fn test_edit_price_is_parsed_directly() {
        let dir = TempDir::new().unwrap();
        let flow = flow_with(
            MockExtractor::new(),
            MockPricingService::new(),
            MockListingWriter::new(),
            MockMarketLookup::new(),
            catalog(&dir),
        );
        let mut session = SessionState::new("user-1", "web");
        session.replace_draft(ListingDraft {
            title: "t".to_string(),
            description: "d".to_string(),
            summary: "s".to_string(),
            price: 1200.0,
            category: "electronics".to_string(),
            attributes: Default::default(),
        });
        session.stage = ConversationStage::Editing;

        let mut outcome = HandlerOutcome::reply("", ResponseSignal::EditField);
        outcome.edit = Some(EditRequest {
            field: EditField::Price,
            new_value: Some("950".to_string()),
            description: "fiyat 950".to_string(),
        });
        flow.run(&mut session, &outcome, "fiyat 950").await;

        assert!((session.listing_draft.unwrap().price - 950.0).abs() < f64::EPSILON);
        assert_eq!(session.user_price_preference, Some(950.0));
    }

    #[tokio::test]
    async fn test_publish_inserts_and_completes() {
        let dir = TempDir::new().unwrap();
        let store = catalog(&dir);
        let flow = flow_with(
            MockExtractor::new(),
            MockPricingService::new(),
            MockListingWriter::new(),
            MockMarketLookup::new(),
            store.clone(),
        );
        let mut session = SessionState::new("seller-9", "web");
        session.replace_draft(ListingDraft {
            title: "Apple iPhone 13".to_string(),
            description: "d".to_string(),
            summary: "s".to_string(),
            price: 1200.0,
            category: "electronics".to_string(),
            attributes: Default::default(),
        });
        session.stage = ConversationStage::Confirming;

        let outcome = HandlerOutcome::reply("", ResponseSignal::ReadyToConfirm);
        let reply = flow.run(&mut session, &outcome, "confirm").await;

        assert_eq!(session.stage, ConversationStage::Completed);
        assert!(session.listing_id.is_some());
        assert!(reply.contains("live"));
        assert_eq!(store.my_listings("seller-9").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_preview_and_draft() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("cat");
        let store = Arc::new(
            CatalogStore::open(db_dir.join("catalog.db"), 0.025, 0.78).unwrap(),
        );
        let flow = flow_with(
            MockExtractor::new(),
            MockPricingService::new(),
            MockListingWriter::new(),
            MockMarketLookup::new(),
            store,
        );
        let mut session = SessionState::new("seller-9", "web");
        session.replace_draft(ListingDraft {
            title: "Apple iPhone 13".to_string(),
            description: "d".to_string(),
            summary: "s".to_string(),
            price: 1200.0,
            category: "electronics".to_string(),
            attributes: Default::default(),
        });
        session.stage = ConversationStage::Confirming;

        // Take the database away so the insert fails
        std::fs::remove_dir_all(&db_dir).unwrap();

        let outcome = HandlerOutcome::reply("", ResponseSignal::ReadyToConfirm);
        let reply = flow.run(&mut session, &outcome, "confirm").await;

        assert_eq!(session.stage, ConversationStage::Preview);
        assert!(session.listing_draft.is_some());
        assert!(session.listing_id.is_none());
        assert!(reply.contains("try again"));
    }

    #[tokio::test]
    async fn test_search_lists_matches() {
        let dir = TempDir::new().unwrap();
        let store = catalog(&dir);
        store
            .insert_listing(
                &ListingDraft {
                    title: "Mountain bike".to_string(),
                    description: "29 inch".to_string(),
                    summary: "bike".to_string(),
                    price: 400.0,
                    category: "sports".to_string(),
                    attributes: Default::default(),
                },
                "seller-1",
            )
            .unwrap();
        let flow = flow_with(
            MockExtractor::new(),
            MockPricingService::new(),
            MockListingWriter::new(),
            MockMarketLookup::new(),
            store,
        );
        let mut session = SessionState::new("buyer-1", "web");
        session.push_message(Role::User, "looking for a bike");
        session.set_stage(ConversationStage::Analyzing);

        let outcome = HandlerOutcome::reply("", ResponseSignal::StartSearchFlow);
        let reply = flow.run(&mut session, &outcome, "looking for a bike").await;
        assert!(reply.contains("Mountain bike"));
        assert_eq!(session.stage, ConversationStage::Initial);
    }

    #[tokio::test]
    async fn test_plain_signals_pass_reply_through() {
        let dir = TempDir::new().unwrap();
        let flow = flow_with(
            MockExtractor::new(),
            MockPricingService::new(),
            MockListingWriter::new(),
            MockMarketLookup::new(),
            catalog(&dir),
        );
        let mut session = SessionState::new("user-1", "web");
        let outcome = HandlerOutcome::reply("hello there", ResponseSignal::Conversation);
        let reply = flow.run(&mut session, &outcome, "hi").await;
        assert_eq!(reply, "hello there");
    }
}
