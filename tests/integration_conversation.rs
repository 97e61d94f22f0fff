//! End-to-end conversation scenarios
//!
//! Runs the full assistant stack (offline collaborators, tempdir-backed
//! stores) through the flows a real seller or buyer would walk.

use bazaarly::catalog::CatalogStore;
use bazaarly::commands::build_assistant;
use bazaarly::config::Config;
use bazaarly::engine::ResponseSignal;
use bazaarly::session::{ConversationStage, ListingDraft, PriceSource, Role, SessionStore};
use bazaarly::Assistant;
use chrono::Duration;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.session.db_path = Some(dir.path().join("sessions.sled"));
    config.catalog.db_path = Some(dir.path().join("catalog.db"));
    config.collaborators.mode = "offline".to_string();
    config
}

fn assistant(dir: &TempDir) -> Assistant {
    build_assistant(&test_config(dir)).expect("assistant should build")
}

#[tokio::test]
async fn happy_path_listing_negotiate_publish() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    // One message with everything the flow needs lands straight in Preview
    let turn = assistant
        .handle_turn(
            "seller-1",
            "az kullanılmış iphone 13 satmak istiyorum",
            "web",
            None,
        )
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);
    assert!(turn.session.listing_draft.is_some());
    assert!(turn.reply_text.contains("confirm"));

    // Negotiation: the stated price wins over the computed one
    let turn = assistant
        .handle_turn("seller-1", "2000 tl olsun", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);
    let pricing = turn.session.pricing.clone().unwrap();
    assert_eq!(pricing.source, PriceSource::UserDefined);
    assert!((pricing.recommended_price - 2000.0).abs() < f64::EPSILON);
    assert!((turn.session.listing_draft.as_ref().unwrap().price - 2000.0).abs() < f64::EPSILON);

    // Confirmation publishes to the catalog
    let turn = assistant
        .handle_turn("seller-1", "onaylıyorum", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Completed);
    assert!(turn.session.listing_id.is_some());

    let catalog = CatalogStore::open(dir.path().join("catalog.db"), 0.025, 0.78).unwrap();
    let listings = catalog.my_listings("seller-1").unwrap();
    assert_eq!(listings.len(), 1);
    assert!((listings[0].price - 2000.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn gathering_loop_converges_on_required_fields() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    let turn = assistant
        .handle_turn("seller-2", "satmak istiyorum", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::GatheringInfo);

    let turn = assistant
        .handle_turn("seller-2", "samsung telefon", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::GatheringInfo);
    assert_eq!(turn.session.missing_fields, vec!["condition"]);
    assert!(turn.reply_text.to_lowercase().contains("condition"));

    let turn = assistant
        .handle_turn("seller-2", "ikinci el", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);
    assert!(turn.session.missing_fields.is_empty());
    let draft = turn.session.listing_draft.unwrap();
    assert!(draft.title.contains("Samsung"));
}

#[tokio::test]
async fn edit_flow_changes_one_field() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    assistant
        .handle_turn(
            "seller-3",
            "az kullanılmış iphone 13 satmak istiyorum",
            "web",
            None,
        )
        .await
        .unwrap();

    // Ask to edit; the assistant wants to know what to change
    let turn = assistant
        .handle_turn("seller-3", "düzenle", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Editing);

    let before = assistant
        .handle_turn("seller-3", "fiyat 1250 olsun", "web", None)
        .await
        .unwrap();
    assert_eq!(before.session.stage, ConversationStage::Preview);
    assert!(
        (before.session.listing_draft.as_ref().unwrap().price - 1250.0).abs() < f64::EPSILON
    );
    assert_eq!(before.session.user_price_preference, Some(1250.0));
}

#[tokio::test]
async fn cancel_resets_flow_but_keeps_history() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    assistant
        .handle_turn("seller-4", "iphone 13 ikinci el satıyorum", "web", None)
        .await
        .unwrap();

    let turn = assistant
        .handle_turn("seller-4", "iptal", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.signal, ResponseSignal::Cancelled);
    assert_eq!(turn.session.stage, ConversationStage::Initial);
    assert!(turn.session.product_info.is_empty());
    // Two user turns and two assistant replies survive the reset
    assert_eq!(turn.session.conversation_history.len(), 4);

    // A new listing starts clean
    let turn = assistant
        .handle_turn("seller-4", "samsung telefon ikinci el satıyorum", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);
    assert_eq!(turn.session.product_info.brand.as_deref(), Some("Samsung"));
}

#[tokio::test]
async fn publish_failure_keeps_preview_for_retry() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    let catalog_dir = dir.path().join("cat");
    config.catalog.db_path = Some(catalog_dir.join("catalog.db"));
    let assistant = build_assistant(&config).expect("assistant should build");

    let turn = assistant
        .handle_turn(
            "seller-8",
            "az kullanılmış iphone 13 satmak istiyorum",
            "web",
            None,
        )
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);

    // Take the catalog away before the confirmation lands
    std::fs::remove_dir_all(&catalog_dir).unwrap();
    let turn = assistant
        .handle_turn("seller-8", "onaylıyorum", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Preview);
    assert!(turn.session.listing_draft.is_some());
    assert!(turn.session.listing_id.is_none());
    assert!(turn.reply_text.contains("try again"));

    // With the catalog back, the same confirmation goes through
    let _ = CatalogStore::open(catalog_dir.join("catalog.db"), 0.025, 0.78).unwrap();
    let turn = assistant
        .handle_turn("seller-8", "onaylıyorum", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::Completed);
    assert!(turn.session.listing_id.is_some());
}

#[tokio::test]
async fn turn_handling_never_truncates_history() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // Seed a session with far more history than any compaction cap
    {
        let store =
            SessionStore::open(dir.path().join("sessions.sled"), Duration::minutes(30)).unwrap();
        let mut session = store.get_or_create("chatty", "web");
        for i in 0..300 {
            session.push_message(Role::User, &format!("message {}", i));
        }
        store.update(&session);
    }

    let assistant = build_assistant(&config).expect("assistant should build");
    let turn = assistant
        .handle_turn("chatty", "merhaba", "web", None)
        .await
        .unwrap();
    // The turn appended its two messages and dropped nothing
    assert_eq!(turn.session.conversation_history.len(), 302);
    assert_eq!(turn.session.conversation_history[0].content, "message 0");
}

#[tokio::test]
async fn buyer_search_lists_catalog_matches() {
    let dir = TempDir::new().unwrap();

    // Seed the catalog before the buyer asks
    {
        let catalog = CatalogStore::open(dir.path().join("catalog.db"), 0.025, 0.78).unwrap();
        catalog
            .insert_listing(
                &ListingDraft {
                    title: "Mountain bike 29er".to_string(),
                    description: "Hardtail, serviced".to_string(),
                    summary: "mountain bike".to_string(),
                    price: 450.0,
                    category: "sports".to_string(),
                    attributes: BTreeMap::new(),
                },
                "seller-9",
            )
            .unwrap();
    }

    let assistant = assistant(&dir);
    let turn = assistant
        .handle_turn("buyer-1", "looking for a mountain bike", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.signal, ResponseSignal::StartSearchFlow);
    assert!(turn.reply_text.contains("Mountain bike 29er"));
    assert_eq!(turn.session.stage, ConversationStage::Initial);
}

#[tokio::test]
async fn question_is_answered_without_starting_a_flow() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    let turn = assistant
        .handle_turn("user-5", "komisyon nedir?", "web", None)
        .await
        .unwrap();
    assert_eq!(turn.signal, ResponseSignal::QuestionAnswered);
    assert!(turn.reply_text.contains("2.5%"));
    assert_eq!(turn.session.stage, ConversationStage::Initial);
}

#[tokio::test]
async fn session_is_stable_across_turns() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    let first = assistant
        .handle_turn("user-6", "merhaba", "web", None)
        .await
        .unwrap();
    let second = assistant
        .handle_turn("user-6", "hmm", "web", None)
        .await
        .unwrap();
    assert_eq!(first.session.session_id, second.session.session_id);
    assert_eq!(second.session.conversation_history.len(), 4);
}

#[tokio::test]
async fn attached_media_nudges_intent_toward_listing() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir);

    let turn = assistant
        .handle_turn(
            "seller-7",
            "işte bu",
            "telegram",
            Some("https://cdn.example/photo.jpg".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(turn.session.stage, ConversationStage::GatheringInfo);
    assert_eq!(turn.session.image_url.as_deref(), Some("https://cdn.example/photo.jpg"));
}
