//! Per-stage message handling
//!
//! One handler per conversation stage. Each inspects the message (via
//! the classifier where stage rules call for it), mutates the session,
//! and returns a `HandlerOutcome` for the workflow layer to act on.

use crate::collaborators::heuristic::keyword_extract;
use crate::engine::{EditField, EditRequest, HandlerOutcome, ResponseSignal};
use crate::error::Result;
use crate::intent::{has_sell_verbs, IntentClassifier};
use crate::session::{ConversationStage, SessionState, UserIntent};

/// The conversation engine: classification policy plus stage handlers
pub struct ConversationEngine {
    classifier: IntentClassifier,
}

impl ConversationEngine {
    /// # Errors
    ///
    /// Returns error if the classifier patterns fail to compile
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: IntentClassifier::new()?,
        })
    }

    /// Handle one user message against the session
    ///
    /// Intent is sticky: it is re-classified only when the stored intent
    /// is Unknown or the stage is Initial. Preview is the exception and
    /// re-classifies every turn, because there the user legitimately
    /// switches between negotiating, editing, confirming, and cancelling.
    pub fn handle_message(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        if session.stage.is_terminal() {
            // A finished flow restarts cleanly on the next message
            session.reset();
        }

        if session.stage == ConversationStage::Preview {
            session.intent = self.classifier.classify(message, session);
        } else if session.intent == UserIntent::Unknown
            || session.stage == ConversationStage::Initial
        {
            session.intent = self.classifier.classify(message, session);
        }

        tracing::debug!(
            user_id = %session.user_id,
            stage = ?session.stage,
            intent = ?session.intent,
            "Handling turn"
        );

        // A cancel works from any active stage, whatever the sticky intent says
        if session.stage != ConversationStage::Initial
            && self.classifier.classify(message, session) == UserIntent::Cancelling
        {
            return self.cancel(session);
        }

        match session.stage {
            ConversationStage::Initial => self.handle_initial(session, message),
            ConversationStage::GatheringInfo => self.handle_gathering(session, message),
            ConversationStage::Analyzing | ConversationStage::Pricing => {
                self.handle_analyzing(session)
            }
            ConversationStage::Preview => self.handle_preview(session, message),
            ConversationStage::Negotiation => self.handle_negotiation(session, message),
            ConversationStage::Editing => self.handle_editing(session, message),
            ConversationStage::Confirming => self.handle_confirming(session, message),
            // Terminal stages were reset above
            ConversationStage::Completed | ConversationStage::Cancelled => {
                self.handle_initial(session, message)
            }
        }
    }

    fn handle_initial(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        match session.intent {
            UserIntent::Listing => {
                let extracted = keyword_extract(message);
                if extracted.is_empty() && session.product_info.is_empty() {
                    // Sell intent without a product yet
                    session.set_stage(ConversationStage::GatheringInfo);
                    HandlerOutcome::reply(
                        "Great, let's get your item listed. What are you selling?",
                        ResponseSignal::GatheringInfo,
                    )
                } else {
                    session.merge_product_info(extracted);
                    let missing = session.product_info.required_missing();
                    if missing.is_empty() {
                        session.set_stage(ConversationStage::Analyzing);
                        HandlerOutcome::reply(
                            "Got it, let me put a listing together.",
                            ResponseSignal::StartListingFlow,
                        )
                    } else {
                        let question = ask_for(&missing[0]);
                        session.set_missing_fields(missing);
                        HandlerOutcome::reply(question, ResponseSignal::GatheringInfo)
                    }
                }
            }
            UserIntent::Searching => {
                session.set_stage(ConversationStage::Analyzing);
                HandlerOutcome::reply("Let me look around.", ResponseSignal::StartSearchFlow)
            }
            UserIntent::Question => {
                if has_sell_verbs(message) {
                    // "How do I sell my X?" is a listing request in disguise
                    session.intent = UserIntent::Listing;
                    session.set_stage(ConversationStage::GatheringInfo);
                    return HandlerOutcome::reply(
                        "Happy to help you sell it. What is the item?",
                        ResponseSignal::GatheringInfo,
                    );
                }
                HandlerOutcome::reply(answer_question(message), ResponseSignal::QuestionAnswered)
            }
            UserIntent::Cancelling => HandlerOutcome::reply(
                "There's nothing in progress to cancel. Want to sell or find something?",
                ResponseSignal::Conversation,
            ),
            _ => HandlerOutcome::reply(
                "Hi! I can help you sell an item or find one to buy. \
                 Tell me what you'd like to do.",
                ResponseSignal::Conversation,
            ),
        }
    }

    fn handle_gathering(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        let mut extracted = keyword_extract(message);
        // A short bare answer to "what brand is it?" is the brand itself,
        // but only when the message wasn't recognized as anything else
        if extracted.is_empty()
            && session.missing_fields.first().map(String::as_str) == Some("brand")
            && is_short_answer(message)
        {
            extracted.brand = Some(message.trim().to_string());
        }
        if extracted.is_empty()
            && session.missing_fields.first().map(String::as_str) == Some("condition")
            && is_short_answer(message)
        {
            extracted.condition = Some(message.trim().to_lowercase());
        }
        session.merge_product_info(extracted);

        let missing = session.product_info.required_missing();
        if missing.is_empty() {
            session.missing_fields.clear();
            session.intent = UserIntent::Listing;
            session.set_stage(ConversationStage::Analyzing);
            HandlerOutcome::reply(
                "That's everything I need. Preparing your listing now.",
                ResponseSignal::StartListingFlow,
            )
        } else {
            let question = ask_for(&missing[0]);
            session.set_missing_fields(missing);
            HandlerOutcome::reply(question, ResponseSignal::GatheringInfo)
        }
    }

    fn handle_analyzing(&self, session: &mut SessionState) -> HandlerOutcome {
        // Trampoline: a turn arriving mid-analysis just re-triggers the flow
        let signal = if session.intent == UserIntent::Searching {
            ResponseSignal::StartSearchFlow
        } else {
            ResponseSignal::StartListingFlow
        };
        HandlerOutcome::reply("One moment.", signal)
    }

    fn handle_preview(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        match session.intent {
            UserIntent::Confirming => {
                session.set_stage(ConversationStage::Confirming);
                HandlerOutcome::reply("Publishing your listing.", ResponseSignal::ReadyToConfirm)
            }
            UserIntent::Editing => {
                session.set_stage(ConversationStage::Editing);
                HandlerOutcome::reply(
                    "Sure, what should I change? You can adjust the title, \
                     description, price, or category.",
                    ResponseSignal::Conversation,
                )
            }
            UserIntent::Negotiating => match self.classifier.extract_price(message) {
                Some(price) => {
                    session.set_user_price(price);
                    let mut outcome = HandlerOutcome::reply(
                        format!("Setting the price to {:.0} TL.", price),
                        ResponseSignal::RepriceListing,
                    );
                    outcome.user_price = Some(price);
                    outcome
                }
                None => HandlerOutcome::reply(
                    "What price did you have in mind? Give me a number, like '1500 TL'.",
                    ResponseSignal::Conversation,
                ),
            },
            _ => HandlerOutcome::reply(
                "Your draft is ready above. Say 'confirm' to publish, name a \
                 price to change it, or ask me to edit a field.",
                ResponseSignal::Conversation,
            ),
        }
    }

    fn handle_negotiation(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        if let Some(price) = self.classifier.extract_price(message) {
            session.set_user_price(price);
            let mut outcome = HandlerOutcome::reply(
                format!("Updating the price to {:.0} TL.", price),
                ResponseSignal::RepriceListing,
            );
            outcome.user_price = Some(price);
            return outcome;
        }
        match self.classifier.classify(message, session) {
            UserIntent::Confirming => {
                session.set_stage(ConversationStage::Confirming);
                HandlerOutcome::reply("Publishing your listing.", ResponseSignal::ReadyToConfirm)
            }
            _ => HandlerOutcome::reply(
                "Tell me the price you want, or say 'confirm' to keep the current one.",
                ResponseSignal::Conversation,
            ),
        }
    }

    fn handle_editing(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        let lower = message.to_lowercase();
        let price = self.classifier.extract_price(message);

        let field = if lower.contains("başlık") || lower.contains("title") {
            Some(EditField::Title)
        } else if lower.contains("açıklama") || lower.contains("description") {
            Some(EditField::Description)
        } else if lower.contains("kategori") || lower.contains("category") {
            Some(EditField::Category)
        } else if lower.contains("fiyat") || lower.contains("price") || price.is_some() {
            Some(EditField::Price)
        } else {
            None
        };

        match field {
            Some(EditField::Price) => match price {
                Some(value) => {
                    let mut outcome = HandlerOutcome::reply(
                        format!("Changing the price to {:.0} TL.", value),
                        ResponseSignal::EditField,
                    );
                    outcome.edit = Some(EditRequest {
                        field: EditField::Price,
                        new_value: Some(format!("{}", value)),
                        description: message.to_string(),
                    });
                    outcome
                }
                None => HandlerOutcome::reply(
                    "What should the new price be?",
                    ResponseSignal::Conversation,
                ),
            },
            Some(field) => {
                let mut outcome = HandlerOutcome::reply(
                    format!("Updating the {}.", field.as_str()),
                    ResponseSignal::EditField,
                );
                outcome.edit = Some(EditRequest {
                    field,
                    new_value: None,
                    description: message.to_string(),
                });
                outcome
            }
            None => HandlerOutcome::reply(
                "Which part should I change: the title, description, price, or category?",
                ResponseSignal::Conversation,
            ),
        }
    }

    fn handle_confirming(&self, session: &mut SessionState, message: &str) -> HandlerOutcome {
        match self.classifier.classify(message, session) {
            UserIntent::Confirming => {
                HandlerOutcome::reply("Publishing your listing.", ResponseSignal::ReadyToConfirm)
            }
            _ => HandlerOutcome::reply(
                "Should I publish the listing? Say 'confirm' or 'cancel'.",
                ResponseSignal::Conversation,
            ),
        }
    }

    fn cancel(&self, session: &mut SessionState) -> HandlerOutcome {
        session.set_stage(ConversationStage::Cancelled);
        session.reset();
        HandlerOutcome::reply(
            "Okay, I've dropped that. Let me know when you want to start again.",
            ResponseSignal::Cancelled,
        )
    }
}

fn ask_for(field: &str) -> String {
    match field {
        "brand" => "What brand is it?".to_string(),
        "condition" => {
            "What condition is it in (new, lightly used, used, damaged)?".to_string()
        }
        other => format!("Could you tell me the {}?", other),
    }
}

/// A reply of at most three alphanumeric-ish words is a direct answer to
/// the field we just asked for, not a new request.
fn is_short_answer(message: &str) -> bool {
    let words: Vec<&str> = message.split_whitespace().collect();
    !words.is_empty()
        && words.len() <= 3
        && words
            .iter()
            .all(|w| w.chars().all(|c| c.is_alphanumeric() || c == '-'))
}

fn answer_question(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("komisyon") || lower.contains("commission") || lower.contains("fee") {
        "We take a 2.5% commission when an item sells. Listing is free.".to_string()
    } else if lower.contains("kargo") || lower.contains("shipping") {
        "Shipping is arranged between buyer and seller after the sale.".to_string()
    } else {
        "I can list items for sale, suggest prices, and search the catalog. \
         What would you like to do?"
            .to_string()
    }
}
