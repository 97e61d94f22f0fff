//! The assistant facade
//!
//! `Assistant` wires the session store, the conversation engine, and the
//! workflow into the single entry point the surfaces call:
//! `handle_turn`. Turns for the same user are serialized with a per-user
//! lock so concurrent messages cannot interleave their read-modify-write
//! of the session.

use crate::engine::{ConversationEngine, ResponseSignal};
use crate::error::Result;
use crate::flow::ListingFlow;
use crate::session::{Role, SessionState, SessionStore};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

/// Result of one conversation turn
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub reply_text: String,
    pub signal: ResponseSignal,
    /// Snapshot of the session after the turn
    pub session: SessionState,
}

/// The conversational marketplace assistant
pub struct Assistant {
    store: SessionStore,
    engine: ConversationEngine,
    flow: ListingFlow,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Assistant {
    pub fn new(store: SessionStore, engine: ConversationEngine, flow: ListingFlow) -> Self {
        Self {
            store,
            engine,
            flow,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user message end to end
    ///
    /// Loads or creates the user's session, records the message, runs the
    /// stage handler and (when routed) the workflow, records the reply,
    /// and persists the session. A failed persist is logged by the store;
    /// the reply is returned regardless.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Stable id of the user on their platform
    /// * `message` - The raw message text
    /// * `platform` - Source platform label ("web", "telegram", ...)
    /// * `attached_media` - URL of an attached photo, if any
    pub async fn handle_turn(
        &self,
        user_id: &str,
        message: &str,
        platform: &str,
        attached_media: Option<String>,
    ) -> Result<TurnReply> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut session = self.store.get_or_create(user_id, platform);
        if let Some(media) = attached_media {
            session.image_url = Some(media);
        }
        session.push_message(Role::User, message);

        let outcome = self.engine.handle_message(&mut session, message);
        let reply_text = self.flow.run(&mut session, &outcome, message).await;

        session.push_message(Role::Assistant, &reply_text);
        self.store.update(&session);

        Ok(TurnReply {
            reply_text,
            signal: outcome.signal,
            session,
        })
    }

    /// Drop a user's session entirely (the surface-level `/reset`)
    pub fn reset_user(&self, user_id: &str) {
        self.store.delete(user_id);
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(user_id);
    }

    /// Sweep expired sessions; returns how many were removed
    pub fn cleanup_sessions(&self) -> Result<usize> {
        let removed = self.store.cleanup_expired()?;
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // An idle entry (only the map holds it) is rebuilt on demand;
        // entries for in-flight turns are kept.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(removed)
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
