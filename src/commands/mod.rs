/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes these top-level command modules:

- `chat`     — Interactive chat mode against the assistant
- `listings` — Table view of a seller's published listings
- `sessions` — Session store maintenance

These handlers are intentionally small and use the library components:
the session store, the catalog, the engine, and the workflow.
*/

use crate::assistant::Assistant;
use crate::catalog::CatalogStore;
use crate::collaborators::create_collaborators;
use crate::config::Config;
use crate::engine::ConversationEngine;
use crate::error::Result;
use crate::flow::ListingFlow;
use crate::session::SessionStore;
use chrono::Duration;
use std::sync::Arc;

pub mod chat;
pub mod listings;
pub mod sessions;

/// Wire the full assistant stack from configuration
///
/// # Errors
///
/// Returns error if a store cannot be opened or the collaborator mode is
/// invalid
pub fn build_assistant(config: &Config) -> Result<Assistant> {
    let store = SessionStore::open(
        config.session_db_path(),
        Duration::minutes(config.session.expiry_minutes),
    )?;
    let catalog = Arc::new(CatalogStore::open(
        config.catalog_db_path(),
        config.pricing.commission_rate,
        config.catalog.similarity_threshold,
    )?);
    let collaborators = create_collaborators(config)?;
    let engine = ConversationEngine::new()?;
    let flow = ListingFlow::new(
        collaborators,
        catalog,
        config.pricing.fallback_price,
        config.catalog.search_limit,
    );
    Ok(Assistant::new(store, engine, flow))
}
