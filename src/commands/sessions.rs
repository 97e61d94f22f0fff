//! Session store maintenance commands

use crate::config::Config;
use crate::error::Result;
use crate::session::SessionStore;
use chrono::Duration;

/// Remove expired sessions and compact oversized histories
///
/// # Errors
///
/// Returns error if the store cannot be opened or the sweep fails
pub fn run_cleanup(config: Config) -> Result<()> {
    let store = SessionStore::open(
        config.session_db_path(),
        Duration::minutes(config.session.expiry_minutes),
    )?;
    let removed = store.cleanup_expired()?;
    let compacted = store.compact_histories(config.session.max_history)?;
    println!(
        "Removed {} expired session(s), compacted {} history(ies).",
        removed, compacted
    );
    Ok(())
}
