//! Session persistence
//!
//! Stores conversation sessions in an embedded `sled` database behind an
//! in-memory cache. The cache serves hot reads within the process; sled
//! makes sessions survive restarts. A write that fails against sled is
//! logged and the turn continues, with the cache staying authoritative.

use crate::error::{BazaarlyError, Result};
use crate::session::state::SessionState;
use chrono::Duration;
use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Durable per-user session store
///
/// One session per user id. Expired and corrupt records are treated as
/// absent: they are deleted on read and a fresh session is handed out.
pub struct SessionStore {
    db: Db,
    cache: Mutex<HashMap<String, SessionState>>,
    timeout: Duration,
}

impl SessionStore {
    /// Open or create a session store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    /// * `timeout` - Inactivity window after which a session expires
    ///
    /// # Errors
    ///
    /// Returns `BazaarlyError::SessionStore` if the database cannot be opened
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| BazaarlyError::SessionStore(format!("Failed to open database: {}", e)))?;
        Ok(Self {
            db,
            cache: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    /// Fetch the session for a user, creating one if none is live
    ///
    /// Idempotent: repeated calls for the same user return the same
    /// session until it expires or is deleted. An expired or corrupt
    /// stored record is removed and replaced with a fresh session.
    pub fn get_or_create(&self, user_id: &str, platform: &str) -> SessionState {
        if let Some(session) = self.get(user_id) {
            return session;
        }

        let session = SessionState::new(user_id, platform);
        tracing::debug!(user_id = %user_id, platform = %platform, "Created new session");
        self.update(&session);
        session
    }

    /// Fetch a user's live session, if any
    ///
    /// Returns `None` for missing, expired, or undeserializable records;
    /// the latter two are deleted as a side effect.
    pub fn get(&self, user_id: &str) -> Option<SessionState> {
        if let Some(session) = self.cache_get(user_id) {
            if session.is_expired(self.timeout) {
                tracing::debug!(user_id = %user_id, "Cached session expired, discarding");
                self.delete(user_id);
                return None;
            }
            return Some(session);
        }

        let key = session_key(user_id);
        let bytes = match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Session read failed");
                return None;
            }
        };

        match serde_json::from_slice::<SessionState>(&bytes) {
            Ok(session) if session.is_expired(self.timeout) => {
                tracing::debug!(user_id = %user_id, "Stored session expired, discarding");
                self.delete(user_id);
                None
            }
            Ok(session) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(user_id.to_string(), session.clone());
                }
                Some(session)
            }
            Err(e) => {
                // A record we cannot read is as good as gone.
                tracing::warn!(user_id = %user_id, error = %e, "Corrupt session record, deleting");
                self.delete(user_id);
                None
            }
        }
    }

    /// Write a session through the cache to sled
    ///
    /// Durable-write failures are logged, not propagated: losing
    /// persistence must not abort the conversation turn.
    pub fn update(&self, session: &SessionState) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(session.user_id.clone(), session.clone());
        }

        let key = session_key(&session.user_id);
        let value = match serde_json::to_vec(session) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Session serialize failed");
                return;
            }
        };

        if let Err(e) = self.db.insert(key.as_bytes(), value) {
            tracing::warn!(user_id = %session.user_id, error = %e, "Session write failed");
            return;
        }
        if let Err(e) = self.db.flush() {
            tracing::warn!(user_id = %session.user_id, error = %e, "Session flush failed");
        }
    }

    /// Remove a user's session from cache and disk
    pub fn delete(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(user_id);
        }
        let key = session_key(user_id);
        if let Err(e) = self.db.remove(key.as_bytes()) {
            tracing::warn!(user_id = %user_id, error = %e, "Session delete failed");
        }
    }

    /// Sweep expired and unreadable sessions from cache and disk
    ///
    /// Returns the number of records removed from disk.
    pub fn cleanup_expired(&self) -> Result<usize> {
        if let Ok(mut cache) = self.cache.lock() {
            let timeout = self.timeout;
            cache.retain(|_, session| !session.is_expired(timeout));
        }

        let mut removed = 0;
        for entry in self.db.scan_prefix(b"session:") {
            let (key, value) = entry
                .map_err(|e| BazaarlyError::SessionStore(format!("Scan failed: {}", e)))?;
            let stale = match serde_json::from_slice::<SessionState>(&value) {
                Ok(session) => session.is_expired(self.timeout),
                // Unreadable counts as expired.
                Err(_) => true,
            };
            if stale {
                self.db
                    .remove(&key)
                    .map_err(|e| BazaarlyError::SessionStore(format!("Remove failed: {}", e)))?;
                removed += 1;
            }
        }

        if removed > 0 {
            self.db
                .flush()
                .map_err(|e| BazaarlyError::SessionStore(format!("Flush failed: {}", e)))?;
            tracing::info!(removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    /// Trim oversized conversation histories down to `max` messages
    ///
    /// Turn handling appends to the history without bound; this
    /// maintenance sweep compacts long-lived sessions instead. Returns
    /// the number of sessions trimmed.
    pub fn compact_histories(&self, max: usize) -> Result<usize> {
        let mut compacted = 0;
        for entry in self.db.scan_prefix(b"session:") {
            let (_, value) = entry
                .map_err(|e| BazaarlyError::SessionStore(format!("Scan failed: {}", e)))?;
            // Unreadable records are cleanup_expired's job
            let Ok(mut session) = serde_json::from_slice::<SessionState>(&value) else {
                continue;
            };
            if session.conversation_history.len() > max {
                session.trim_history(max);
                self.update(&session);
                compacted += 1;
            }
        }
        if compacted > 0 {
            tracing::info!(compacted, max, "Compacted oversized session histories");
        }
        Ok(compacted)
    }

    fn cache_get(&self, user_id: &str) -> Option<SessionState> {
        self.cache.lock().ok()?.get(user_id).cloned()
    }
}

/// Store-safe key for a user id
///
/// User ids arrive from arbitrary platforms; anything outside
/// `[A-Za-z0-9_-]` is replaced with `_` so the key space stays printable.
fn session_key(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("session:{}", safe)
}
