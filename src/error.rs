//! Error types for Bazaarly
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Bazaarly operations
///
/// This enum encompasses all possible errors that can occur during
/// conversation handling, session persistence, catalog operations,
/// and collaborator calls.
#[derive(Error, Debug)]
pub enum BazaarlyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session state errors (invalid transitions, bad snapshots)
    #[error("Session error: {0}")]
    Session(String),

    /// Session store errors (sled operations, corrupt records)
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Catalog database errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Collaborator errors (extraction, pricing, listing generation)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Intent classification errors (bad patterns, unparseable amounts)
    #[error("Intent error: {0}")]
    Intent(String),

    /// A listing operation was attempted by a user who does not own it
    #[error("Ownership check failed: listing {listing_id} does not belong to {user_id}")]
    NotOwner {
        /// The listing being modified
        listing_id: String,
        /// The user who attempted the modification
        user_id: String,
    },

    /// Not enough stock to fulfil an order
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        /// Quantity requested by the buyer
        requested: u32,
        /// Quantity currently in stock
        available: u32,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors from the catalog backend
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for Bazaarly operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = BazaarlyError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_session_error_display() {
        let error = BazaarlyError::Session("unknown stage".to_string());
        assert_eq!(error.to_string(), "Session error: unknown stage");
    }

    #[test]
    fn test_session_store_error_display() {
        let error = BazaarlyError::SessionStore("tree unavailable".to_string());
        assert_eq!(error.to_string(), "Session store error: tree unavailable");
    }

    #[test]
    fn test_collaborator_error_display() {
        let error = BazaarlyError::Collaborator("extraction timed out".to_string());
        assert_eq!(
            error.to_string(),
            "Collaborator error: extraction timed out"
        );
    }

    #[test]
    fn test_not_owner_display() {
        let error = BazaarlyError::NotOwner {
            listing_id: "lst-42".to_string(),
            user_id: "user-7".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("lst-42"));
        assert!(s.contains("user-7"));
    }

    #[test]
    fn test_insufficient_stock_display() {
        let error = BazaarlyError::InsufficientStock {
            requested: 3,
            available: 1,
        };
        let s = error.to_string();
        assert!(s.contains("requested 3"));
        assert!(s.contains("available 1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: BazaarlyError = io_error.into();
        assert!(matches!(error, BazaarlyError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: BazaarlyError = json_error.into();
        assert!(matches!(error, BazaarlyError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_str = "invalid: : yaml";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: BazaarlyError = yaml_error.into();
        assert!(matches!(error, BazaarlyError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BazaarlyError>();
    }
}
