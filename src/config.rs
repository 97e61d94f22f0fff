//! Configuration management for Bazaarly
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{BazaarlyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Bazaarly
///
/// This structure holds all configuration needed for the assistant,
/// including session persistence, catalog storage, collaborator mode,
/// and pricing behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Catalog database configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Collaborator (extraction, pricing, writing) configuration
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// Pricing behavior configuration
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path to the sled session database (defaults to the platform data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Minutes of inactivity after which a session expires
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Maximum messages retained in a session's history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_expiry_minutes() -> i64 {
    30
}

fn default_max_history() -> usize {
    200
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            expiry_minutes: default_expiry_minutes(),
            max_history: default_max_history(),
        }
    }
}

/// Catalog database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the sqlite catalog database (defaults to the platform data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Maximum results returned by similarity and text search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Minimum Jaro-Winkler similarity for a listing to count as similar
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_search_limit() -> usize {
    5
}

fn default_similarity_threshold() -> f64 {
    0.78
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            search_limit: default_search_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Collaborator configuration
///
/// Selects between LLM-backed collaborators and fully offline heuristic
/// implementations, and carries the endpoint settings for the former.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Collaborator mode: "llm" or "offline"
    #[serde(default = "default_collaborator_mode")]
    pub mode: String,

    /// Base URL of an OpenAI-compatible chat completions endpoint
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model name sent with chat completion requests
    #[serde(default = "default_model")]
    pub model: String,

    /// API key, if the endpoint requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_collaborator_mode() -> String {
    "offline".to_string()
}

fn default_api_base() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            mode: default_collaborator_mode(),
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Pricing behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fallback price used when no market data is available
    #[serde(default = "default_fallback_price")]
    pub fallback_price: f64,

    /// Commission rate applied to completed orders
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,

    /// Spread around the recommended price for the min/max band
    #[serde(default = "default_price_band")]
    pub price_band: f64,
}

fn default_fallback_price() -> f64 {
    1000.0
}

fn default_commission_rate() -> f64 {
    0.025
}

fn default_price_band() -> f64 {
    0.15
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fallback_price: default_fallback_price(),
            commission_rate: default_commission_rate(),
            price_band: default_price_band(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if
    /// validation fails
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BazaarlyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BazaarlyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(mode) = std::env::var("BAZAARLY_COLLABORATOR_MODE") {
            self.collaborators.mode = mode;
        }

        if let Ok(api_base) = std::env::var("BAZAARLY_API_BASE") {
            self.collaborators.api_base = api_base;
        }

        if let Ok(model) = std::env::var("BAZAARLY_MODEL") {
            self.collaborators.model = model;
        }

        if let Ok(api_key) = std::env::var("BAZAARLY_API_KEY") {
            self.collaborators.api_key = Some(api_key);
        }

        if let Ok(path) = std::env::var("BAZAARLY_SESSION_DB") {
            self.session.db_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("BAZAARLY_CATALOG_DB") {
            self.catalog.db_path = Some(PathBuf::from(path));
        }

        if let Ok(minutes) = std::env::var("BAZAARLY_SESSION_EXPIRY_MINUTES") {
            if let Ok(value) = minutes.parse() {
                self.session.expiry_minutes = value;
            } else {
                tracing::warn!("Invalid BAZAARLY_SESSION_EXPIRY_MINUTES: {}", minutes);
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any setting is out of range or inconsistent
    pub fn validate(&self) -> Result<()> {
        match self.collaborators.mode.as_str() {
            "llm" | "offline" => {}
            other => {
                return Err(BazaarlyError::Config(format!(
                    "Unknown collaborator mode: {} (expected 'llm' or 'offline')",
                    other
                ))
                .into());
            }
        }

        if self.session.expiry_minutes <= 0 {
            return Err(
                BazaarlyError::Config("session.expiry_minutes must be positive".to_string())
                    .into(),
            );
        }

        if !(0.0..1.0).contains(&self.pricing.commission_rate) {
            return Err(BazaarlyError::Config(format!(
                "pricing.commission_rate must be in [0, 1): {}",
                self.pricing.commission_rate
            ))
            .into());
        }

        if !(0.0..1.0).contains(&self.pricing.price_band) {
            return Err(BazaarlyError::Config(format!(
                "pricing.price_band must be in [0, 1): {}",
                self.pricing.price_band
            ))
            .into());
        }

        if self.pricing.fallback_price <= 0.0 {
            return Err(
                BazaarlyError::Config("pricing.fallback_price must be positive".to_string())
                    .into(),
            );
        }

        if !(0.0..=1.0).contains(&self.catalog.similarity_threshold) {
            return Err(BazaarlyError::Config(format!(
                "catalog.similarity_threshold must be in [0, 1]: {}",
                self.catalog.similarity_threshold
            ))
            .into());
        }

        Ok(())
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn save(&self, path: &str) -> Result<()> {
        let contents = serde_yaml::to_string(self)?;
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BazaarlyError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }
        std::fs::write(path, contents)
            .map_err(|e| BazaarlyError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Resolve the session database path, falling back to the platform data dir
    pub fn session_db_path(&self) -> PathBuf {
        self.session
            .db_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("sessions.sled"))
    }

    /// Resolve the catalog database path, falling back to the platform data dir
    pub fn catalog_db_path(&self) -> PathBuf {
        self.catalog
            .db_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("catalog.db"))
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "bazaarly", "bazaarly")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".bazaarly"))
}
