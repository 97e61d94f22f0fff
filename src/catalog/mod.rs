//! Marketplace catalog storage
//!
//! SQLite-backed store for published listings and buyer orders. Also
//! serves the pricing path: `find_similar` feeds internal price
//! statistics into price recommendations.

use crate::error::{BazaarlyError, Result};
use crate::session::{ListingDraft, PriceStats, ProductInfo};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A published listing row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub status: String,
    pub stock: u32,
    pub created_at: String,
}

/// Similarity search result plus the aggregate stats the pricer consumes
#[derive(Debug, Clone, Default)]
pub struct SimilarListings {
    pub items: Vec<Listing>,
    pub stats: PriceStats,
}

/// Filters for the buyer search path
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Receipt returned when an order is placed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub quantity: u32,
    pub total: f64,
    pub commission: f64,
    pub seller_receives: f64,
}

/// Catalog backend for listings and orders
pub struct CatalogStore {
    db_path: PathBuf,
    commission_rate: f64,
    similarity_threshold: f64,
}

impl CatalogStore {
    /// Open a catalog store at the given path, creating the schema
    ///
    /// # Errors
    ///
    /// Returns `BazaarlyError::Catalog` if the database cannot be opened
    /// or the schema cannot be created
    pub fn open<P: Into<PathBuf>>(
        db_path: P,
        commission_rate: f64,
        similarity_threshold: f64,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for catalog database")
                .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        }
        let store = Self {
            db_path,
            commission_rate,
            similarity_threshold,
        };
        store.init()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open catalog database")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                stock INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create listings table")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                listing_id TEXT NOT NULL,
                buyer_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                total REAL NOT NULL,
                commission REAL NOT NULL,
                seller_receives REAL NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (listing_id) REFERENCES listings(id)
            )",
            [],
        )
        .context("Failed to create orders table")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        Ok(())
    }

    /// Publish a draft as an active listing; returns the new listing id
    pub fn insert_listing(&self, draft: &ListingDraft, seller_id: &str) -> Result<String> {
        let conn = self.connect()?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO listings (id, seller_id, title, description, category, price, status, stock, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'active', 1, ?)",
            params![
                id,
                seller_id,
                draft.title,
                draft.description,
                draft.category,
                draft.price,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert listing")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        tracing::info!(listing_id = %id, seller_id = %seller_id, "Published listing");
        Ok(id)
    }

    /// Find active listings similar to a product and aggregate their prices
    ///
    /// Similarity is Jaro-Winkler between the product label and the
    /// listing title (category matches get a small boost). Rows below the
    /// configured threshold are dropped.
    pub fn find_similar(&self, product: &ProductInfo, limit: usize) -> Result<SimilarListings> {
        let conn = self.connect()?;
        let label = product.label().to_lowercase();
        let category = product
            .extra
            .get("category")
            .and_then(|v| v.as_str())
            .map(str::to_lowercase);

        let mut stmt = conn
            .prepare(
                "SELECT id, seller_id, title, description, category, price, status, stock, created_at
                 FROM listings WHERE status = 'active'",
            )
            .context("Failed to prepare similarity query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_listing)
            .context("Failed to run similarity query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        let mut scored: Vec<(f64, Listing)> = Vec::new();
        for row in rows {
            let listing = row
                .context("Failed to read listing row")
                .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
            let mut score = strsim::jaro_winkler(&label, &listing.title.to_lowercase());
            if let Some(cat) = &category {
                if cat == &listing.category.to_lowercase() {
                    score = (score + 0.1).min(1.0);
                }
            }
            if score >= self.similarity_threshold {
                scored.push((score, listing));
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let items: Vec<Listing> = scored.into_iter().map(|(_, l)| l).collect();
        let stats = price_stats(&items);
        Ok(SimilarListings { items, stats })
    }

    /// Buyer text search over active listings
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Listing>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, seller_id, title, description, category, price, status, stock, created_at
                 FROM listings WHERE status = 'active' ORDER BY created_at DESC",
            )
            .context("Failed to prepare search query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_listing)
            .context("Failed to run search query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        let needle = query.to_lowercase();
        let tokens: Vec<&str> = needle.split_whitespace().collect();
        let mut results = Vec::new();
        for row in rows {
            let listing = row
                .context("Failed to read listing row")
                .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
            if let Some(min) = filters.min_price {
                if listing.price < min {
                    continue;
                }
            }
            if let Some(max) = filters.max_price {
                if listing.price > max {
                    continue;
                }
            }
            if let Some(category) = &filters.category {
                if !listing.category.eq_ignore_ascii_case(category) {
                    continue;
                }
            }
            let haystack = format!(
                "{} {} {}",
                listing.title.to_lowercase(),
                listing.description.to_lowercase(),
                listing.category.to_lowercase()
            );
            let matches = tokens.is_empty() || tokens.iter().any(|t| haystack.contains(t));
            if matches {
                results.push(listing);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// All listings belonging to a seller, newest first
    pub fn my_listings(&self, seller_id: &str) -> Result<Vec<Listing>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, seller_id, title, description, category, price, status, stock, created_at
                 FROM listings WHERE seller_id = ? ORDER BY created_at DESC",
            )
            .context("Failed to prepare listings query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        let rows = stmt
            .query_map(params![seller_id], row_to_listing)
            .context("Failed to run listings query")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        let mut listings = Vec::new();
        for row in rows {
            listings.push(
                row.context("Failed to read listing row")
                    .map_err(|e| BazaarlyError::Catalog(e.to_string()))?,
            );
        }
        Ok(listings)
    }

    /// Change the price of a listing the caller owns
    pub fn update_listing_price(
        &self,
        listing_id: &str,
        seller_id: &str,
        new_price: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        self.assert_owner(&conn, listing_id, seller_id)?;
        conn.execute(
            "UPDATE listings SET price = ? WHERE id = ?",
            params![new_price, listing_id],
        )
        .context("Failed to update price")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        Ok(())
    }

    /// Mark a listing the caller owns as sold
    pub fn mark_sold(&self, listing_id: &str, seller_id: &str) -> Result<()> {
        let conn = self.connect()?;
        self.assert_owner(&conn, listing_id, seller_id)?;
        conn.execute(
            "UPDATE listings SET status = 'sold', stock = 0 WHERE id = ?",
            params![listing_id],
        )
        .context("Failed to mark listing sold")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        Ok(())
    }

    /// Place an order against an active listing
    ///
    /// Validates stock, computes the commission split, decrements stock,
    /// and marks the listing sold when stock hits zero. The whole
    /// operation runs in one transaction.
    pub fn place_order(
        &self,
        listing_id: &str,
        buyer_id: &str,
        quantity: u32,
    ) -> Result<OrderReceipt> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        let listing = tx
            .query_row(
                "SELECT id, seller_id, title, description, category, price, status, stock, created_at
                 FROM listings WHERE id = ?",
                params![listing_id],
                row_to_listing,
            )
            .optional()
            .context("Failed to load listing")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?
            .ok_or_else(|| BazaarlyError::Catalog(format!("No such listing: {}", listing_id)))?;

        if listing.status != "active" {
            return Err(
                BazaarlyError::Catalog(format!("Listing {} is not active", listing_id)).into(),
            );
        }
        if quantity == 0 || quantity > listing.stock {
            return Err(BazaarlyError::InsufficientStock {
                requested: quantity,
                available: listing.stock,
            }
            .into());
        }

        let total = listing.price * quantity as f64;
        let commission = total * self.commission_rate;
        let seller_receives = total - commission;
        let remaining = listing.stock - quantity;
        let status = if remaining == 0 { "sold" } else { "active" };

        tx.execute(
            "UPDATE listings SET stock = ?, status = ? WHERE id = ?",
            params![remaining, status, listing_id],
        )
        .context("Failed to decrement stock")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        let order_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO orders (id, listing_id, buyer_id, quantity, total, commission, seller_receives, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                order_id,
                listing_id,
                buyer_id,
                quantity,
                total,
                commission,
                seller_receives,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert order")
        .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        tx.commit()
            .context("Failed to commit order")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;

        tracing::info!(order_id = %order_id, listing_id = %listing_id, total, "Order placed");
        Ok(OrderReceipt {
            order_id,
            listing_id: listing_id.to_string(),
            buyer_id: buyer_id.to_string(),
            quantity,
            total,
            commission,
            seller_receives,
        })
    }

    fn assert_owner(&self, conn: &Connection, listing_id: &str, seller_id: &str) -> Result<()> {
        let owner: Option<String> = conn
            .query_row(
                "SELECT seller_id FROM listings WHERE id = ?",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check ownership")
            .map_err(|e| BazaarlyError::Catalog(e.to_string()))?;
        match owner {
            Some(owner) if owner == seller_id => Ok(()),
            Some(_) => Err(BazaarlyError::NotOwner {
                listing_id: listing_id.to_string(),
                user_id: seller_id.to_string(),
            }
            .into()),
            None => {
                Err(BazaarlyError::Catalog(format!("No such listing: {}", listing_id)).into())
            }
        }
    }
}

fn row_to_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        seller_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        status: row.get(6)?,
        stock: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn price_stats(items: &[Listing]) -> PriceStats {
    if items.is_empty() {
        return PriceStats::default();
    }
    let prices: Vec<f64> = items.iter().map(|l| l.price).collect();
    let sum: f64 = prices.iter().sum();
    let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    PriceStats {
        similar_count: items.len(),
        avg_price: Some(sum / prices.len() as f64),
        min_price: Some(min),
        max_price: Some(max),
    }
}
