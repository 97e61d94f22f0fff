//! Listing table view
//!
//! Prints a seller's published listings as a table, the way the other
//! read-only commands render their data.

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::error::Result;
use prettytable::{row, Table};

/// Print the listings belonging to a seller
///
/// # Errors
///
/// Returns error if the catalog cannot be opened or queried
pub fn run_listings(config: Config, user: String) -> Result<()> {
    let catalog = CatalogStore::open(
        config.catalog_db_path(),
        config.pricing.commission_rate,
        config.catalog.similarity_threshold,
    )?;
    let listings = catalog.my_listings(&user)?;

    if listings.is_empty() {
        println!("No listings for {}.", user);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["ID", "TITLE", "CATEGORY", "PRICE (TL)", "STATUS", "STOCK"]);
    for listing in listings {
        table.add_row(row![
            &listing.id[..8.min(listing.id.len())],
            listing.title,
            listing.category,
            format!("{:.0}", listing.price),
            listing.status,
            listing.stock
        ]);
    }
    table.printstd();
    Ok(())
}
