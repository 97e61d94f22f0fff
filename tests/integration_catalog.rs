//! Integration tests for catalog orders and commission accounting

use bazaarly::catalog::CatalogStore;
use bazaarly::session::ListingDraft;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> CatalogStore {
    CatalogStore::open(dir.path().join("catalog.db"), 0.025, 0.78).expect("catalog should open")
}

fn draft(title: &str, price: f64) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        description: format!("{} for sale", title),
        summary: title.to_string(),
        price,
        category: "electronics".to_string(),
        attributes: BTreeMap::new(),
    }
}

#[test]
fn order_splits_commission_and_closes_listing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let id = store
        .insert_listing(&draft("Apple iPhone 13", 2000.0), "seller-1")
        .unwrap();
    let receipt = store.place_order(&id, "buyer-1", 1).unwrap();

    assert!((receipt.total - 2000.0).abs() < f64::EPSILON);
    assert!((receipt.commission - 50.0).abs() < f64::EPSILON);
    assert!((receipt.seller_receives - 1950.0).abs() < f64::EPSILON);

    let listings = store.my_listings("seller-1").unwrap();
    assert_eq!(listings[0].status, "sold");
    assert_eq!(listings[0].stock, 0);
}

#[test]
fn sold_listing_rejects_further_orders() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let id = store
        .insert_listing(&draft("Garden table", 300.0), "seller-1")
        .unwrap();
    store.place_order(&id, "buyer-1", 1).unwrap();
    assert!(store.place_order(&id, "buyer-2", 1).is_err());
}

#[test]
fn only_the_owner_can_modify_a_listing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let id = store
        .insert_listing(&draft("Road bike", 800.0), "seller-1")
        .unwrap();

    assert!(store.update_listing_price(&id, "someone-else", 1.0).is_err());
    assert!(store.mark_sold(&id, "someone-else").is_err());
    assert!(store.update_listing_price(&id, "seller-1", 750.0).is_ok());
}

#[test]
fn catalog_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        store
            .insert_listing(&draft("Bookshelf", 150.0), "seller-1")
            .unwrap();
    }
    let store = open_store(&dir);
    assert_eq!(store.my_listings("seller-1").unwrap().len(), 1);
}
