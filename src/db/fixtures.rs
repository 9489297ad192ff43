//! Listing builders shared by the database-backed tests.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::db::writer;
use crate::types::{now_ns, Listing, PropertyType, Snapshot};

pub fn listing(id: &str, town: &str, property_type: PropertyType, price: f64, dom: i64) -> Listing {
    Listing {
        id: id.to_string(),
        property_type: Some(property_type),
        status: "Active".to_string(),
        list_price: Some(price),
        town: Some(town.to_string()),
        sqft: None,
        dom: Some(dom),
        updated_at_ns: now_ns(),
    }
}

pub async fn insert_all(pool: &SqlitePool, listings: &[Listing]) {
    for l in listings {
        writer::upsert_listing(pool, l).await.expect("insert listing");
    }
}

pub async fn snapshot(pool: &SqlitePool, listing_id: &str, date: NaiveDate, price: f64) {
    writer::record_snapshot(
        pool,
        &Snapshot {
            listing_id: listing_id.to_string(),
            snapshot_date: date,
            list_price: Some(price),
            status: Some("Active".to_string()),
            dom: None,
        },
    )
    .await
    .expect("insert snapshot");
}
