//! Domain types shared by the parser, the store and the web layer

use chrono::NaiveDate;
use serde::Serialize;

/// Fixed calendar date format for the `create_date` column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column order of the tabular file, also written as the export header
pub const CSV_COLUMNS: [&str; 4] = ["name", "category", "price", "create_date"];

/// One priced catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub created_date: NaiveDate,
}

impl PriceRecord {
    /// Price as written to CSV (always two decimals)
    pub fn price_text(&self) -> String {
        format!("{:.2}", self.price)
    }

    /// Date as written to CSV and stored in the database
    pub fn date_text(&self) -> String {
        self.created_date.format(DATE_FORMAT).to_string()
    }
}

/// Summary returned after an ingest.
///
/// All three figures cover only the batch inserted by that request, not the
/// whole store. Concurrent uploads therefore never see each other's rows in
/// their own stats. Use [`StoreSummary`] for store-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadStats {
    pub total_items: u64,
    pub total_categories: u64,
    pub total_price: f64,
}

/// Store-wide totals computed with aggregate queries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSummary {
    pub total_items: u64,
    pub total_categories: u64,
    pub total_price: f64,
}

/// Round a money sum to cents so float noise never leaks into responses
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
