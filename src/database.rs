//! Database operations for price records
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Every upload is written in a single transaction: either the whole batch
//! lands or nothing does.

use crate::error::Result;
use crate::models::{round_cents, PriceRecord, StoreSummary, UploadStats, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Transaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result type for raw database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates the `prices` table if it doesn't exist. `id` is a surrogate key
/// that is never exposed; it defines the export order.
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (name <> ''),
            category TEXT NOT NULL CHECK (category <> ''),
            price REAL NOT NULL CHECK (price >= 0),
            create_date TEXT NOT NULL,
            inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_prices_category ON prices(category);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Handle on the price table, shared between request handlers
#[derive(Clone)]
pub struct PriceStore {
    db: Arc<Mutex<Connection>>,
}

impl PriceStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic in another request cannot leave a transaction open: the
        // rusqlite Transaction rolls back when dropped during unwinding.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a validated batch in one transaction.
    ///
    /// The returned stats describe this batch only. On any error, including
    /// while computing stats, the transaction is rolled back and no row of
    /// the batch remains.
    pub fn insert_batch(&self, records: &[PriceRecord]) -> Result<UploadStats> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        match insert_batch_tx(&tx, records) {
            Ok(stats) => {
                tx.commit()?;
                Ok(stats)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!("Rollback failed: {}", rollback_err);
                }
                Err(e.into())
            }
        }
    }

    /// All stored records in insertion order
    pub fn fetch_all(&self) -> Result<Vec<PriceRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, category, price, create_date
             FROM prices
             ORDER BY id",
        )?;

        let records: DbResult<Vec<PriceRecord>> = stmt
            .query_map([], |row| {
                let date: String = row.get(3)?;
                Ok(PriceRecord {
                    name: row.get(0)?,
                    category: row.get(1)?,
                    price: row.get(2)?,
                    created_date: parse_stored_date(&date)?,
                })
            })?
            .collect();
        Ok(records?)
    }

    /// Store-wide totals
    pub fn summary(&self) -> Result<StoreSummary> {
        let conn = self.conn();
        let summary = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT category), COALESCE(SUM(price), 0)
             FROM prices",
            [],
            |row| {
                let total_price: f64 = row.get(2)?;
                Ok(StoreSummary {
                    total_items: row.get(0)?,
                    total_categories: row.get(1)?,
                    total_price: round_cents(total_price),
                })
            },
        )?;
        Ok(summary)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Cheap liveness check
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn insert_batch_tx(tx: &Transaction<'_>, records: &[PriceRecord]) -> DbResult<UploadStats> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO prices (name, category, price, create_date)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    let mut categories = HashSet::new();
    let mut total_price = 0.0;

    for record in records {
        stmt.execute(params![
            &record.name,
            &record.category,
            record.price,
            record.date_text(),
        ])?;
        categories.insert(record.category.as_str());
        total_price += record.price;
    }

    log::info!(
        "Inserted {} price records ({} categories)",
        records.len(),
        categories.len()
    );

    Ok(UploadStats {
        total_items: records.len() as u64,
        total_categories: categories.len() as u64,
        total_price: round_cents(total_price),
    })
}

fn parse_stored_date(text: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))
}
