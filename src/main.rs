//! Price Bulk - zipped CSV price list import/export server
//!
//! Opens (or creates) the SQLite database and serves the HTTP API until
//! interrupted.

use clap::Parser;
use price_bulk::{init_schema, Config, PriceService, PriceStore};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let db_path = config.database_path();

    log::info!("Starting price_bulk...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    // Open database connection
    let conn = match Connection::open(&db_path) {
        Ok(conn) => {
            log::info!("Opened database: {}", db_path.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database schema
    if let Err(e) = init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    // One connection, shared by all requests; each transaction holds the lock
    let store = PriceStore::new(Arc::new(Mutex::new(conn)));
    let service = PriceService::new(store).with_max_csv_bytes(config.max_csv_bytes());

    if let Err(e) = price_bulk::web::serve(service, &config).await {
        log::error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
