//! Price Bulk - zipped CSV price list import/export
//!
//! Accepts a zip archive holding one CSV of price records, validates every
//! row, stores the batch in SQLite in one transaction and reports what was
//! imported. The whole table can be downloaded again as a zip.

pub mod archive;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod records;
pub mod service;
pub mod web;

pub use config::Config;
pub use database::{init_schema, PriceStore};
pub use error::{Error, ErrorClass, PriceError, Result};
pub use models::{PriceRecord, StoreSummary, UploadStats};
pub use service::{Export, PriceService};
