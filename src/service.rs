//! Import/export pipeline
//!
//! Ingest: zip bytes → CSV member → validated records → one transaction.
//! Every record is parsed before the database is touched, so a bad row at the
//! end of a file never leaves the first rows behind.
//!
//! Export: all rows in insertion order → CSV → single-member zip.

use crate::archive::{self, Archive, EXPORT_MEMBER_NAME};
use crate::database::PriceStore;
use crate::error::{PriceError, Result};
use crate::models::{PriceRecord, UploadStats};
use crate::records;
use log::info;

/// Media type accepted for uploads and produced by exports
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// A freshly generated export archive
#[derive(Debug)]
pub struct Export {
    /// Zip bytes, complete before the response starts
    pub bytes: Vec<u8>,
    /// Number of records in the archive
    pub records: usize,
}

impl Export {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Default cap on the decompressed CSV member, 256 MiB
pub const DEFAULT_MAX_CSV_BYTES: u64 = 256 * 1024 * 1024;

/// Orchestrates the archive codec, the CSV parser and the store
#[derive(Clone)]
pub struct PriceService {
    store: PriceStore,
    max_csv_bytes: u64,
}

impl PriceService {
    pub fn new(store: PriceStore) -> Self {
        Self {
            store,
            max_csv_bytes: DEFAULT_MAX_CSV_BYTES,
        }
    }

    /// Refuse uploads whose CSV member decompresses past `max_csv_bytes`
    pub fn with_max_csv_bytes(mut self, max_csv_bytes: u64) -> Self {
        self.max_csv_bytes = max_csv_bytes;
        self
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    /// Validate and persist an uploaded archive.
    ///
    /// Checks run cheapest first: media type, empty body, zip container,
    /// CSV member, every row. Only a fully valid file reaches the database.
    /// The stats returned cover this upload only (see [`UploadStats`]).
    pub fn handle_ingest(&self, content_type: Option<&str>, body: &[u8]) -> Result<UploadStats> {
        let content_type = content_type.unwrap_or_default();
        if !is_zip_media_type(content_type) {
            return Err(PriceError::UnsupportedContentType(content_type.to_string()));
        }

        if body.is_empty() {
            return Err(PriceError::EmptyBody);
        }

        let records = read_upload(body, self.max_csv_bytes)?;
        if records.is_empty() {
            return Err(PriceError::NoRecords);
        }

        let stats = self.store.insert_batch(&records)?;
        info!(
            "Imported {} records ({} categories, total price {:.2})",
            stats.total_items, stats.total_categories, stats.total_price
        );
        Ok(stats)
    }

    /// Build an archive with every stored record
    pub fn handle_export(&self) -> Result<Export> {
        let records = self.store.fetch_all()?;
        let csv = records::render_all(&records)?;
        let bytes = archive::pack(EXPORT_MEMBER_NAME, &csv)?;

        info!(
            "Exported {} records ({} bytes zipped)",
            records.len(),
            bytes.len()
        );
        Ok(Export {
            bytes,
            records: records.len(),
        })
    }
}

fn read_upload(body: &[u8], max_csv_bytes: u64) -> Result<Vec<PriceRecord>> {
    let mut archive = Archive::unpack(body)?;
    let (name, reader) = archive.open_tabular(max_csv_bytes)?;
    info!("Found CSV file: {}", name);
    records::parse_all(reader)
}

/// `application/zip`, ignoring case and any parameters
fn is_zip_media_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(ZIP_CONTENT_TYPE))
}
