//! CSV parsing and rendering for price records.
//!
//! Rows use the column order `name,category,price,create_date`. The reader is
//! a single-pass iterator over any [`Read`]; [`parse_all`] drains it eagerly
//! so that a malformed row late in the file is found before anything touches
//! the database.
//!
//! # Header detection
//!
//! Uploads may or may not start with a header row. There is no flag for it:
//! the first non-empty row is treated as a header when its first column,
//! lowercased, is `name` or contains `id`. A data row whose product name
//! happens to contain "id" (e.g. "Widget") is therefore skipped if, and only
//! if, it is the very first row of the file.

use crate::error::{PriceError, Result};
use crate::models::{PriceRecord, CSV_COLUMNS, DATE_FORMAT};
use chrono::NaiveDate;
use csv::{StringRecord, StringRecordsIntoIter};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::{self, Read};
use zip::result::ZipError;

/// Lazy reader turning CSV rows into validated records.
///
/// Line numbers in errors are 1-based lines of the raw stream, blank lines
/// included. A row spanning several lines (quoted line breaks) reports its
/// first line. Stops after the first error.
pub struct PriceRecordReader<R: Read> {
    rows: StringRecordsIntoIter<LineTracker<R>>,
    seen_row: bool,
    finished: bool,
}

impl<R: Read> PriceRecordReader<R> {
    pub fn new(reader: R) -> Self {
        let rows = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(LineTracker::new(reader))
            .into_records();

        Self {
            rows,
            seen_row: false,
            finished: false,
        }
    }

    /// Line holding the last byte the parser consumed
    fn end_line(&mut self) -> u64 {
        let consumed = self.rows.reader().position().byte();
        self.rows
            .reader_mut()
            .get_mut()
            .line_of(consumed.saturating_sub(1))
    }

    /// First line of a row just read
    fn start_line(&mut self, row: &StringRecord) -> u64 {
        let embedded: u64 = row.iter().map(count_line_breaks).sum();
        self.end_line().saturating_sub(embedded)
    }
}

impl<R: Read> Iterator for PriceRecordReader<R> {
    type Item = Result<PriceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => {
                    self.finished = true;
                    let line = self.end_line();
                    return Some(Err(read_error(e, line)));
                }
            };

            if is_blank(&row) {
                continue;
            }

            let line = self.start_line(&row);
            if !self.seen_row {
                self.seen_row = true;
                if looks_like_header(&row) {
                    debug!("Skipping header row at line {}: {:?}", line, row);
                    continue;
                }
            }

            let result = parse_row(&row, line);
            if let Err(e) = &result {
                warn!("Rejecting CSV: {}", e);
                self.finished = true;
            }
            return Some(result);
        }
    }
}

/// Input wrapper recording the byte offsets of line breaks.
///
/// The CSV parser drops blank lines without reporting them, so the position
/// it stamps on a row can point at a blank line above the row. Mapping the
/// offset where the row ended back through these breaks gives its raw line.
/// Breaks behind the parse point collapse into a counter, so memory stays
/// bounded by the parser's read-ahead.
struct LineTracker<R> {
    inner: R,
    offset: u64,
    after_cr: bool,
    pending: VecDeque<u64>,
    passed: u64,
}

impl<R> LineTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            after_cr: false,
            pending: VecDeque::new(),
            passed: 0,
        }
    }

    /// 1-based line holding the byte at `offset`. Offsets must not decrease.
    fn line_of(&mut self, offset: u64) -> u64 {
        while self.pending.front().is_some_and(|&brk| brk < offset) {
            self.pending.pop_front();
            self.passed += 1;
        }
        self.passed + 1
    }
}

impl<R: Read> Read for LineTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (i, &byte) in buf[..n].iter().enumerate() {
            // CRLF counts once, at the CR
            if byte == b'\r' || (byte == b'\n' && !self.after_cr) {
                self.pending.push_back(self.offset + i as u64);
            }
            self.after_cr = byte == b'\r';
        }
        self.offset += n as u64;
        Ok(n)
    }
}

/// Line breaks inside a quoted field, CRLF counted once
fn count_line_breaks(field: &str) -> u64 {
    let bytes = field.as_bytes();
    let mut count = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        let crlf_tail = byte == b'\n' && i > 0 && bytes[i - 1] == b'\r';
        if (byte == b'\r' || byte == b'\n') && !crlf_tail {
            count += 1;
        }
    }
    count
}

/// Parse every row of a CSV stream, failing on the first malformed one
pub fn parse_all<R: Read>(reader: R) -> Result<Vec<PriceRecord>> {
    let records = PriceRecordReader::new(reader).collect::<Result<Vec<_>>>()?;
    info!("Parsed {} price records", records.len());
    Ok(records)
}

/// Render records as CSV, header first
pub fn render_all(records: &[PriceRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_COLUMNS).map_err(std::io::Error::from)?;
    for record in records {
        let price = record.price_text();
        let date = record.date_text();
        writer
            .write_record([
                record.name.as_str(),
                record.category.as_str(),
                price.as_str(),
                date.as_str(),
            ])
            .map_err(std::io::Error::from)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    debug!("Rendered {} records ({} bytes)", records.len(), bytes.len());
    Ok(bytes)
}

fn is_blank(row: &StringRecord) -> bool {
    row.is_empty() || (row.len() == 1 && row[0].trim().is_empty())
}

fn looks_like_header(row: &StringRecord) -> bool {
    let first = row[0].to_lowercase();
    first == "name" || first.contains("id")
}

fn parse_row(row: &StringRecord, line: u64) -> Result<PriceRecord> {
    if row.len() != CSV_COLUMNS.len() {
        return Err(PriceError::csv(
            line,
            format!(
                "expected {} fields, got {}",
                CSV_COLUMNS.len(),
                row.len()
            ),
        ));
    }

    Ok(PriceRecord {
        name: parse_text(&row[0], "name", line)?,
        category: parse_text(&row[1], "category", line)?,
        price: parse_price(&row[2], line)?,
        created_date: parse_date(&row[3], line)?,
    })
}

/// Required text column; must not be empty
pub fn parse_text(raw: &str, column: &str, line: u64) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(PriceError::csv(line, format!("empty {}", column)));
    }
    Ok(raw.to_string())
}

/// Base-10 price, finite and not negative
pub fn parse_price(raw: &str, line: u64) -> Result<f64> {
    match raw.parse::<f64>() {
        // -0 would otherwise export as "-0.00"
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price + 0.0),
        Ok(_) => Err(PriceError::csv(line, format!("price out of range: {}", raw))),
        Err(_) => Err(PriceError::csv(line, format!("invalid price format: {}", raw))),
    }
}

/// Calendar date in `YYYY-MM-DD`
pub fn parse_date(raw: &str, line: u64) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| PriceError::csv(line, format!("invalid date format: {}", raw)))
}

fn read_error(err: csv::Error, line: u64) -> PriceError {
    let detail = err.to_string();
    match err.into_kind() {
        // Decompression failures surface as I/O errors from the member reader
        csv::ErrorKind::Io(io) => {
            let too_large = io
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<PriceError>())
                .and_then(|inner| match inner {
                    PriceError::MemberTooLarge { limit } => Some(*limit),
                    _ => None,
                });
            match too_large {
                Some(limit) => PriceError::MemberTooLarge { limit },
                None => PriceError::ArchiveFormat(ZipError::Io(io)),
            }
        }
        _ => PriceError::csv(line, detail),
    }
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
