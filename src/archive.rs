//! ZIP container handling for uploads and exports
//!
//! Uploads are read straight from the request bytes: member names are listed
//! up front, member contents are decompressed lazily when opened.

use crate::error::{PriceError, Result};
use std::io::{self, Cursor, Read, Take, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Suffix identifying the tabular member of an upload
pub const TABULAR_EXTENSION: &str = ".csv";

/// Member name used for exported archives
pub const EXPORT_MEMBER_NAME: &str = "data.csv";

/// An uploaded archive borrowed from the request body
pub struct Archive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
}

impl<'a> Archive<'a> {
    /// Read the central directory of `bytes`
    pub fn unpack(bytes: &'a [u8]) -> Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(PriceError::ArchiveFormat)?;

        let mut names = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip.by_index_raw(i).map_err(PriceError::ArchiveFormat)?;
            names.push(entry.name().to_string());
        }

        log::debug!("Archive contains {} member(s): {:?}", names.len(), names);
        Ok(Self { zip, names })
    }

    /// Member names in archive listing order
    pub fn member_names(&self) -> &[String] {
        &self.names
    }

    /// First member (in listing order) whose name ends with `.csv`.
    ///
    /// If an archive holds several CSV files the first one listed wins. Tools
    /// that reorder entries when zipping can change which one that is.
    pub fn find_tabular_member(&self) -> Result<&str> {
        let index = self.tabular_index()?;
        Ok(&self.names[index])
    }

    fn tabular_index(&self) -> Result<usize> {
        self.names
            .iter()
            .position(|name| name.ends_with(TABULAR_EXTENSION))
            .ok_or_else(|| PriceError::MemberNotFound {
                available: self.names.clone(),
            })
    }

    /// Open a decompressing reader over one member. Single pass only.
    pub fn open(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        let member = self.zip.by_name(name).map_err(PriceError::ArchiveFormat)?;
        Ok(Box::new(member))
    }

    /// Locate the tabular member and open it.
    ///
    /// The member is opened by its listing index, so the entry read is the
    /// one [`find_tabular_member`](Self::find_tabular_member) reports. Reading
    /// fails with [`PriceError::MemberTooLarge`] once more than `max_bytes`
    /// have been decompressed.
    pub fn open_tabular(&mut self, max_bytes: u64) -> Result<(String, Box<dyn Read + '_>)> {
        let index = self.tabular_index()?;
        let name = self.names[index].clone();

        let member = self.zip.by_index(index).map_err(PriceError::ArchiveFormat)?;
        if member.size() > max_bytes {
            return Err(PriceError::MemberTooLarge { limit: max_bytes });
        }

        Ok((name, Box::new(SizeCapped::new(member, max_bytes))))
    }
}

/// Reader that errors once more than `limit` bytes have come through.
///
/// The declared size of a zip member cannot be trusted, so the cap is also
/// enforced on the decompressed stream itself.
struct SizeCapped<R> {
    inner: Take<R>,
    limit: u64,
    seen: u64,
}

impl<R: Read> SizeCapped<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner: inner.take(limit.saturating_add(1)),
            limit,
            seen: 0,
        }
    }
}

impl<R: Read> Read for SizeCapped<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen += n as u64;
        if self.seen > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                PriceError::MemberTooLarge { limit: self.limit },
            ));
        }
        Ok(n)
    }
}

/// Build a single-member archive.
///
/// Timestamp and permissions are fixed, so identical input always yields
/// identical bytes.
pub fn pack(name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, options)
        .map_err(PriceError::ArchiveWrite)?;
    writer.write_all(bytes)?;
    let cursor = writer.finish().map_err(PriceError::ArchiveWrite)?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
pub use tests::make_test_zip;
