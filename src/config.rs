//! Command line / environment configuration

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Bulk price import/export server - zipped CSV in, zipped CSV out
#[derive(Parser, Debug, Clone)]
#[command(name = "price_bulk")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Path to the SQLite database file
    #[arg(short, long, env = "PRICE_BULK_DATABASE", default_value_t = default_db_path())]
    pub database: String,

    /// Address to bind the HTTP server to
    #[arg(long, env = "PRICE_BULK_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the HTTP server
    #[arg(short, long, env = "PRICE_BULK_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Largest accepted upload, in MiB
    #[arg(long, env = "PRICE_BULK_MAX_BODY_MB", default_value_t = 32)]
    pub max_body_mb: usize,

    /// Largest accepted CSV member after decompression, in MiB
    #[arg(long, env = "PRICE_BULK_MAX_CSV_MB", default_value_t = 256)]
    pub max_csv_mb: u64,
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }

    pub fn max_csv_bytes(&self) -> u64 {
        self.max_csv_mb.saturating_mul(1024 * 1024)
    }

    /// Socket address to listen on
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}

/// Returns the default database path: ~/.local/share/price_bulk/prices.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price_bulk")
        .join("prices.db")
        .to_string_lossy()
        .to_string()
}
