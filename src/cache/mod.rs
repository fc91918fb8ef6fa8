//! Three-layer page cache keyed by URL
//!
//! This module keeps fetched HTML so repeated runs never pay for the same URL
//! twice. The layers share one keyspace:
//! - an in-memory map (process lifetime, rebuilt on demand)
//! - a SQLite index mapping url -> [`CacheEntry`] (source of truth)
//! - one content file per URL, named by the SHA-256 hex digest of the URL
//!
//! Re-caching a URL overwrites its entry; there is never more than one entry
//! per URL.

mod error;
mod index;
mod manifest;
mod schema;
mod store;

pub use error::{CacheError, CacheResult};
pub use index::CacheIndex;
pub use manifest::{read_seed_rows, write_manifest, SeedRow};
pub use store::{cache_key, CacheStats, CacheStore, PutMetadata, INDEX_FILE_NAME};

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Where a cache entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginFlag {
    /// Seeded from a prior run's results table
    Imported,
    /// Stored after a fresh scrape
    Scraped,
}

impl OriginFlag {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Scraped => "scraped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "imported" => Some(Self::Imported),
            "scraped" => Some(Self::Scraped),
            _ => None,
        }
    }
}

/// Index record for one cached URL
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub url: String,
    pub cache_key: String,
    pub file_path: PathBuf,
    pub content_size: u64,
    pub scrape_method: String,
    pub status_code: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub origin: OriginFlag,
}
