//! Tabular import and export for the cache index
//!
//! Export writes one CSV row per index entry. Import reads a prior run's
//! results table and yields the rows worth seeding the cache with.

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::index::format_timestamp;
use crate::cache::CacheEntry;
use std::path::Path;

const MANIFEST_HEADER: [&str; 10] = [
    "url",
    "cache_key",
    "file_path",
    "content_size",
    "scrape_method",
    "status_code",
    "created_at",
    "last_accessed",
    "access_count",
    "origin_flag",
];

/// Writes the given index entries to a CSV file at `path`
pub fn write_manifest(entries: &[CacheEntry], path: &Path) -> CacheResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(MANIFEST_HEADER)?;

    for entry in entries {
        writer.write_record([
            entry.url.clone(),
            entry.cache_key.clone(),
            entry.file_path.to_string_lossy().into_owned(),
            entry.content_size.to_string(),
            entry.scrape_method.clone(),
            entry
                .status_code
                .map(|code| code.to_string())
                .unwrap_or_default(),
            format_timestamp(&entry.created_at),
            format_timestamp(&entry.last_accessed),
            entry.access_count.to_string(),
            entry.origin.to_db_string().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// A successful row from a prior results table
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRow {
    pub url: String,
    pub content: String,
    pub scrape_method: Option<String>,
    pub status_code: Option<u16>,
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.trim().eq_ignore_ascii_case(name)))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "1.0" | "yes"
    )
}

/// Status codes may have been written as floats ("200.0") by the producer
fn parse_status(value: &str) -> Option<u16> {
    let value = value.trim();
    value
        .parse::<u16>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f as u16))
        .filter(|code| *code > 0)
}

/// Reads rows flagged successful with non-empty content
///
/// Required columns: `url` (or `product_url`), `success`, and `content` (or
/// `html_content`). `final_method`/`scrape_method` and `status_code` are
/// picked up when present.
pub fn read_seed_rows(path: &Path) -> CacheResult<Vec<SeedRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let url_col = find_column(&headers, &["url", "product_url"])
        .ok_or_else(|| CacheError::MissingColumn("url".to_string()))?;
    let success_col = find_column(&headers, &["success"])
        .ok_or_else(|| CacheError::MissingColumn("success".to_string()))?;
    let content_col = find_column(&headers, &["content", "html_content"])
        .ok_or_else(|| CacheError::MissingColumn("content".to_string()))?;
    let method_col = find_column(&headers, &["final_method", "scrape_method"]);
    let status_col = find_column(&headers, &["status_code"]);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;

        let success = record.get(success_col).map(is_truthy).unwrap_or(false);
        let url = record.get(url_col).unwrap_or("").trim();
        let content = record.get(content_col).unwrap_or("");

        if !success || url.is_empty() || content.trim().is_empty() {
            continue;
        }

        rows.push(SeedRow {
            url: url.to_string(),
            content: content.to_string(),
            scrape_method: method_col
                .and_then(|col| record.get(col))
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            status_code: status_col
                .and_then(|col| record.get(col))
                .and_then(parse_status),
        });
    }

    Ok(rows)
}
