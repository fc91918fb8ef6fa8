//! SQLite-backed cache index
//!
//! This module provides the durable url -> [`CacheEntry`] store. It holds no
//! content, only metadata and the path of each content file.

use crate::cache::error::CacheResult;
use crate::cache::schema::initialize_schema;
use crate::cache::{CacheEntry, OriginFlag};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const ENTRY_COLUMNS: &str = "url, cache_key, file_path, content_size, scrape_method, status_code,
     created_at, last_accessed, access_count, origin_flag";

/// URLs bound per `IN (...)` lookup; keeps well under SQLite's variable limit
pub const LOOKUP_CHUNK: usize = 500;

/// Fixed-width UTC timestamps, so string order matches time order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row) -> rusqlite::Result<CacheEntry> {
    let file_path: String = row.get(2)?;
    let content_size: i64 = row.get(3)?;
    let status_code: Option<i64> = row.get(5)?;
    let access_count: i64 = row.get(8)?;
    let origin: String = row.get(9)?;

    Ok(CacheEntry {
        url: row.get(0)?,
        cache_key: row.get(1)?,
        file_path: PathBuf::from(file_path),
        content_size: content_size.max(0) as u64,
        scrape_method: row.get(4)?,
        status_code: status_code.and_then(|code| u16::try_from(code).ok()),
        created_at: parse_timestamp(row, 6)?,
        last_accessed: parse_timestamp(row, 7)?,
        access_count: access_count.max(0) as u64,
        origin: OriginFlag::from_db_string(&origin).unwrap_or(OriginFlag::Scraped),
    })
}

/// Durable cache metadata store
pub struct CacheIndex {
    conn: Connection,
}

impl CacheIndex {
    /// Opens (or creates) the index database at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory index (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Looks up the entry for a URL
    pub fn get(&self, url: &str) -> CacheResult<Option<CacheEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cache_entries WHERE url = ?1", ENTRY_COLUMNS),
                params![url],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Looks up entries for many URLs, one query per [`LOOKUP_CHUNK`] URLs
    ///
    /// URLs without an entry are simply absent from the result.
    pub fn get_many(&self, urls: &[&str]) -> CacheResult<Vec<CacheEntry>> {
        let mut entries = Vec::new();

        for chunk in urls.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {} FROM cache_entries WHERE url IN ({})",
                ENTRY_COLUMNS, placeholders
            ))?;

            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            entries.extend(rows);
        }

        Ok(entries)
    }

    pub fn contains(&self, url: &str) -> CacheResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Inserts an entry, replacing any existing entry for the same URL
    pub fn upsert(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.conn.execute(
            "INSERT INTO cache_entries (url, cache_key, file_path, content_size, scrape_method,
             status_code, created_at, last_accessed, access_count, origin_flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(url) DO UPDATE SET
                cache_key = excluded.cache_key,
                file_path = excluded.file_path,
                content_size = excluded.content_size,
                scrape_method = excluded.scrape_method,
                status_code = excluded.status_code,
                created_at = excluded.created_at,
                last_accessed = excluded.last_accessed,
                access_count = excluded.access_count,
                origin_flag = excluded.origin_flag",
            params![
                entry.url,
                entry.cache_key,
                entry.file_path.to_string_lossy(),
                entry.content_size as i64,
                entry.scrape_method,
                entry.status_code,
                format_timestamp(&entry.created_at),
                format_timestamp(&entry.last_accessed),
                entry.access_count as i64,
                entry.origin.to_db_string(),
            ],
        )?;
        Ok(())
    }

    /// Records a read of each URL
    pub fn record_access(&mut self, urls: &[&str], at: DateTime<Utc>) -> CacheResult<()> {
        if urls.is_empty() {
            return Ok(());
        }

        let at = format_timestamp(&at);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE cache_entries SET last_accessed = ?1, access_count = access_count + 1
                 WHERE url = ?2",
            )?;
            for url in urls {
                stmt.execute(params![at, url])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Deletes entries created before `cutoff`, returning what was removed
    pub fn remove_older_than(&mut self, cutoff: DateTime<Utc>) -> CacheResult<Vec<CacheEntry>> {
        let cutoff = format_timestamp(&cutoff);
        let tx = self.conn.transaction()?;

        let removed = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM cache_entries WHERE created_at < ?1",
                ENTRY_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![cutoff], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        tx.execute(
            "DELETE FROM cache_entries WHERE created_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        Ok(removed)
    }

    /// Returns every entry, newest first
    pub fn all_entries(&self) -> CacheResult<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cache_entries ORDER BY created_at DESC",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // ===== Statistics =====

    pub fn count(&self) -> CacheResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_by_origin(&self, origin: OriginFlag) -> CacheResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE origin_flag = ?1",
            params![origin.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn total_size(&self) -> CacheResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(content_size), 0) FROM cache_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    /// The `limit` most-read URLs with their access counts
    pub fn most_accessed(&self, limit: usize) -> CacheResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, access_count FROM cache_entries
             ORDER BY access_count DESC, url ASC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get(0)?, count.max(0) as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Oldest and newest creation timestamps
    pub fn age_range(&self) -> CacheResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM cache_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let parse = |raw: Option<String>| {
            raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|ts| ts.with_timezone(&Utc))
        };

        Ok((parse(oldest), parse(newest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_entry(url: &str, created_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            cache_key: format!("key-{}", url.len()),
            file_path: PathBuf::from(format!("/tmp/{}.html", url.len())),
            content_size: 42,
            scrape_method: "direct".to_string(),
            status_code: Some(200),
            created_at,
            last_accessed: created_at,
            access_count: 0,
            origin: OriginFlag::Scraped,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let index = CacheIndex::open_in_memory().unwrap();
        let entry = make_entry("https://example.com/a", Utc::now());

        index.upsert(&entry).unwrap();

        let loaded = index.get("https://example.com/a").unwrap().unwrap();
        assert_eq!(loaded.url, entry.url);
        assert_eq!(loaded.content_size, 42);
        assert_eq!(loaded.status_code, Some(200));
        assert_eq!(loaded.origin, OriginFlag::Scraped);
    }

    #[test]
    fn test_get_unknown_url() {
        let index = CacheIndex::open_in_memory().unwrap();
        assert!(index.get("https://example.com/none").unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites() {
        let index = CacheIndex::open_in_memory().unwrap();
        let mut entry = make_entry("https://example.com/a", Utc::now());
        index.upsert(&entry).unwrap();

        entry.content_size = 7;
        entry.scrape_method = "remote_api".to_string();
        index.upsert(&entry).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let loaded = index.get("https://example.com/a").unwrap().unwrap();
        assert_eq!(loaded.content_size, 7);
        assert_eq!(loaded.scrape_method, "remote_api");
    }

    #[test]
    fn test_get_many_skips_missing() {
        let index = CacheIndex::open_in_memory().unwrap();
        index
            .upsert(&make_entry("https://example.com/a", Utc::now()))
            .unwrap();
        index
            .upsert(&make_entry("https://example.com/bb", Utc::now()))
            .unwrap();

        let entries = index
            .get_many(&["https://example.com/a", "https://example.com/missing"])
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/a");

        assert!(index.get_many(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_get_many_past_variable_limit() {
        let index = CacheIndex::open_in_memory().unwrap();
        index
            .upsert(&make_entry("https://example.com/p/39999", Utc::now()))
            .unwrap();

        let urls: Vec<String> = (0..40_000)
            .map(|i| format!("https://example.com/p/{}", i))
            .collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();

        let entries = index.get_many(&refs).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/p/39999");
    }

    #[test]
    fn test_record_access() {
        let mut index = CacheIndex::open_in_memory().unwrap();
        index
            .upsert(&make_entry("https://example.com/a", Utc::now()))
            .unwrap();

        index
            .record_access(&["https://example.com/a", "https://example.com/a"], Utc::now())
            .unwrap();

        let loaded = index.get("https://example.com/a").unwrap().unwrap();
        assert_eq!(loaded.access_count, 2);
        assert_eq!(
            index.most_accessed(5).unwrap(),
            vec![("https://example.com/a".to_string(), 2)]
        );
    }

    #[test]
    fn test_remove_older_than() {
        let mut index = CacheIndex::open_in_memory().unwrap();
        let now = Utc::now();
        index
            .upsert(&make_entry("https://example.com/old", now - Duration::days(40)))
            .unwrap();
        index
            .upsert(&make_entry("https://example.com/new", now))
            .unwrap();

        let removed = index.remove_older_than(now - Duration::days(30)).unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].url, "https://example.com/old");
        assert_eq!(index.count().unwrap(), 1);
        assert!(index.contains("https://example.com/new").unwrap());
    }

    #[test]
    fn test_statistics() {
        let index = CacheIndex::open_in_memory().unwrap();
        let now = Utc::now();
        let earlier = now - Duration::hours(2);

        let mut imported = make_entry("https://example.com/imported", earlier);
        imported.origin = OriginFlag::Imported;
        index.upsert(&imported).unwrap();
        index
            .upsert(&make_entry("https://example.com/scraped", now))
            .unwrap();

        assert_eq!(index.count().unwrap(), 2);
        assert_eq!(index.total_size().unwrap(), 84);
        assert_eq!(index.count_by_origin(OriginFlag::Imported).unwrap(), 1);
        assert_eq!(index.count_by_origin(OriginFlag::Scraped).unwrap(), 1);

        let (oldest, newest) = index.age_range().unwrap();
        assert!(oldest.unwrap() < newest.unwrap());
    }

    #[test]
    fn test_empty_statistics() {
        let index = CacheIndex::open_in_memory().unwrap();
        assert_eq!(index.total_size().unwrap(), 0);
        assert_eq!(index.age_range().unwrap(), (None, None));
    }
}
