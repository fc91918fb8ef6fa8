//! Database schema for the cache index
//!
//! The index is the source of truth for which URLs are cached; the content
//! files and the in-memory map are derived from it.

/// SQL schema for the index database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    url TEXT PRIMARY KEY,
    cache_key TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_size INTEGER NOT NULL,
    scrape_method TEXT NOT NULL,
    status_code INTEGER,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    origin_flag TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_key ON cache_entries(cache_key);
CREATE INDEX IF NOT EXISTS idx_created_at ON cache_entries(created_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
