//! Cache store combining the memory, index, and file layers
//!
//! Writes go file -> index -> memory, so once `put` returns, any reader on any
//! task sees the new content. Locks guard only in-memory bookkeeping and the
//! short synchronous index calls; file I/O always runs unlocked.

use crate::cache::error::CacheResult;
use crate::cache::index::CacheIndex;
use crate::cache::manifest::{read_seed_rows, write_manifest};
use crate::cache::{CacheEntry, OriginFlag};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::fs;

/// Name of the index database inside the cache directory
pub const INDEX_FILE_NAME: &str = "cache.db";

/// Deterministic cache key for a URL (SHA-256, hex encoded)
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Metadata recorded alongside content on `put`
#[derive(Debug, Clone, PartialEq)]
pub struct PutMetadata {
    pub scrape_method: String,
    pub status_code: Option<u16>,
    pub origin: OriginFlag,
}

impl PutMetadata {
    pub fn scraped(scrape_method: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            scrape_method: scrape_method.into(),
            status_code,
            origin: OriginFlag::Scraped,
        }
    }

    pub fn imported(scrape_method: Option<String>, status_code: Option<u16>) -> Self {
        Self {
            scrape_method: scrape_method.unwrap_or_else(|| "unknown".to_string()),
            status_code: status_code.or(Some(200)),
            origin: OriginFlag::Imported,
        }
    }
}

impl Default for PutMetadata {
    fn default() -> Self {
        Self::scraped("unknown", Some(200))
    }
}

/// Summary of the cache contents
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_bytes: u64,
    pub imported_entries: u64,
    pub scraped_entries: u64,
    pub most_accessed: Vec<(String, u64)>,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub memory_entries: usize,
}

/// URL-keyed cache over an in-memory map, a SQLite index, and content files
///
/// Construct once and share (behind an `Arc`) with every component that needs
/// the same keyspace. The memory map is a pure cache over the index: dropping
/// it with [`CacheStore::clear_memory`] never loses data.
pub struct CacheStore {
    dir: PathBuf,
    index: Mutex<CacheIndex>,
    memory: RwLock<HashMap<String, Arc<str>>>,
    tmp_counter: AtomicU64,
}

impl CacheStore {
    /// Opens the cache rooted at `dir`, creating the directory and index if needed
    pub fn open(dir: impl AsRef<Path>) -> CacheResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let index = CacheIndex::open(&dir.join(INDEX_FILE_NAME))?;
        tracing::info!("Opened cache at {}", dir.display());

        Ok(Self {
            dir,
            index: Mutex::new(index),
            memory: RwLock::new(HashMap::new()),
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn memory_get(&self, url: &str) -> Option<Arc<str>> {
        let memory = self.memory.read().unwrap_or_else(|e| e.into_inner());
        memory.get(url).cloned()
    }

    /// Overwrites the memory slot; only `put` may do this
    fn memory_insert(&self, url: &str, content: Arc<str>) {
        let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
        memory.insert(url.to_string(), content);
    }

    /// Fills an empty memory slot from a file read and returns what the slot
    /// holds afterwards
    ///
    /// A `put` that finished while the file was being read has already
    /// stored newer content, which must win over what this reader saw.
    fn memory_fill(&self, url: &str, content: Arc<str>) -> Arc<str> {
        let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
        memory
            .entry(url.to_string())
            .or_insert(content)
            .clone()
    }

    fn content_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.html", key))
    }

    /// Bumps access statistics; a failure here never hides a hit
    fn note_access(&self, urls: &[&str]) {
        if urls.is_empty() {
            return;
        }
        if let Err(e) = self.index().record_access(urls, Utc::now()) {
            tracing::warn!("Failed to record access for {} URL(s): {}", urls.len(), e);
        }
    }

    /// Returns cached content for `url`, or `None` on a miss
    ///
    /// Memory is consulted first, then the index and content file. An index
    /// entry whose content file cannot be read counts as a miss.
    ///
    /// # Arguments
    ///
    /// * `url` - The exact URL the content was stored under
    ///
    /// # Returns
    ///
    /// `Ok(Some(content))` on a hit, `Ok(None)` on a miss, or an error if the
    /// index lookup itself fails
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quarry::cache::CacheStore;
    ///
    /// # async fn demo() -> quarry::cache::CacheResult<()> {
    /// let cache = CacheStore::open("./cache")?;
    /// if let Some(html) = cache.get("https://shop.example/item/1").await? {
    ///     println!("{} bytes cached", html.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&self, url: &str) -> CacheResult<Option<String>> {
        if let Some(content) = self.memory_get(url) {
            self.note_access(&[url]);
            tracing::debug!("Memory cache hit for {}", url);
            return Ok(Some(content.to_string()));
        }

        let entry = self.index().get(url)?;
        let Some(entry) = entry else {
            tracing::debug!("Cache miss for {}", url);
            return Ok(None);
        };

        match fs::read_to_string(&entry.file_path).await {
            Ok(content) => {
                let content = self.memory_fill(url, Arc::from(content));
                self.note_access(&[url]);
                tracing::debug!("Index cache hit for {}", url);
                Ok(Some(content.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    "Unreadable cache file {} for {}: {}",
                    entry.file_path.display(),
                    url,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Resolves many URLs at once
    ///
    /// Every requested URL is present in the result; misses map to `None`.
    /// Duplicate URLs are looked up once.
    ///
    /// # Arguments
    ///
    /// * `urls` - URLs to resolve, in any order
    ///
    /// # Returns
    ///
    /// A map from each distinct requested URL to its cached content, if any
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quarry::cache::CacheStore;
    ///
    /// # async fn demo() -> quarry::cache::CacheResult<()> {
    /// let cache = CacheStore::open("./cache")?;
    /// let found = cache
    ///     .get_batch(&["https://shop.example/a", "https://shop.example/b"])
    ///     .await?;
    /// let hits = found.values().filter(|c| c.is_some()).count();
    /// println!("{} of {} cached", hits, found.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_batch<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> CacheResult<HashMap<String, Option<String>>> {
        let mut results: HashMap<String, Option<String>> = HashMap::with_capacity(urls.len());
        let mut remaining: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();

        {
            let memory = self.memory.read().unwrap_or_else(|e| e.into_inner());
            for url in urls {
                let url = url.as_ref();
                if !seen.insert(url) {
                    continue;
                }
                match memory.get(url) {
                    Some(content) => {
                        results.insert(url.to_string(), Some(content.to_string()));
                    }
                    None => remaining.push(url),
                }
            }
        }

        let mut accessed: Vec<String> = results.keys().cloned().collect();

        let entries = self.index().get_many(&remaining)?;
        for entry in entries {
            match fs::read_to_string(&entry.file_path).await {
                Ok(content) => {
                    let content = self.memory_fill(&entry.url, Arc::from(content));
                    accessed.push(entry.url.clone());
                    results.insert(entry.url, Some(content.to_string()));
                }
                Err(e) => {
                    tracing::warn!(
                        "Unreadable cache file {} for {}: {}",
                        entry.file_path.display(),
                        entry.url,
                        e
                    );
                }
            }
        }

        for url in remaining {
            results.entry(url.to_string()).or_insert(None);
        }

        let accessed: Vec<&str> = accessed.iter().map(String::as_str).collect();
        self.note_access(&accessed);

        tracing::debug!(
            "Batch lookup: {} requested, {} hits",
            results.len(),
            accessed.len()
        );
        Ok(results)
    }

    /// Stores content for `url`, replacing any previous entry
    ///
    /// The content file is written to a temporary name and renamed into
    /// place, so readers never observe a partially written file.
    ///
    /// # Arguments
    ///
    /// * `url` - Key the content is stored under
    /// * `content` - Page HTML
    /// * `metadata` - How the page was obtained
    ///
    /// # Returns
    ///
    /// The index entry as written
    ///
    /// # Example
    ///
    /// ```no_run
    /// use quarry::cache::{CacheStore, PutMetadata};
    ///
    /// # async fn demo() -> quarry::cache::CacheResult<()> {
    /// let cache = CacheStore::open("./cache")?;
    /// let entry = cache
    ///     .put(
    ///         "https://shop.example/item/1",
    ///         "<html>...</html>",
    ///         PutMetadata::scraped("direct", Some(200)),
    ///     )
    ///     .await?;
    /// println!("stored at {}", entry.file_path.display());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn put(
        &self,
        url: &str,
        content: &str,
        metadata: PutMetadata,
    ) -> CacheResult<CacheEntry> {
        let key = cache_key(url);
        let path = self.content_path(&key);
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = fs::write(&tmp, content).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let now = Utc::now();
        let entry = CacheEntry {
            url: url.to_string(),
            cache_key: key,
            file_path: path,
            content_size: content.len() as u64,
            scrape_method: metadata.scrape_method,
            status_code: metadata.status_code,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            origin: metadata.origin,
        };

        self.index().upsert(&entry)?;
        self.memory_insert(url, Arc::from(content));

        tracing::debug!("Cached {} ({} bytes)", url, content.len());
        Ok(entry)
    }

    /// Checks whether `url` has an entry
    pub fn contains(&self, url: &str) -> CacheResult<bool> {
        if self.memory_get(url).is_some() {
            return Ok(true);
        }
        self.index().contains(url)
    }

    /// Returns the index entry for `url` without touching access statistics
    pub fn entry(&self, url: &str) -> CacheResult<Option<CacheEntry>> {
        self.index().get(url)
    }

    /// Collects summary statistics; `top_n` bounds the most-accessed list
    pub fn stats(&self, top_n: usize) -> CacheResult<CacheStats> {
        let memory_entries = self.memory_len();
        let index = self.index();
        let (oldest_entry, newest_entry) = index.age_range()?;
        let total_entries = index.count()?;
        let imported_entries = index.count_by_origin(OriginFlag::Imported)?;

        Ok(CacheStats {
            total_entries,
            total_bytes: index.total_size()?,
            imported_entries,
            scraped_entries: total_entries.saturating_sub(imported_entries),
            most_accessed: index.most_accessed(top_n)?,
            oldest_entry,
            newest_entry,
            memory_entries,
        })
    }

    /// Deletes entries (and their files) older than `max_age_days`
    ///
    /// Returns the number of entries removed.
    pub async fn sweep(&self, max_age_days: u32) -> CacheResult<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let removed = self.index().remove_older_than(cutoff)?;

        {
            let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
            for entry in &removed {
                memory.remove(&entry.url);
            }
        }

        for entry in &removed {
            match fs::remove_file(&entry.file_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(
                    "Failed to delete cache file {}: {}",
                    entry.file_path.display(),
                    e
                ),
            }
        }

        tracing::info!(
            "Swept {} cache entries older than {} days",
            removed.len(),
            max_age_days
        );
        Ok(removed.len())
    }

    /// Writes the index to a CSV manifest at `path`
    pub fn export_manifest(&self, path: &Path) -> CacheResult<usize> {
        let entries = self.index().all_entries()?;
        write_manifest(&entries, path)?;
        tracing::info!(
            "Exported cache manifest with {} entries to {}",
            entries.len(),
            path.display()
        );
        Ok(entries.len())
    }

    /// Seeds the cache from a prior run's results table
    ///
    /// URLs that already have an entry are skipped unless `force` is set.
    /// Returns the number of entries written.
    pub async fn import_from(&self, source: &Path, force: bool) -> CacheResult<usize> {
        let rows = read_seed_rows(source)?;
        let mut imported = 0;

        for row in rows {
            if !force && self.contains(&row.url)? {
                continue;
            }

            let metadata = PutMetadata::imported(row.scrape_method, row.status_code);
            self.put(&row.url, &row.content, metadata).await?;
            imported += 1;
        }

        tracing::info!(
            "Imported {} cached pages from {}",
            imported,
            source.display()
        );
        Ok(imported)
    }

    /// Drops the in-memory layer; entries are reloaded from the index on demand
    pub fn clear_memory(&self) {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::info!("Cleared memory cache");
    }

    pub fn memory_len(&self) -> usize {
        self.memory.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
