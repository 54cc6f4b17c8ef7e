//! Disk cache for normalized chapter HTML.
//!
//! One gzip file per chapter lives under the cache directory. The file's
//! modification time is the recency signal: reads and writes touch it, and
//! eviction deletes the oldest files first until the configured limits hold.
//! Every failure is logged and treated as a miss; nothing here ever reaches
//! the reader as an error.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 2 * 1024 * 1024;

const ENTRY_PREFIX: &str = "chapter-";
const ENTRY_SUFFIX: &str = ".html.gz";
const TEMP_SUFFIX: &str = ".tmp";

/// Limits applied to the cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_total_bytes: u64,
    pub max_entry_bytes: u64,
    pub unlimited: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            unlimited: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
}

type ConfigProvider = Arc<dyn Fn() -> CacheConfig + Send + Sync>;

#[derive(Debug)]
struct EntryFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

pub struct ChapterDiskCache {
    dir: PathBuf,
    config: ConfigProvider,
    lock: Mutex<()>,
}

impl std::fmt::Debug for ChapterDiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterDiskCache")
            .field("dir", &self.dir)
            .field("config", &(self.config)())
            .finish()
    }
}

impl ChapterDiskCache {
    /// Cache with fixed limits.
    pub fn new(dir: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self::with_config_provider(dir, move || config)
    }

    /// Cache whose limits are re-read on every operation, so preference
    /// changes apply without rebuilding the cache.
    pub fn with_config_provider(
        dir: impl Into<PathBuf>,
        provider: impl Fn() -> CacheConfig + Send + Sync + 'static,
    ) -> Self {
        Self {
            dir: dir.into(),
            config: Arc::new(provider),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, chapter_id: i64) -> Option<String> {
        let _guard = self.guard();
        let config = (self.config)();
        let path = self.entry_path(chapter_id);
        let len = fs::metadata(&path).ok()?.len();
        if len == 0 || len > config.max_entry_bytes {
            tracing::debug!(
                chapter_id,
                path = %path.display(),
                bytes = len,
                "Dropping cached chapter outside entry limits"
            );
            remove_quietly(&path);
            return None;
        }

        match read_gzip(&path) {
            Ok(html) => {
                if let Err(err) = touch(&path) {
                    tracing::warn!(path = %path.display(), "Failed to touch cached chapter: {err}");
                }
                tracing::debug!(chapter_id, path = %path.display(), "Loaded cached chapter");
                Some(html)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), "Failed to read cached chapter: {err}");
                remove_quietly(&path);
                None
            }
        }
    }

    pub fn put(&self, chapter_id: i64, html: &str) {
        if html.trim().is_empty() {
            return;
        }
        let _guard = self.guard();
        let config = (self.config)();

        let compressed = match gzip(html) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(chapter_id, "Failed to compress chapter for cache: {err}");
                return;
            }
        };
        let size = compressed.len() as u64;
        if size == 0 || size > config.max_entry_bytes {
            tracing::warn!(
                chapter_id,
                bytes = size,
                limit = config.max_entry_bytes,
                "Chapter too large for cache entry limit"
            );
            return;
        }

        let path = self.entry_path(chapter_id);
        if let Err(err) = self.write_atomically(&path, &compressed) {
            tracing::warn!(path = %path.display(), "Failed to write cached chapter: {err}");
            return;
        }
        tracing::debug!(chapter_id, path = %path.display(), bytes = size, "Stored cached chapter");
        self.trim_locked(&config);
    }

    /// Existence check only; the entry may still be rejected by `get`.
    pub fn contains(&self, chapter_id: i64) -> bool {
        let _guard = self.guard();
        self.entry_path(chapter_id).is_file()
    }

    pub fn stats(&self) -> CacheStats {
        let _guard = self.guard();
        let entries = self.list_entries();
        CacheStats {
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|entry| entry.len).sum(),
        }
    }

    pub fn clear(&self) {
        let _guard = self.guard();
        for entry in self.list_entries() {
            remove_quietly(&entry.path);
        }
        tracing::info!(path = %self.dir.display(), "Cleared chapter cache");
    }

    pub fn trim_to_limits(&self) {
        let _guard = self.guard();
        let config = (self.config)();
        self.trim_locked(&config);
    }

    fn trim_locked(&self, config: &CacheConfig) {
        if config.unlimited {
            return;
        }
        let mut entries = self.list_entries();
        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        let mut count = entries.len();
        let mut total: u64 = entries.iter().map(|entry| entry.len).sum();
        for entry in entries {
            if count <= config.max_entries && total <= config.max_total_bytes {
                break;
            }
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    count -= 1;
                    total = total.saturating_sub(entry.len);
                    tracing::debug!(path = %entry.path.display(), "Evicted cached chapter");
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path.display(), "Failed to evict cached chapter: {err}");
                }
            }
        }
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut temp = path.as_os_str().to_owned();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let result = (|| {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            drop(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
            fs::rename(&temp, path)?;
            touch(path)
        })();
        if result.is_err() {
            remove_quietly(&temp);
        }
        result
    }

    fn list_entries(&self) -> Vec<EntryFile> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(ENTRY_PREFIX) && name.ends_with(ENTRY_SUFFIX)
            })
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(EntryFile {
                    path: entry.path(),
                    len: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                })
            })
            .collect()
    }

    fn entry_path(&self, chapter_id: i64) -> PathBuf {
        self.dir.join(format!("{ENTRY_PREFIX}{chapter_id}{ENTRY_SUFFIX}"))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn gzip(text: &str) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

fn read_gzip(path: &Path) -> io::Result<String> {
    let file = fs::File::open(path)?;
    let mut decoder = GzDecoder::new(file);
    let mut html = String::new();
    decoder.read_to_string(&mut html)?;
    Ok(html)
}

fn touch(path: &Path) -> io::Result<()> {
    fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "Failed to remove cache file: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, UNIX_EPOCH};

    fn temp_cache_dir(label: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("novel-cache-{label}-{nonce}"))
    }

    fn pause() {
        thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn put_then_get_returns_same_html() {
        let dir = temp_cache_dir("roundtrip");
        let cache = ChapterDiskCache::new(&dir, CacheConfig::default());
        let html = "<p>Hello, <b>reader</b></p>";
        cache.put(7, html);
        assert!(cache.contains(7));
        assert_eq!(cache.get(7).as_deref(), Some(html));
        assert_eq!(cache.stats().entry_count, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn blank_and_oversized_payloads_are_not_stored() {
        let dir = temp_cache_dir("limits");
        let cache = ChapterDiskCache::new(
            &dir,
            CacheConfig {
                max_entry_bytes: 64,
                ..CacheConfig::default()
            },
        );
        cache.put(1, "   ");
        let noisy: String = (0..4000)
            .map(|i| char::from(b'a' + ((i * 7919) % 26) as u8))
            .collect();
        cache.put(2, &noisy);
        assert!(!cache.contains(1));
        assert!(!cache.contains(2));
        assert_eq!(cache.stats(), CacheStats::default());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn evicts_least_recently_used_entry() {
        let dir = temp_cache_dir("lru");
        let cache = ChapterDiskCache::new(
            &dir,
            CacheConfig {
                max_entries: 2,
                ..CacheConfig::default()
            },
        );
        cache.put(1, "<p>one</p>");
        pause();
        cache.put(2, "<p>two</p>");
        pause();
        assert!(cache.get(1).is_some());
        pause();
        cache.put(3, "<p>three</p>");

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.stats().entry_count, 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unlimited_cache_never_evicts() {
        let dir = temp_cache_dir("unlimited");
        let cache = ChapterDiskCache::new(
            &dir,
            CacheConfig {
                max_entries: 1,
                max_total_bytes: 1,
                unlimited: true,
                ..CacheConfig::default()
            },
        );
        for id in 0..3 {
            cache.put(id, "<p>kept</p>");
        }
        cache.trim_to_limits();
        assert_eq!(cache.stats().entry_count, 3);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn shrinking_limits_applies_on_next_read() {
        let dir = temp_cache_dir("provider");
        let limit = Arc::new(AtomicUsize::new(DEFAULT_MAX_ENTRY_BYTES as usize));
        let provider_limit = Arc::clone(&limit);
        let cache = ChapterDiskCache::with_config_provider(&dir, move || CacheConfig {
            max_entry_bytes: provider_limit.load(Ordering::Relaxed) as u64,
            ..CacheConfig::default()
        });
        cache.put(9, "<p>soon too large</p>");
        assert!(cache.contains(9));

        limit.store(4, Ordering::Relaxed);
        assert_eq!(cache.get(9), None);
        assert!(!cache.contains(9));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_removes_every_entry() {
        let dir = temp_cache_dir("clear");
        let cache = ChapterDiskCache::new(&dir, CacheConfig::default());
        cache.put(1, "<p>a</p>");
        cache.put(2, "<p>b</p>");
        cache.clear();
        assert_eq!(cache.stats().entry_count, 0);
        assert_eq!(cache.get(1), None);
        let _ = fs::remove_dir_all(&dir);
    }
}
