//! Chapter load orchestration.
//!
//! A load walks: disk cache, prefetch cache, then the chapter source; the raw
//! payload is normalized, gets its heading, and is turned into the rich block
//! model, flat reading lines and the themed HTML document. Every stage checks
//! the cancellation token so an abandoned load writes nothing.

use crate::cache::ChapterDiskCache;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::flat::{FlatBlock, extract_content_blocks};
use crate::heading::prepend_chapter_heading_if_missing;
use crate::progress::{
    ProgressTracker, ProgressUpdate, SavedPosition, encode_native_scroll, encode_web_percent,
};
use crate::rich::{RichParseResult, parse_rich_content, resolve_image_urls};
use crate::structured::StructuredNormalizer;
use crate::theme::{PluginAssets, inject_reader_theme};
use crate::url_resolver::{ResourceBases, resolve_chapter_url};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

pub const PREFETCH_CACHE_MAX_ENTRIES: usize = 4;

/// A chapter as known to the library: identity, location and saved state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterRef {
    pub id: i64,
    pub name: Option<String>,
    /// Chapter path or URL as the plugin reported it.
    pub path: String,
    pub novel_url: String,
    /// Value previously persisted by [`ProgressStore::save_progress`].
    pub stored_progress: i64,
    pub read: bool,
}

/// Upstream provider of raw chapter payloads.
pub trait ChapterSource: Send + Sync {
    fn fetch_chapter_text(&self, chapter: &ChapterRef) -> Result<String>;

    /// Web URL of the chapter when the source knows a better one than its path.
    fn chapter_web_url(&self, _chapter_path: &str, _novel_path: &str) -> Option<String> {
        None
    }

    /// Site URL used when the plugin metadata carries none.
    fn site_url(&self) -> Option<String> {
        None
    }
}

/// Persistence of the encoded progress column and read flag.
pub trait ProgressStore: Send + Sync {
    fn save_progress(&self, chapter_id: i64, progress: i64, read: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterOrigin {
    DiskCache,
    Prefetch,
    Source,
}

/// Everything both renderers need for one chapter.
#[derive(Debug, Clone)]
pub struct LoadedChapter {
    pub chapter_id: i64,
    pub origin: ChapterOrigin,
    /// Normalized chapter HTML with its heading, before theming.
    pub content_html: String,
    /// Themed document for the web renderer.
    pub html: String,
    pub rich: RichParseResult,
    pub blocks: Vec<FlatBlock>,
    pub text_blocks: Vec<String>,
    pub chapter_web_url: Option<String>,
    pub saved_position: SavedPosition,
}

/// Small LRU of raw payloads fetched ahead of the reader.
#[derive(Debug)]
pub struct PrefetchCache {
    capacity: usize,
    entries: Mutex<VecDeque<(i64, String)>>,
}

impl Default for PrefetchCache {
    fn default() -> Self {
        Self::new(PREFETCH_CACHE_MAX_ENTRIES)
    }
}

impl PrefetchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the payload and marks it most recently used.
    pub fn get(&self, chapter_id: i64) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let position = entries.iter().position(|(id, _)| *id == chapter_id)?;
        let entry = entries.remove(position)?;
        let payload = entry.1.clone();
        entries.push_back(entry);
        Some(payload)
    }

    pub fn put(&self, chapter_id: i64, payload: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|(id, _)| *id != chapter_id);
        entries.push_back((chapter_id, payload.into()));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn contains(&self, chapter_id: i64) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.iter().any(|(id, _)| *id == chapter_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

pub struct ChapterPipeline {
    config: Arc<RwLock<PipelineConfig>>,
    disk_cache: Option<ChapterDiskCache>,
    prefetch: PrefetchCache,
    system_dark: bool,
}

impl ChapterPipeline {
    /// Pipeline with a disk cache rooted at the configured directory.
    pub fn new(config: PipelineConfig) -> Self {
        let dir = PathBuf::from(&config.cache_dir);
        Self::with_cache_dir(config, dir)
    }

    pub fn with_cache_dir(config: PipelineConfig, dir: impl Into<PathBuf>) -> Self {
        let config = Arc::new(RwLock::new(config));
        let provider = Arc::clone(&config);
        let disk_cache = ChapterDiskCache::with_config_provider(dir, move || {
            provider
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .cache_config()
        });
        Self {
            config,
            disk_cache: Some(disk_cache),
            prefetch: PrefetchCache::default(),
            system_dark: false,
        }
    }

    /// Pipeline that never touches the filesystem.
    pub fn in_memory(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            disk_cache: None,
            prefetch: PrefetchCache::default(),
            system_dark: false,
        }
    }

    pub fn with_system_dark(mut self, system_dark: bool) -> Self {
        self.system_dark = system_dark;
        self
    }

    pub fn config(&self) -> PipelineConfig {
        self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Swap reader preferences; cache limits apply from the next cache access.
    pub fn set_config(&self, config: PipelineConfig) {
        *self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn disk_cache(&self) -> Option<&ChapterDiskCache> {
        self.disk_cache.as_ref()
    }

    pub fn prefetch_cache(&self) -> &PrefetchCache {
        &self.prefetch
    }

    fn active_disk_cache(&self, config: &PipelineConfig) -> Option<&ChapterDiskCache> {
        self.disk_cache.as_ref().filter(|_| config.cache_enabled)
    }

    /// Load and render one chapter.
    ///
    /// Only a failing source surfaces as an error; malformed payloads always
    /// degrade to a best-effort render.
    pub fn load_chapter(
        &self,
        chapter: &ChapterRef,
        source: &dyn ChapterSource,
        plugin: &PluginAssets,
        cancel: &CancellationToken,
    ) -> Result<LoadedChapter> {
        let config = self.config();
        let bases = resource_bases(chapter, source, plugin);
        let normalizer = StructuredNormalizer::with_resources(bases.clone());
        let disk_cache = self.active_disk_cache(&config);

        cancel.check_cancelled("fetch")?;
        let (normalized, origin) = match disk_cache.and_then(|cache| cache.get(chapter.id)) {
            Some(cached) => (normalizer.normalize(&cached), ChapterOrigin::DiskCache),
            None => {
                let (raw, origin) = match self.prefetch.get(chapter.id) {
                    Some(prefetched) => (prefetched, ChapterOrigin::Prefetch),
                    None => {
                        let fetched = source.fetch_chapter_text(chapter).with_context(|| {
                            format!("Failed to load text for chapter {}", chapter.id)
                        })?;
                        (fetched, ChapterOrigin::Source)
                    }
                };
                cancel.check_cancelled("normalize")?;
                let normalized = normalizer.normalize(&raw);
                cancel.check_cancelled("cache")?;
                if let Some(cache) = disk_cache {
                    cache.put(chapter.id, &normalized);
                }
                (normalized, origin)
            }
        };
        debug!(chapter_id = chapter.id, ?origin, "Resolved chapter payload");

        cancel.check_cancelled("render")?;
        let loaded = self.render(chapter, normalized, origin, bases, plugin, &config);
        info!(
            chapter_id = chapter.id,
            blocks = loaded.rich.blocks.len(),
            unsupported = loaded.rich.unsupported_features_detected,
            "Chapter ready"
        );
        Ok(loaded)
    }

    /// Render an already-normalized payload into a [`LoadedChapter`].
    fn render(
        &self,
        chapter: &ChapterRef,
        normalized: String,
        origin: ChapterOrigin,
        bases: ResourceBases,
        plugin: &PluginAssets,
        config: &PipelineConfig,
    ) -> LoadedChapter {
        let content_html = prepend_chapter_heading_if_missing(&normalized, chapter.name.as_deref());
        let html = inject_reader_theme(&content_html, config, plugin, self.system_dark);

        let mut rich = parse_rich_content(&html);
        resolve_image_urls(&mut rich.blocks, &bases);

        let blocks = extract_content_blocks(&content_html, &bases);
        let text_blocks = blocks
            .iter()
            .filter_map(|block| match block {
                FlatBlock::Text { text } => Some(text.clone()),
                FlatBlock::Image { .. } => None,
            })
            .collect();

        LoadedChapter {
            chapter_id: chapter.id,
            origin,
            content_html,
            html,
            rich,
            blocks,
            text_blocks,
            chapter_web_url: bases.chapter_web_url,
            saved_position: SavedPosition::from_stored(chapter.stored_progress),
        }
    }

    /// Fetch a chapter ahead of time. Returns `false` when it was already
    /// cached and nothing was fetched.
    ///
    /// The disk entry is normalized against the same resource bases a direct
    /// load uses, so both paths resolve images identically.
    pub fn prefetch_chapter(
        &self,
        chapter: &ChapterRef,
        source: &dyn ChapterSource,
        plugin: &PluginAssets,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let config = self.config();
        let disk_cache = self.active_disk_cache(&config);
        if self.prefetch.contains(chapter.id)
            || disk_cache.is_some_and(|cache| cache.contains(chapter.id))
        {
            return Ok(false);
        }

        cancel.check_cancelled("prefetch")?;
        let raw = match source.fetch_chapter_text(chapter) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(chapter_id = chapter.id, "Failed to prefetch chapter: {err:#}");
                return Err(err);
            }
        };
        cancel.check_cancelled("prefetch")?;
        self.prefetch.put(chapter.id, raw.clone());
        if let Some(cache) = disk_cache {
            let bases = resource_bases(chapter, source, plugin);
            cache.put(chapter.id, &StructuredNormalizer::with_resources(bases).normalize(&raw));
        }
        debug!(chapter_id = chapter.id, "Prefetched chapter");
        Ok(true)
    }
}

fn resource_bases(
    chapter: &ChapterRef,
    source: &dyn ChapterSource,
    plugin: &PluginAssets,
) -> ResourceBases {
    let plugin_site = plugin
        .site_url
        .clone()
        .filter(|site| !site.trim().is_empty())
        .or_else(|| source.site_url());
    ResourceBases {
        chapter_web_url: resolve_chapter_web_url(source, chapter, plugin_site.as_deref()),
        novel_url: chapter.novel_url.clone(),
        plugin_site,
    }
}

/// The source-provided web URL wins when usable; otherwise the chapter path
/// is resolved against the novel and site.
pub fn resolve_chapter_web_url(
    source: &dyn ChapterSource,
    chapter: &ChapterRef,
    plugin_site: Option<&str>,
) -> Option<String> {
    let provided = source
        .chapter_web_url(&chapter.path, &chapter.novel_url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());

    if let Some(provided) = provided {
        if let Ok(url) = Url::parse(&provided)
            && matches!(url.scheme(), "http" | "https")
        {
            return Some(url.to_string());
        }
        if let Some(resolved) = resolve_chapter_url(&provided, plugin_site, &chapter.novel_url) {
            return Some(resolved);
        }
    }

    resolve_chapter_url(&chapter.path, plugin_site, &chapter.novel_url)
}

/// Progress bookkeeping for the chapter currently open in a reader.
pub struct ReadingSession {
    chapter_id: i64,
    tracker: ProgressTracker,
    store: Arc<dyn ProgressStore>,
}

impl ReadingSession {
    pub fn new(chapter: &ChapterRef, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            chapter_id: chapter.id,
            tracker: ProgressTracker::new(chapter.stored_progress, chapter.read),
            store,
        }
    }

    pub fn is_read(&self) -> bool {
        self.tracker.is_read()
    }

    pub fn last_saved_progress(&self) -> i64 {
        self.tracker.last_saved_progress()
    }

    /// Native renderer callback: first visible block and its pixel offset.
    pub fn on_native_scroll(
        &mut self,
        index: i64,
        offset_px: i64,
        total_items: i64,
    ) -> Result<Option<ProgressUpdate>> {
        let encoded = encode_native_scroll(index, offset_px);
        self.apply(index, total_items, Some(encoded))
    }

    /// Web renderer callback: scroll position in percent.
    pub fn on_web_scroll(&mut self, percent: i64) -> Result<Option<ProgressUpdate>> {
        let percent = percent.clamp(0, 100);
        self.apply(percent, 100, Some(encode_web_percent(percent)))
    }

    /// Plain item-index progress, persisted as the index itself.
    pub fn on_item_progress(&mut self, index: i64, total_items: i64) -> Result<Option<ProgressUpdate>> {
        self.apply(index, total_items, None)
    }

    /// True once per session when the reader passes the prefetch threshold.
    pub fn should_prefetch_next(&mut self, index: i64, total_items: i64) -> bool {
        self.tracker.take_next_chapter_prefetch_signal(index, total_items)
    }

    fn apply(
        &mut self,
        index: i64,
        total_items: i64,
        persisted: Option<i64>,
    ) -> Result<Option<ProgressUpdate>> {
        let Some(update) = self.tracker.on_progress(index, total_items, persisted) else {
            return Ok(None);
        };
        self.store
            .save_progress(self.chapter_id, update.progress, update.read)
            .with_context(|| format!("Failed to save progress for chapter {}", self.chapter_id))?;
        if update.became_read {
            info!(chapter_id = self.chapter_id, "Chapter marked as read");
        }
        Ok(Some(update))
    }
}
