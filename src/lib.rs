//! Chapter content pipeline for a novel reader.
//!
//! Raw chapter payloads from content plugins (HTML, full documents, rich-text
//! JSON trees, escaped strings or JS-like literals) become canonical themed
//! HTML plus semantic content blocks, with the reading-progress codec, disk
//! cache and URL resolver the pipeline relies on.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod flat;
pub mod heading;
pub mod pipeline;
pub mod progress;
pub mod rich;
pub mod structured;
pub mod theme;
pub mod url_resolver;

pub use cache::{CacheConfig, CacheStats, ChapterDiskCache};
pub use cancellation::CancellationToken;
pub use config::{PipelineConfig, load_config};
pub use flat::{FlatBlock, extract_content_blocks, extract_text_blocks};
pub use heading::prepend_chapter_heading_if_missing;
pub use pipeline::{
    ChapterOrigin, ChapterPipeline, ChapterRef, ChapterSource, LoadedChapter, PrefetchCache,
    ProgressStore, ReadingSession,
};
pub use progress::{ProgressTracker, ProgressUpdate, ReadingProgress, SavedPosition};
pub use rich::{ContentBlock, RichParseResult, parse_rich_content};
pub use structured::{StructuredNormalizer, normalize as normalize_structured_payload};
pub use theme::{PluginAssets, inject_reader_theme};
pub use url_resolver::{ResourceBases, resolve_chapter_url, resolve_content_resource_url};
