//! `chapter-render`: run a raw chapter payload through the pipeline.
//!
//! Prints the themed HTML document by default, or the rich and flat content
//! blocks as JSON with `--blocks`.

use anyhow::{Context, Result, anyhow};
use novel_pipeline::config::DEFAULT_CONFIG_PATH;
use novel_pipeline::{
    CancellationToken, ChapterPipeline, ChapterRef, ChapterSource, LoadedChapter, PluginAssets,
    load_config,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const USAGE: &str = "Usage: chapter-render <payload-file> [--name NAME] [--chapter-id ID] \
[--url CHAPTER_URL] [--novel-url NOVEL_URL] [--site SITE_URL] [--css FILE] [--js FILE] \
[--config PATH] [--dark] [--no-cache] [--blocks]";

#[derive(Debug, Default)]
struct CliArgs {
    payload: PathBuf,
    name: Option<String>,
    chapter_id: Option<i64>,
    chapter_url: Option<String>,
    novel_url: String,
    site: Option<String>,
    css: Option<PathBuf>,
    js: Option<PathBuf>,
    config: Option<PathBuf>,
    dark: bool,
    no_cache: bool,
    blocks: bool,
}

/// Serves the payload file as the chapter text.
struct FileSource {
    path: PathBuf,
    chapter_url: Option<String>,
}

impl ChapterSource for FileSource {
    fn fetch_chapter_text(&self, _chapter: &ChapterRef) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read payload {}", self.path.display()))
    }

    fn chapter_web_url(&self, _chapter_path: &str, _novel_path: &str) -> Option<String> {
        self.chapter_url.clone()
    }
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = load_config(&config_path);
    if args.no_cache {
        config.cache_enabled = false;
    }
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        path = %args.payload.display(),
        level = %config.log_level,
        theme = %config.theme,
        "Rendering chapter payload"
    );

    let chapter = ChapterRef {
        id: args.chapter_id.unwrap_or_else(|| chapter_id_for(&args.payload)),
        name: args.name.clone(),
        path: args.chapter_url.clone().unwrap_or_default(),
        novel_url: args.novel_url.clone(),
        stored_progress: 0,
        read: false,
    };
    let plugin = PluginAssets {
        custom_css: read_optional(args.css.as_deref())?,
        custom_js: read_optional(args.js.as_deref())?,
        site_url: args.site.clone(),
    };
    let source = FileSource {
        path: args.payload.clone(),
        chapter_url: args.chapter_url.clone(),
    };

    let pipeline = ChapterPipeline::new(config).with_system_dark(args.dark);
    let loaded = pipeline.load_chapter(&chapter, &source, &plugin, &CancellationToken::new())?;
    print_chapter(&loaded, args.blocks)
}

fn print_chapter(loaded: &LoadedChapter, blocks: bool) -> Result<()> {
    if !blocks {
        println!("{}", loaded.html);
        return Ok(());
    }
    let dump = json!({
        "chapter_id": loaded.chapter_id,
        "chapter_web_url": loaded.chapter_web_url,
        "unsupported_features_detected": loaded.rich.unsupported_features_detected,
        "rich_blocks": loaded.rich.blocks,
        "blocks": loaded.blocks,
        "saved_position": loaded.saved_position,
    });
    let text = serde_json::to_string_pretty(&dump).context("Failed to serialize content blocks")?;
    println!("{text}");
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut payload = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| anyhow!("Missing value for {flag}\n{USAGE}"))
        };
        match arg.as_str() {
            "--name" => parsed.name = Some(value("--name")?),
            "--chapter-id" => {
                let raw = value("--chapter-id")?;
                parsed.chapter_id = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid chapter id: {raw}"))?,
                );
            }
            "--url" => parsed.chapter_url = Some(value("--url")?),
            "--novel-url" => parsed.novel_url = value("--novel-url")?,
            "--site" => parsed.site = Some(value("--site")?),
            "--css" => parsed.css = Some(PathBuf::from(value("--css")?)),
            "--js" => parsed.js = Some(PathBuf::from(value("--js")?)),
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--dark" => parsed.dark = true,
            "--no-cache" => parsed.no_cache = true,
            "--blocks" => parsed.blocks = true,
            flag if flag.starts_with("--") => return Err(anyhow!("Unknown flag {flag}\n{USAGE}")),
            _ if payload.is_none() => payload = Some(PathBuf::from(&arg)),
            _ => return Err(anyhow!("Unexpected argument {arg}\n{USAGE}")),
        }
    }

    let payload = payload.ok_or_else(|| anyhow!(USAGE))?;
    if !payload.exists() {
        return Err(anyhow!("File not found: {}", payload.display()));
    }
    parsed.payload = payload;
    Ok(parsed)
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|path| {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    })
    .transpose()
}

/// Stable id for a payload file so repeat renders hit the disk cache.
fn chapter_id_for(path: &Path) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(path.as_os_str().to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes) & i64::MAX
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with logging.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
