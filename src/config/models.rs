use crate::cache::CacheConfig;
use serde::Deserialize;

/// Reader preferences consumed by the pipeline; deserializable from the flat
/// form as well as the sectioned TOML tables.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub theme: ThemeMode,
    #[serde(default = "crate::config::defaults::default_font_size")]
    pub font_size: u32,
    #[serde(default = "crate::config::defaults::default_line_height")]
    pub line_height: f32,
    #[serde(default = "crate::config::defaults::default_margin")]
    pub margin: u32,
    #[serde(default)]
    pub text_align: TextAlignOverride,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub custom_css: Option<String>,
    #[serde(default)]
    pub custom_js: Option<String>,
    #[serde(default = "crate::config::defaults::default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "crate::config::defaults::default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "crate::config::defaults::default_cache_max_total_bytes")]
    pub cache_max_total_bytes: u64,
    #[serde(default = "crate::config::defaults::default_cache_max_entry_bytes")]
    pub cache_max_entry_bytes: u64,
    #[serde(default)]
    pub cache_unlimited: bool,
    #[serde(default = "crate::config::defaults::default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            theme: ThemeMode::System,
            font_size: crate::config::defaults::default_font_size(),
            line_height: crate::config::defaults::default_line_height(),
            margin: crate::config::defaults::default_margin(),
            text_align: TextAlignOverride::Source,
            background_color: None,
            text_color: None,
            custom_css: None,
            custom_js: None,
            cache_enabled: crate::config::defaults::default_cache_enabled(),
            cache_max_entries: crate::config::defaults::default_cache_max_entries(),
            cache_max_total_bytes: crate::config::defaults::default_cache_max_total_bytes(),
            cache_max_entry_bytes: crate::config::defaults::default_cache_max_entry_bytes(),
            cache_unlimited: false,
            cache_dir: crate::config::defaults::default_cache_dir(),
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

impl PipelineConfig {
    /// Limits handed to the chapter disk cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            max_total_bytes: self.cache_max_total_bytes,
            max_entry_bytes: self.cache_max_entry_bytes,
            unlimited: self.cache_unlimited,
        }
    }
}

/// Theme mode. `System` follows the host's dark-mode flag.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn is_dark(self, system_dark: bool) -> bool {
        match self {
            ThemeMode::System => system_dark,
            ThemeMode::Light => false,
            ThemeMode::Dark => true,
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ThemeMode::System => "System",
            ThemeMode::Light => "Light",
            ThemeMode::Dark => "Dark",
        };
        write!(f, "{}", label)
    }
}

/// Text alignment forced onto the web renderer; `Source` keeps the chapter's own.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlignOverride {
    #[default]
    Source,
    Left,
    Center,
    Justify,
    Right,
}

impl TextAlignOverride {
    pub fn as_css(self) -> Option<&'static str> {
        match self {
            TextAlignOverride::Source => None,
            TextAlignOverride::Left => Some("left"),
            TextAlignOverride::Center => Some("center"),
            TextAlignOverride::Justify => Some("justify"),
            TextAlignOverride::Right => Some("right"),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
