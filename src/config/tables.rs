use super::defaults;
use super::models::{LogLevel, PipelineConfig, TextAlignOverride, ThemeMode};
use serde::Deserialize;

/// On-disk layout: `[appearance]`, `[cache]` and `[logging]` sections.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    appearance: AppearanceConfig,
    #[serde(default)]
    cache: CacheTable,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for PipelineConfig {
    fn from(tables: ConfigTables) -> Self {
        PipelineConfig {
            theme: tables.appearance.theme,
            font_size: tables.appearance.font_size,
            line_height: tables.appearance.line_height,
            margin: tables.appearance.margin,
            text_align: tables.appearance.text_align,
            background_color: non_blank(tables.appearance.background_color),
            text_color: non_blank(tables.appearance.text_color),
            custom_css: non_blank(tables.appearance.custom_css),
            custom_js: non_blank(tables.appearance.custom_js),
            cache_enabled: tables.cache.enabled,
            cache_max_entries: tables.cache.max_entries,
            cache_max_total_bytes: tables.cache.max_total_bytes,
            cache_max_entry_bytes: tables.cache.max_entry_bytes,
            cache_unlimited: tables.cache.unlimited,
            cache_dir: tables.cache.directory,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&PipelineConfig> for ConfigTables {
    fn from(config: &PipelineConfig) -> Self {
        ConfigTables {
            appearance: AppearanceConfig {
                theme: config.theme,
                font_size: config.font_size,
                line_height: config.line_height,
                margin: config.margin,
                text_align: config.text_align,
                background_color: config.background_color.clone(),
                text_color: config.text_color.clone(),
                custom_css: config.custom_css.clone(),
                custom_js: config.custom_js.clone(),
            },
            cache: CacheTable {
                enabled: config.cache_enabled,
                max_entries: config.cache_max_entries,
                max_total_bytes: config.cache_max_total_bytes,
                max_entry_bytes: config.cache_max_entry_bytes,
                unlimited: config.cache_unlimited,
                directory: config.cache_dir.clone(),
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct AppearanceConfig {
    #[serde(default)]
    theme: ThemeMode,
    #[serde(default = "defaults::default_font_size")]
    font_size: u32,
    #[serde(default = "defaults::default_line_height")]
    line_height: f32,
    #[serde(default = "defaults::default_margin")]
    margin: u32,
    #[serde(default)]
    text_align: TextAlignOverride,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_js: Option<String>,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            theme: ThemeMode::default(),
            font_size: defaults::default_font_size(),
            line_height: defaults::default_line_height(),
            margin: defaults::default_margin(),
            text_align: TextAlignOverride::default(),
            background_color: None,
            text_color: None,
            custom_css: None,
            custom_js: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct CacheTable {
    #[serde(default = "defaults::default_cache_enabled")]
    enabled: bool,
    #[serde(default = "defaults::default_cache_max_entries")]
    max_entries: usize,
    #[serde(default = "defaults::default_cache_max_total_bytes")]
    max_total_bytes: u64,
    #[serde(default = "defaults::default_cache_max_entry_bytes")]
    max_entry_bytes: u64,
    #[serde(default)]
    unlimited: bool,
    #[serde(default = "defaults::default_cache_dir")]
    directory: String,
}

impl Default for CacheTable {
    fn default() -> Self {
        CacheTable {
            enabled: defaults::default_cache_enabled(),
            max_entries: defaults::default_cache_max_entries(),
            max_total_bytes: defaults::default_cache_max_total_bytes(),
            max_entry_bytes: defaults::default_cache_max_entry_bytes(),
            unlimited: false,
            directory: defaults::default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
