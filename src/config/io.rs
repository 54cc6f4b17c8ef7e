use super::models::PipelineConfig;
use super::tables::ConfigTables;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load the config file, falling back to defaults when it is missing or invalid.
pub fn load_config(path: &Path) -> PipelineConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return PipelineConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            PipelineConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<PipelineConfig> {
    let tables: ConfigTables = toml::from_str(contents).context("Failed to parse config TOML")?;
    Ok(tables.into())
}

pub fn serialize_config(config: &PipelineConfig) -> Result<String> {
    let tables = ConfigTables::from(config);
    toml::to_string_pretty(&tables).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, TextAlignOverride, ThemeMode};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn sectioned_tables_map_onto_flat_config() {
        let cfg = parse_config(
            r##"
            [appearance]
            theme = "dark"
            font_size = 20
            text_align = "justify"
            background_color = "#000000"
            custom_css = "  "

            [cache]
            max_entries = 5
            unlimited = true

            [logging]
            log_level = "warn"
            "##,
        )
        .expect("valid config");
        assert_eq!(cfg.theme, ThemeMode::Dark);
        assert_eq!(cfg.font_size, 20);
        assert_eq!(cfg.line_height, 1.6);
        assert_eq!(cfg.text_align, TextAlignOverride::Justify);
        assert_eq!(cfg.background_color.as_deref(), Some("#000000"));
        assert_eq!(cfg.custom_css, None);
        assert_eq!(cfg.cache_max_entries, 5);
        assert!(cfg.cache_unlimited);
        assert_eq!(cfg.cache_max_entry_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.log_level, LogLevel::Warn);
    }

    #[test]
    fn serialized_config_parses_back() {
        let cfg = PipelineConfig {
            theme: ThemeMode::Light,
            margin: 24,
            text_color: Some("#222".to_string()),
            ..PipelineConfig::default()
        };
        let text = serialize_config(&cfg).expect("serialize");
        assert!(text.contains("[appearance]"));
        assert_eq!(parse_config(&text).expect("parse"), cfg);
    }

    #[test]
    fn missing_or_broken_files_fall_back_to_defaults() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after epoch")
            .as_nanos();
        let missing = std::env::temp_dir().join(format!("novel-config-missing-{nonce}.toml"));
        assert_eq!(load_config(&missing), PipelineConfig::default());

        let broken = std::env::temp_dir().join(format!("novel-config-broken-{nonce}.toml"));
        fs::write(&broken, "[appearance\ntheme = ").expect("write temp config");
        assert_eq!(load_config(&broken), PipelineConfig::default());
        let _ = fs::remove_file(&broken);
    }
}
