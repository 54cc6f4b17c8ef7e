//! Configuration loading for the chapter pipeline.
//!
//! Reader preferences and cache limits are loaded from `conf/config.toml` if
//! present. Any missing or invalid entries fall back to defaults so rendering
//! never fails because of configuration.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{LogLevel, PipelineConfig, TextAlignOverride, ThemeMode};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";
