//! Reader theming for the web renderer.
//!
//! The canonical chapter HTML gets one `<style>` block (plus an optional
//! `<script>`) carrying the reader preferences and plugin/user overrides.

use crate::config::PipelineConfig;
use once_cell::sync::Lazy;
use regex::Regex;

static HEAD_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head>").unwrap());
static HEAD_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());
static BODY_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body>").unwrap());

/// Per-plugin metadata the pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginAssets {
    pub custom_css: Option<String>,
    pub custom_js: Option<String>,
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePalette {
    pub background: &'static str,
    pub text: &'static str,
    pub link: &'static str,
}

pub const DARK_PALETTE: ThemePalette = ThemePalette {
    background: "#121212",
    text: "#EDEDED",
    link: "#80B4FF",
};

pub const LIGHT_PALETTE: ThemePalette = ThemePalette {
    background: "#FFFFFF",
    text: "#1A1A1A",
    link: "#1E3A8A",
};

pub fn palette_for(config: &PipelineConfig, system_dark: bool) -> ThemePalette {
    if config.theme.is_dark(system_dark) {
        DARK_PALETTE
    } else {
        LIGHT_PALETTE
    }
}

/// Base stylesheet for the reader body.
pub fn reader_base_style(config: &PipelineConfig, system_dark: bool) -> String {
    let palette = palette_for(config, system_dark);
    let background = non_blank(config.background_color.as_deref()).unwrap_or(palette.background);
    let text_color = non_blank(config.text_color.as_deref()).unwrap_or(palette.text);
    let text_align = config
        .text_align
        .as_css()
        .map(|align| format!("\n  text-align: {align};"))
        .unwrap_or_default();

    format!(
        "body {{\n  padding: {margin}px;\n  line-height: {line_height};\n  font-size: {font_size}px;\n  background: {background};\n  color: {text_color};\n  word-break: break-word;{text_align}\n}}\nimg {{ max-width: 100%; height: auto; }}\na {{ color: {link}; }}",
        margin = config.margin,
        line_height = config.line_height,
        font_size = config.font_size,
        link = palette.link,
    )
}

/// Inject reader styling and custom plugin/user assets into `html`.
///
/// Full documents get the injection placed into their head; fragments are
/// wrapped in a minimal standalone document.
pub fn inject_reader_theme(
    html: &str,
    config: &PipelineConfig,
    plugin: &PluginAssets,
    system_dark: bool,
) -> String {
    let mut style = reader_base_style(config, system_dark);
    for css in [plugin.custom_css.as_deref(), config.custom_css.as_deref()]
        .into_iter()
        .filter_map(non_blank)
    {
        style.push('\n');
        style.push_str(css);
    }

    let scripts: Vec<&str> = [plugin.custom_js.as_deref(), config.custom_js.as_deref()]
        .into_iter()
        .filter_map(non_blank)
        .collect();
    let script = if scripts.is_empty() {
        String::new()
    } else {
        format!("<script>\n{}\n</script>", scripts.join("\n"))
    };

    if html.to_ascii_lowercase().contains("<html") {
        let mut injection = format!("<style>\n{style}\n</style>");
        if !script.is_empty() {
            injection.push('\n');
            injection.push_str(&script);
        }
        return inject_into_document(html, &injection);
    }

    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n<style>{style}</style>\n{script}\n</head>\n<body>\n{html}\n</body>\n</html>"
    )
}

fn inject_into_document(html: &str, injection: &str) -> String {
    if let Some(found) = HEAD_CLOSE_RE.find(html) {
        return splice(html, found.start(), injection);
    }
    if let Some(found) = HEAD_OPEN_RE.find(html) {
        return splice(html, found.end(), injection);
    }
    if let Some(found) = BODY_CLOSE_RE.find(html) {
        return splice(html, found.start(), injection);
    }
    format!("{injection}{html}")
}

fn splice(html: &str, at: usize, injection: &str) -> String {
    let mut out = String::with_capacity(html.len() + injection.len());
    out.push_str(&html[..at]);
    out.push_str(injection);
    out.push_str(&html[at..]);
    out
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TextAlignOverride, ThemeMode};

    #[test]
    fn fragments_are_wrapped_in_a_standalone_document() {
        let config = PipelineConfig {
            theme: ThemeMode::Dark,
            ..PipelineConfig::default()
        };
        let html = inject_reader_theme("<p>Hi</p>", &config, &PluginAssets::default(), false);
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("<meta charset=\"utf-8\" />"));
        assert!(html.contains("background: #121212;"));
        assert!(html.contains("a { color: #80B4FF; }"));
        assert!(html.contains("<body>\n<p>Hi</p>\n</body>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn system_theme_follows_host_flag() {
        let config = PipelineConfig::default();
        let light = reader_base_style(&config, false);
        let dark = reader_base_style(&config, true);
        assert!(light.contains("color: #1A1A1A;"));
        assert!(dark.contains("color: #EDEDED;"));
    }

    #[test]
    fn configured_colors_and_alignment_override_palette() {
        let config = PipelineConfig {
            theme: ThemeMode::Light,
            background_color: Some("#F4ECD8".to_string()),
            text_color: Some("  ".to_string()),
            text_align: TextAlignOverride::Justify,
            font_size: 18,
            margin: 8,
            ..PipelineConfig::default()
        };
        let style = reader_base_style(&config, true);
        assert!(style.contains("background: #F4ECD8;"));
        assert!(style.contains("color: #1A1A1A;"));
        assert!(style.contains("text-align: justify;"));
        assert!(style.contains("font-size: 18px;"));
        assert!(style.contains("padding: 8px;"));
    }

    #[test]
    fn full_documents_get_injection_before_head_close() {
        let plugin = PluginAssets {
            custom_css: Some(".ad { display: none; }".to_string()),
            custom_js: Some("console.log('plugin');".to_string()),
            site_url: None,
        };
        let config = PipelineConfig {
            custom_css: Some("p { margin: 0; }".to_string()),
            ..PipelineConfig::default()
        };
        let html = inject_reader_theme(
            "<HTML><HEAD><title>x</title></HEAD><body><p>a</p></body></HTML>",
            &config,
            &plugin,
            false,
        );
        let style_at = html.find("<style>").expect("style injected");
        assert!(style_at < html.find("</HEAD>").expect("head kept"));
        assert!(html.find(".ad").expect("plugin css") < html.find("p { margin: 0; }").expect("user css"));
        assert!(html.contains("<script>\nconsole.log('plugin');\n</script></HEAD>"));
    }

    #[test]
    fn documents_without_head_close_use_fallback_anchors() {
        let config = PipelineConfig::default();
        let plugin = PluginAssets::default();

        let open_only = inject_reader_theme("<html><head lang=\"en\"><body>x", &config, &plugin, false);
        assert!(open_only.starts_with("<html><head lang=\"en\"><style>"));

        let body_only = inject_reader_theme("<html><body>x</body></html>", &config, &plugin, false);
        assert!(body_only.contains("</style></body></html>"));

        let bare = inject_reader_theme("<html>x", &config, &plugin, false);
        assert!(bare.starts_with("<style>"));
    }

    #[test]
    fn header_elements_are_not_mistaken_for_head() {
        let config = PipelineConfig::default();
        let html = inject_reader_theme(
            "<html><header class=\"top\">Title</header><body>x</body></html>",
            &config,
            &PluginAssets::default(),
            false,
        );
        assert!(html.starts_with("<html><header class=\"top\">Title</header><body>x<style>"));
        assert!(html.contains("</style></body></html>"));
    }
}
