//! The slice of CSS the block renderer honours: inline declarations, and
//! `text-align` / `text-indent` rules from `<style>` blocks keyed by a
//! simple trailing selector.

use super::model::{TextAlign, TextStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static CSS_RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)([^{}]+)\{([^}]*)\}").unwrap());
static TEXT_INDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\btext-indent\s*:\s*([^;}]*)").unwrap());
static TEXT_ALIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\btext-align\s*:\s*([^;}]*)").unwrap());
static SELECTOR_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[>+~]\s*|\s+").unwrap());
static ATTRIBUTE_SELECTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static CLASS_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.([a-z0-9_-]+)$").unwrap());
static TAG_AND_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9_-]+)(?:\.([a-z0-9_-]+))?$").unwrap());

/// Tags whose block style may come from stylesheet rules.
pub const PARAGRAPH_STYLE_TAGS: [&str; 5] = ["p", "div", "article", "section", "main"];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockStyle {
    pub text_align: Option<TextAlign>,
    pub first_line_indent_em: Option<f32>,
}

impl BlockStyle {
    fn is_empty(&self) -> bool {
        self.text_align.is_none() && self.first_line_indent_em.is_none()
    }

    /// Values set on `other` win.
    fn merge(self, other: BlockStyle) -> BlockStyle {
        BlockStyle {
            text_align: other.text_align.or(self.text_align),
            first_line_indent_em: other.first_line_indent_em.or(self.first_line_indent_em),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SelectorStyle {
    tag: Option<String>,
    class_name: Option<String>,
    style: BlockStyle,
}

/// Block styles collected from a document's `<style>` elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    selectors: Vec<SelectorStyle>,
}

impl StyleSheet {
    pub fn parse(css: &str) -> Self {
        let mut selectors = Vec::new();
        for rule in CSS_RULE_RE.captures_iter(css) {
            let declarations = &rule[2];
            let style = BlockStyle {
                text_align: first_capture(&TEXT_ALIGN_RE, declarations)
                    .as_deref()
                    .and_then(parse_text_align),
                first_line_indent_em: first_capture(&TEXT_INDENT_RE, declarations)
                    .as_deref()
                    .and_then(parse_length_as_em),
            };
            if style.is_empty() {
                continue;
            }

            for selector in rule[1].split(',') {
                let selector = selector.trim().to_lowercase();
                if selector.is_empty() {
                    continue;
                }
                if let Some((tag, class_name)) = parse_trailing_selector(&selector) {
                    selectors.push(SelectorStyle {
                        tag,
                        class_name,
                        style,
                    });
                }
            }
        }
        Self { selectors }
    }

    /// Cascade every matching rule in source order; later rules win.
    pub fn resolve<'a>(&self, tag: &str, classes: impl Iterator<Item = &'a str>) -> BlockStyle {
        if !PARAGRAPH_STYLE_TAGS.contains(&tag) {
            return BlockStyle::default();
        }
        let classes: Vec<String> = classes.map(str::to_lowercase).collect();
        self.selectors
            .iter()
            .filter(|rule| rule.tag.as_deref().is_none_or(|rule_tag| rule_tag == tag))
            .filter(|rule| {
                rule.class_name
                    .as_ref()
                    .is_none_or(|class_name| classes.contains(class_name))
            })
            .fold(BlockStyle::default(), |resolved, rule| resolved.merge(rule.style))
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

/// Reduce a selector to its last compound (`tag`, `.class` or `tag.class`).
fn parse_trailing_selector(selector: &str) -> Option<(Option<String>, Option<String>)> {
    let trailing = SELECTOR_SPLIT_RE
        .split(selector)
        .filter(|part| !part.is_empty())
        .last()?
        .trim()
        .to_lowercase();
    let without_attributes = ATTRIBUTE_SELECTOR_RE.replace_all(&trailing, "");
    let cleaned = without_attributes
        .split(':')
        .next()
        .unwrap_or_default()
        .trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(caps) = CLASS_ONLY_RE.captures(cleaned) {
        return Some((None, Some(caps[1].to_string())));
    }
    let caps = TAG_AND_CLASS_RE.captures(cleaned)?;
    let tag = caps[1].to_string();
    if !PARAGRAPH_STYLE_TAGS.contains(&tag.as_str()) {
        return None;
    }
    let class_name = caps.get(2).map(|m| m.as_str().to_string());
    Some((Some(tag), class_name))
}

/// `key: value; ...` with keys lowercased; empty keys or values are skipped.
pub fn parse_inline_css(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':')?;
            let key = key.trim().to_lowercase();
            let value = value.trim();
            (!key.is_empty() && !value.is_empty()).then(|| (key, value.to_string()))
        })
        .collect()
}

pub fn parse_text_align(raw: &str) -> Option<TextAlign> {
    match raw.trim().to_lowercase().as_str() {
        "left" | "start" => Some(TextAlign::Left),
        "center" => Some(TextAlign::Center),
        "justify" => Some(TextAlign::Justify),
        "right" | "end" => Some(TextAlign::Right),
        _ => None,
    }
}

/// Convert a CSS length to em: px/16, pt/12, %/100, em and rem as-is.
pub fn parse_length_as_em(raw: &str) -> Option<f32> {
    let lowered = raw.trim().to_lowercase().replace("!important", "");
    let normalized = lowered.trim();
    if normalized.is_empty() || normalized == "0" || normalized == "0.0" {
        return Some(0.0);
    }
    let number = |suffix: &str| {
        normalized
            .strip_suffix(suffix)
            .and_then(|value| value.trim().parse::<f32>().ok())
    };
    if normalized.ends_with("rem") {
        number("rem")
    } else if normalized.ends_with("em") {
        number("em")
    } else if normalized.ends_with("px") {
        number("px").map(|px| px / 16.0)
    } else if normalized.ends_with("pt") {
        number("pt").map(|pt| pt / 12.0)
    } else if normalized.ends_with('%') {
        number("%").map(|percent| percent / 100.0)
    } else {
        None
    }
}

pub fn block_text_align(inline_style: Option<&str>) -> Option<TextAlign> {
    let css = parse_inline_css(inline_style?);
    css.get("text-align").and_then(|value| parse_text_align(value))
}

pub fn block_first_line_indent(inline_style: Option<&str>) -> Option<f32> {
    let css = parse_inline_css(inline_style?);
    css.get("text-indent").and_then(|value| parse_length_as_em(value))
}

/// Fold an inline element's tag and `style` attribute into the inherited style.
pub fn apply_inline_style(base: &TextStyle, tag: &str, inline_style: Option<&str>) -> TextStyle {
    let mut style = base.clone();
    match tag {
        "b" | "strong" => style.bold = true,
        "i" | "em" => style.italic = true,
        "u" => style.underline = true,
        "s" | "strike" | "del" => style.strike_through = true,
        _ => {}
    }

    let Some(inline_style) = inline_style.filter(|value| !value.trim().is_empty()) else {
        return style;
    };
    for (key, value) in parse_inline_css(inline_style) {
        match key.as_str() {
            "color" => style.color_css = Some(value),
            "background" | "background-color" => style.background_color_css = Some(value),
            "font-weight" => {
                if value == "bold" || value.parse::<i32>().is_ok_and(|weight| weight >= 600) {
                    style.bold = true;
                }
            }
            "font-style" => {
                if value == "italic" || value == "oblique" {
                    style.italic = true;
                }
            }
            "text-decoration" => {
                let decorations: Vec<&str> = value.split(' ').map(str::trim).collect();
                if decorations.contains(&"underline") {
                    style.underline = true;
                }
                if decorations.contains(&"line-through") {
                    style.strike_through = true;
                }
            }
            _ => {}
        }
    }
    style
}

/// Inline layout the block renderer cannot honour.
pub fn has_unsupported_layout(inline_style: &str) -> bool {
    let lowered = inline_style.to_lowercase();
    ["position:", "display:flex", "display:grid", "display: grid", "float:"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_lengths_to_em() {
        assert_eq!(parse_length_as_em("24px"), Some(1.5));
        assert_eq!(parse_length_as_em("24pt"), Some(2.0));
        assert_eq!(parse_length_as_em("50%"), Some(0.5));
        assert_eq!(parse_length_as_em("1.25rem"), Some(1.25));
        assert_eq!(parse_length_as_em("2em !important"), Some(2.0));
        assert_eq!(parse_length_as_em("0"), Some(0.0));
        assert_eq!(parse_length_as_em("auto"), None);
    }

    #[test]
    fn trailing_selectors_reduce_to_last_compound() {
        assert_eq!(
            parse_trailing_selector(".entry > p.indent:first-child"),
            Some((Some("p".to_string()), Some("indent".to_string())))
        );
        assert_eq!(
            parse_trailing_selector("div .note"),
            Some((None, Some("note".to_string())))
        );
        assert_eq!(parse_trailing_selector("span"), None);
        assert_eq!(parse_trailing_selector("p[data-x]"), Some((Some("p".to_string()), None)));
    }

    #[test]
    fn stylesheet_cascades_in_source_order() {
        let sheet = StyleSheet::parse(
            "p { text-indent: 1em; } .lead { text-align: center } p.lead { text-indent: 2em } span { text-indent: 9em }",
        );
        let style = sheet.resolve("p", ["lead"].into_iter());
        assert_eq!(style.first_line_indent_em, Some(2.0));
        assert_eq!(style.text_align, Some(TextAlign::Center));

        let plain = sheet.resolve("p", std::iter::empty());
        assert_eq!(plain.first_line_indent_em, Some(1.0));
        assert_eq!(plain.text_align, None);

        assert_eq!(sheet.resolve("h1", ["lead"].into_iter()), BlockStyle::default());
    }

    #[test]
    fn inline_styles_merge_into_text_style() {
        let style = apply_inline_style(
            &TextStyle::default(),
            "span",
            Some("font-weight: 700; color: #f00; text-decoration: underline line-through"),
        );
        assert!(style.bold);
        assert!(style.underline);
        assert!(style.strike_through);
        assert_eq!(style.color_css.as_deref(), Some("#f00"));

        let light = apply_inline_style(&TextStyle::default(), "span", Some("font-weight: 400"));
        assert!(!light.bold);
    }

    #[test]
    fn flags_layout_styles() {
        assert!(has_unsupported_layout("Display:Flex"));
        assert!(has_unsupported_layout("float: left"));
        assert!(!has_unsupported_layout("color: red"));
    }
}
