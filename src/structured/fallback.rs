//! Regex salvage for payloads no parsing strategy could read.

use once_cell::sync::Lazy;
use regex::Regex;

static TEXT_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)"text"\s*:\s*"((?:\\.|[^"\\])*)""#).unwrap());
static URL_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)"url"\s*:\s*"((?:\\.|[^"\\])*)""#).unwrap());
static DIRECT_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+\.(?:png|jpe?g|gif|webp|bmp|svg)"#).unwrap()
});

/// Bytes of preceding payload inspected to classify a text value as a list item.
const LIST_CONTEXT_WINDOW: usize = 220;

pub fn text_segments(payload: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for caps in TEXT_FIELD_RE.captures_iter(payload) {
        let (Some(whole), Some(raw)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let decoded = raw
            .as_str()
            .replace("\\\\", "\\")
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\r", "")
            .replace("\\\"", "\"")
            .replace("\\u00A0", " ");
        let decoded = sanitize_text(&decoded);
        if decoded.is_empty() {
            continue;
        }

        let context = preceding_context(payload, whole.start()).to_lowercase();
        let in_list = context.contains("listitem") || context.contains("bulletlist");
        if in_list && !decoded.starts_with('•') {
            segments.push(format!("• {decoded}"));
        } else {
            segments.push(decoded);
        }
    }
    segments
}

pub fn image_urls(payload: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if !url.is_empty() && !urls.contains(&url) {
            urls.push(url);
        }
    };

    for caps in URL_FIELD_RE.captures_iter(payload) {
        let Some(raw) = caps.get(1) else {
            continue;
        };
        let url = raw
            .as_str()
            .replace("\\\\", "\\")
            .replace("\\/", "/")
            .replace("\\\"", "\"")
            .trim()
            .to_string();
        if url.starts_with("http://") || url.starts_with("https://") {
            push(url);
        }
    }
    for found in DIRECT_IMAGE_RE.find_iter(payload) {
        push(found.as_str().trim().to_string());
    }
    urls
}

/// NBSP to space, carriage returns dropped, trimmed.
pub fn sanitize_text(text: &str) -> String {
    text.replace('\u{00A0}', " ")
        .replace('\r', "")
        .trim()
        .to_string()
}

fn preceding_context(payload: &str, end: usize) -> &str {
    let mut start = end.saturating_sub(LIST_CONTEXT_WINDOW);
    while !payload.is_char_boundary(start) {
        start += 1;
    }
    &payload[start..end]
}
