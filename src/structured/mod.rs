//! Structured chapter payload normalization.
//!
//! Some sources deliver chapters as rich-document JSON (ProseMirror/TipTap
//! style node trees), sometimes double encoded, sometimes as a JavaScript
//! object literal, sometimes wrapped in an envelope object. The normalizer
//! turns any of those into canonical HTML. HTML input always passes through
//! untouched, and input nothing can make sense of is returned verbatim.

mod fallback;
mod parse;
mod render;

pub use fallback::sanitize_text;
pub use parse::{extract_json_candidate, find_structured_node, jsonify_js_like, parse_structured_root};
pub use render::{AttachmentUrls, escape_html, extract_attachment_urls};

use crate::url_resolver::ResourceBases;
use once_cell::sync::Lazy;
use regex::Regex;
use render::NodeRenderer;

static HTML_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<\s*(html|body|div|main|article|section|p|ul|ol|li|h1|h2|h3|h4|h5|h6|span)\b")
        .unwrap()
});

/// True when the value has the shape of a JSON / JS-literal rich document.
pub fn looks_like_structured_payload(raw: &str) -> bool {
    let trimmed = raw.trim().trim_start_matches('\u{FEFF}').trim();
    if trimmed.is_empty() {
        return false;
    }
    const OPENERS: [&str; 8] = ["{", "[", "\"{", "\"[", "'{", "'[", "{\\\"", "[\\\""];
    OPENERS.iter().any(|opener| trimmed.starts_with(opener))
        || ((trimmed.contains("\"type\"") || trimmed.contains("'type'")) && trimmed.contains("content"))
}

/// True when the value already contains block-level HTML markup.
pub fn looks_like_html_payload(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.contains('<') && trimmed.contains('>') && HTML_BLOCK_RE.is_match(trimmed)
}

/// Structured payload to HTML converter.
///
/// With resource bases set, image sources are resolved to absolute URLs and
/// kept raw when no base works.
#[derive(Debug, Clone, Default)]
pub struct StructuredNormalizer {
    resources: Option<ResourceBases>,
}

impl StructuredNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: ResourceBases) -> Self {
        Self {
            resources: Some(resources),
        }
    }

    /// Canonical HTML for `raw`; never fails.
    pub fn normalize(&self, raw: &str) -> String {
        if looks_like_html_payload(raw) {
            return raw.to_string();
        }

        if let Some(root) = parse_structured_root(raw) {
            let Some(node) = find_structured_node(&root) else {
                tracing::debug!("Structured root has no document node; keeping payload verbatim");
                return raw.to_string();
            };
            let rendered = self.render_root(&root, &node);
            if !rendered.is_empty() {
                return format!("<div>{rendered}</div>");
            }
        }

        match self.render_fallback(raw) {
            Some(rendered) => {
                tracing::debug!("Recovered structured payload through regex fallback");
                format!("<div>{rendered}</div>")
            }
            None => raw.to_string(),
        }
    }

    /// Render a structured fragment (for instance JSON that leaked into a
    /// paragraph) to bare HTML. `None` when the text is not structured or
    /// renders to nothing.
    pub fn render_fragment(&self, raw: &str) -> Option<String> {
        if !looks_like_structured_payload(raw) {
            return None;
        }
        let rendered = match parse_structured_root(raw) {
            Some(root) => {
                let node = find_structured_node(&root)?;
                self.render_root(&root, &node)
            }
            None => self.render_fallback(raw)?,
        };
        (!rendered.is_empty()).then_some(rendered)
    }

    fn render_root(&self, root: &serde_json::Value, node: &serde_json::Value) -> String {
        let attachments = extract_attachment_urls(root);
        NodeRenderer {
            attachments: &attachments,
            resources: self.resources.as_ref(),
        }
        .render(node)
        .trim()
        .to_string()
    }

    fn render_fallback(&self, raw: &str) -> Option<String> {
        let candidate = extract_json_candidate(raw).unwrap_or_else(|| raw.trim().to_string());
        if !looks_like_structured_payload(&candidate) {
            return None;
        }
        let normalized = jsonify_js_like(&candidate).unwrap_or(candidate);
        let texts = fallback::text_segments(&normalized);
        let images = fallback::image_urls(&normalized);
        if texts.is_empty() && images.is_empty() {
            return None;
        }

        let attachments = AttachmentUrls::new();
        let renderer = NodeRenderer {
            attachments: &attachments,
            resources: self.resources.as_ref(),
        };
        let mut html = String::new();
        for text in &texts {
            html.push_str(&format!("<p>{}</p>", escape_html(text)));
        }
        for url in &images {
            html.push_str(&renderer.image_tag(url, ""));
        }
        let html = html.trim().to_string();
        (!html.is_empty()).then_some(html)
    }
}

/// Normalize with no resource resolution.
pub fn normalize(raw: &str) -> String {
    StructuredNormalizer::default().normalize(raw)
}

/// Fragment rendering with no resource resolution.
pub fn render_structured_fragment(raw: &str) -> Option<String> {
    StructuredNormalizer::default().render_fragment(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_passes_through_untouched() {
        let html = "<p>Hello {\"type\":\"doc\",\"content\":[]}</p>";
        assert_eq!(normalize(html), html);
        let doc = "<html><body><div>Body</div></body></html>";
        assert_eq!(normalize(doc), doc);
    }

    #[test]
    fn bold_text_renders_as_strong() {
        let raw = r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Loud","marks":[{"type":"bold"}]}]}]}"#;
        assert_eq!(normalize(raw), "<div><p><strong>Loud</strong></p></div>");
    }

    #[test]
    fn envelope_with_string_content_is_unwrapped() {
        let inner = r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Inside"}]}]}"#;
        let raw = serde_json::json!({ "ok": true, "result": inner }).to_string();
        assert_eq!(normalize(&raw), "<div><p>Inside</p></div>");
    }

    #[test]
    fn truncated_json_falls_back_to_text_salvage() {
        let raw = r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"Survivor"}]},{"type":"image","attrs":{"src":"https://cdn.example.org/p.png"}}"#;
        let normalized = normalize(raw);
        assert_eq!(
            normalized,
            "<div><p>Survivor</p><img src=\"https://cdn.example.org/p.png\" alt=\"\" /></div>"
        );
    }

    #[test]
    fn plain_text_is_returned_verbatim() {
        assert_eq!(normalize("Once upon a time."), "Once upon a time.");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn detection_heuristics() {
        assert!(looks_like_structured_payload("\u{FEFF} {\"a\":1}"));
        assert!(looks_like_structured_payload("'[1,2]'"));
        assert!(looks_like_structured_payload("prefix \"type\": \"doc\", content"));
        assert!(!looks_like_structured_payload("type and content"));
        assert!(looks_like_html_payload("<P class=x>hi</P>"));
        assert!(!looks_like_html_payload("a < b > c"));
    }

    #[test]
    fn fragment_rendering_requires_structure() {
        assert_eq!(render_structured_fragment("just words"), None);
        assert_eq!(
            render_structured_fragment(r#"[{"type":"paragraph","content":[{"type":"text","text":"x"}]}]"#)
                .as_deref(),
            Some("<p>x</p>")
        );
    }
}
