//! Structured document tree to HTML.

use super::parse::{normalize_node_type, value_as_int, value_as_string};
use crate::url_resolver::ResourceBases;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Attachment id/name to URL, collected from the root `attachments` field.
pub type AttachmentUrls = HashMap<String, String>;

pub fn extract_attachment_urls(root: &Value) -> AttachmentUrls {
    let mut mapping = AttachmentUrls::new();
    let Some(root) = root.as_object() else {
        return mapping;
    };

    match root.get("attachments") {
        Some(Value::Array(entries)) => {
            for attachment in entries.iter().filter_map(Value::as_object) {
                let Some(url) = trimmed_string(attachment.get("url")) else {
                    continue;
                };
                for key in ["id", "name"] {
                    if let Some(id) = trimmed_string(attachment.get(key)) {
                        mapping.insert(id, url.clone());
                    }
                }
            }
        }
        Some(Value::Object(entries)) => {
            for (key, value) in entries {
                let url = value
                    .as_object()
                    .and_then(|entry| trimmed_string(entry.get("url")))
                    .or_else(|| trimmed_string(Some(value)));
                if let Some(url) = url {
                    mapping.insert(key.trim().to_string(), url);
                }
            }
        }
        _ => {}
    }
    mapping
}

/// Renders nodes, resolving image URLs through the optional resource bases.
pub struct NodeRenderer<'a> {
    pub attachments: &'a AttachmentUrls,
    pub resources: Option<&'a ResourceBases>,
}

impl NodeRenderer<'_> {
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Object(node) => self.render_node(node),
            Value::Array(nodes) => nodes.iter().map(|node| self.render(node)).collect(),
            _ => String::new(),
        }
    }

    fn render_node(&self, node: &Map<String, Value>) -> String {
        let kind = normalize_node_type(node.get("type")).unwrap_or_default();
        let attrs = node.get("attrs").and_then(Value::as_object);
        let children = || match node.get("content") {
            Some(content @ Value::Array(_)) => self.render(content),
            _ => String::new(),
        };

        match kind.as_str() {
            "doc" => children(),
            "paragraph" => format!("<p>{}</p>", children()),
            "heading" => {
                let level = attrs
                    .and_then(|attrs| attrs.get("level"))
                    .and_then(value_as_int)
                    .map_or(1, |level| level.clamp(1, 6));
                format!("<h{level}>{}</h{level}>", children())
            }
            "bulletlist" => format!("<ul>{}</ul>", children()),
            "orderedlist" => format!("<ol>{}</ol>", children()),
            "listitem" => format!("<li>{}</li>", children()),
            "blockquote" => format!("<blockquote>{}</blockquote>", children()),
            "hardbreak" => "<br/>".to_string(),
            "horizontalrule" => "<hr/>".to_string(),
            "image" => self.render_image(attrs),
            "text" => {
                let text = node.get("text").and_then(value_as_string).unwrap_or_default();
                apply_marks(escape_html(&text), node.get("marks"))
            }
            _ => match node
                .get("text")
                .and_then(value_as_string)
                .filter(|text| !text.trim().is_empty())
            {
                Some(text) => apply_marks(escape_html(&text), node.get("marks")),
                None => children(),
            },
        }
    }

    fn render_image(&self, attrs: Option<&Map<String, Value>>) -> String {
        let Some(attrs) = attrs else {
            return String::new();
        };
        let alt = escape_html(&attrs.get("alt").and_then(value_as_string).unwrap_or_default());
        if let Some(src) = trimmed_string(attrs.get("src")) {
            return self.image_tag(&src, &alt);
        }

        let mut references: Vec<String> = Vec::new();
        references.extend(trimmed_string(attrs.get("image")));
        match attrs.get("images") {
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let reference = match entry {
                        Value::Object(entry) => trimmed_string(entry.get("image")),
                        other => trimmed_string(Some(other)),
                    };
                    references.extend(reference);
                }
            }
            Some(Value::Object(entry)) => references.extend(trimmed_string(entry.get("image"))),
            _ => {}
        }

        references
            .iter()
            .filter_map(|reference| self.attachments.get(reference))
            .map(|url| self.image_tag(url, &alt))
            .collect()
    }

    pub(crate) fn image_tag(&self, raw_src: &str, escaped_alt: &str) -> String {
        let src = self
            .resources
            .and_then(|bases| bases.resolve(raw_src))
            .unwrap_or_else(|| raw_src.to_string());
        format!("<img src=\"{}\" alt=\"{escaped_alt}\" />", escape_html(&src))
    }
}

/// Wrap already-escaped text in each mark's tag; later marks wrap earlier ones.
fn apply_marks(text: String, marks: Option<&Value>) -> String {
    let Some(Value::Array(marks)) = marks else {
        return text;
    };
    marks
        .iter()
        .filter_map(Value::as_object)
        .fold(text, |rendered, mark| {
            match normalize_node_type(mark.get("type")).as_deref() {
                Some("bold" | "strong") => format!("<strong>{rendered}</strong>"),
                Some("italic" | "em") => format!("<em>{rendered}</em>"),
                Some("underline") => format!("<u>{rendered}</u>"),
                Some("strike" | "s") => format!("<s>{rendered}</s>"),
                Some("code") => format!("<code>{rendered}</code>"),
                Some("link") => {
                    let href = mark
                        .get("attrs")
                        .and_then(Value::as_object)
                        .and_then(|attrs| attrs.get("href"))
                        .and_then(value_as_string)
                        .unwrap_or_default();
                    if href.trim().is_empty() {
                        rendered
                    } else {
                        format!("<a href=\"{}\">{rendered}</a>", escape_html(&href))
                    }
                }
                _ => rendered,
            }
        })
}

fn trimmed_string(value: Option<&Value>) -> Option<String> {
    let text = value.and_then(value_as_string)?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
