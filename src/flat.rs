//! Flat reading-line extraction for text-oriented consumers.
//!
//! Unlike the rich parser this keeps no styling: every paragraph-like element
//! becomes one line of text, images become resolved image entries, and list
//! items get a bullet.

use crate::structured::{StructuredNormalizer, looks_like_structured_payload, sanitize_text};
use crate::url_resolver::ResourceBases;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

const TEXT_SELECTOR: &str = "p, li, blockquote, h1, h2, h3, h4, h5, h6, pre";
const CONTENT_SELECTOR: &str = "p, li, blockquote, h1, h2, h3, h4, h5, h6, pre, img";

static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static INLINE_WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\n\r\x0C]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlatBlock {
    Text { text: String },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
}

impl FlatBlock {
    pub fn text(text: impl Into<String>) -> Self {
        FlatBlock::Text { text: text.into() }
    }
}

/// Ordered text and image blocks of the document body, falling back to
/// [`extract_text_blocks`] when the body yields nothing.
pub fn extract_content_blocks(html: &str, bases: &ResourceBases) -> Vec<FlatBlock> {
    let normalizer = StructuredNormalizer::with_resources(bases.clone());
    let document = Html::parse_document(html);
    let candidates = selector(CONTENT_SELECTOR);
    let mut blocks = Vec::new();

    let Some(body) = document.select(&selector("body")).next() else {
        return fallback_blocks(html);
    };
    for element in body.select(&candidates).filter(|element| !is_paragraph_in_list_item(*element)) {
        if is_tag(element, "img") {
            blocks.extend(image_block(element, bases));
            continue;
        }
        let text = element_text(element);
        if text.is_empty() {
            continue;
        }
        if looks_like_structured_payload(&text) {
            let recovered = structured_fragment_blocks(&normalizer, &text, bases);
            if !recovered.is_empty() {
                blocks.extend(recovered);
                continue;
            }
        }
        blocks.push(FlatBlock::text(bullet_if_list_item(element, text)));
    }

    if blocks.is_empty() {
        return fallback_blocks(html);
    }
    blocks
}

/// Plain text lines: paragraph-like elements, else the body text split on
/// blank lines and newlines.
pub fn extract_text_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let paragraphs: Vec<String> = document
        .select(&selector(TEXT_SELECTOR))
        .filter(|element| !is_paragraph_in_list_item(*element))
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();
    if !paragraphs.is_empty() {
        return paragraphs;
    }

    let whole: String = match document.select(&selector("body")).next() {
        Some(body) => body.text().collect(),
        None => document.root_element().text().collect(),
    };
    let whole = sanitize_text(&whole);
    if whole.is_empty() {
        return Vec::new();
    }
    BLANK_LINES_RE
        .split(&whole)
        .flat_map(|block| block.split('\n'))
        .map(sanitize_text)
        .filter(|line| !line.is_empty())
        .collect()
}

fn fallback_blocks(html: &str) -> Vec<FlatBlock> {
    extract_text_blocks(html).into_iter().map(FlatBlock::text).collect()
}

fn structured_fragment_blocks(
    normalizer: &StructuredNormalizer,
    text: &str,
    bases: &ResourceBases,
) -> Vec<FlatBlock> {
    let Some(rendered) = normalizer.render_fragment(text) else {
        return Vec::new();
    };
    let fragment = Html::parse_document(&format!("<div>{rendered}</div>"));
    fragment
        .select(&selector(CONTENT_SELECTOR))
        .filter(|element| !is_paragraph_in_list_item(*element))
        .filter_map(|element| {
            if is_tag(element, "img") {
                return image_block(element, bases);
            }
            let text = element_text(element);
            (!text.is_empty()).then(|| FlatBlock::text(bullet_if_list_item(element, text)))
        })
        .collect()
}

fn image_block(element: ElementRef<'_>, bases: &ResourceBases) -> Option<FlatBlock> {
    let value = element.value();
    let raw = ["src", "data-src", "data-original"]
        .iter()
        .filter_map(|attr| value.attr(attr))
        .map(str::trim)
        .find(|url| !url.is_empty())?;
    let url = bases.resolve(raw)?;
    let alt = value
        .attr("alt")
        .map(sanitize_text)
        .filter(|alt| !alt.is_empty());
    Some(FlatBlock::Image { url, alt })
}

fn bullet_if_list_item(element: ElementRef<'_>, text: String) -> String {
    if is_tag(element, "li") {
        format!("• {text}")
    } else {
        text
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    sanitize_text(&INLINE_WHITESPACE_RE.replace_all(&raw, " "))
}

fn is_paragraph_in_list_item(element: ElementRef<'_>) -> bool {
    is_tag(element, "p")
        && element
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|parent| is_tag(parent, "li"))
}

fn is_tag(element: ElementRef<'_>, tag: &str) -> bool {
    element.value().name().eq_ignore_ascii_case(tag)
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}
