//! Rich content parser: canonical chapter HTML to semantic content blocks
//! for the native renderer.
//!
//! Paragraph-like containers collect inline text into pending segments and
//! flush a paragraph whenever an image or a nested block interrupts them, so
//! source order survives arbitrary `<div>` nesting. Everything the native
//! renderer cannot lay out (tables, iframes, floats, flex/grid) is reported
//! through `unsupported_features_detected`.

mod css;
mod indent;
mod model;

pub use css::{BlockStyle, StyleSheet, parse_inline_css, parse_length_as_em, parse_text_align};
pub use indent::{indent_space_em, infer_leading_indent};
pub use model::{
    ContentBlock, RichParseResult, TextAlign, TextSegment, TextStyle, merge_adjacent_segments,
};

use crate::structured::{looks_like_structured_payload, render_structured_fragment};
use crate::url_resolver::ResourceBases;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

const SKIPPED_TAGS: [&str; 8] = [
    "script", "style", "head", "meta", "link", "noscript", "title", "template",
];
const CONTAINER_BLOCK_TAGS: [&str; 13] = [
    "p",
    "div",
    "article",
    "section",
    "main",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "hr",
];
const UNSUPPORTED_TAGS: [&str; 3] = ["table", "iframe", "svg"];
const IMAGE_SOURCE_ATTRS: [&str; 5] = ["src", "data-src", "data-original", "data-lazy-src", "data-url"];
const BULLET: &str = "• ";

static HTML_WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\n\r\x0C]+").unwrap());

struct ParseContext {
    stylesheet: StyleSheet,
    /// Set while parsing HTML rendered from a recovered structured fragment.
    recovering: bool,
}

pub fn parse_rich_content(html: &str) -> RichParseResult {
    parse_with_context(html, false)
}

fn parse_with_context(html: &str, recovering: bool) -> RichParseResult {
    let document = Html::parse_document(html);
    let context = ParseContext {
        stylesheet: collect_stylesheet(&document),
        recovering,
    };
    let body = document.select(&selector("body")).next();

    let mut roots: Vec<ElementRef<'_>> = body
        .map(|body| body.children().filter_map(ElementRef::wrap).collect())
        .unwrap_or_default();
    if roots.is_empty() {
        roots.push(document.root_element());
    }

    let mut blocks: Vec<ContentBlock> = roots
        .into_iter()
        .flat_map(|root| parse_block(root, &context))
        .collect();

    if blocks.is_empty()
        && let Some(body) = body
    {
        let segments = inline_segments(body);
        if !segments.is_empty() {
            blocks.push(ContentBlock::Paragraph {
                segments,
                text_align: None,
                first_line_indent_em: None,
            });
        }
    }

    RichParseResult {
        blocks,
        unsupported_features_detected: detect_unsupported(&document),
    }
}

/// Resolve image URLs in place, keeping the raw URL when nothing resolves.
pub fn resolve_image_urls(blocks: &mut [ContentBlock], bases: &ResourceBases) {
    for block in blocks {
        if let ContentBlock::Image { url, .. } = block
            && let Some(resolved) = bases.resolve(url)
        {
            *url = resolved;
        }
    }
}

fn parse_block(element: ElementRef<'_>, context: &ParseContext) -> Vec<ContentBlock> {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "p" | "div" | "article" | "section" | "main" => parse_container(element, &tag, context),
        "li" => {
            let mut blocks = parse_container(element, &tag, context);
            prefix_first_paragraph_with_bullet(&mut blocks);
            blocks
        }
        t if SKIPPED_TAGS.contains(&t) => Vec::new(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let segments = inline_segments(element);
            if segments.is_empty() {
                return Vec::new();
            }
            let level = tag[1..].parse::<u8>().map_or(1, |level| level.clamp(1, 6));
            vec![ContentBlock::Heading {
                level,
                segments,
                text_align: css::block_text_align(element.value().attr("style")),
            }]
        }
        "blockquote" => {
            let segments = inline_segments(element);
            if segments.is_empty() {
                return Vec::new();
            }
            vec![ContentBlock::BlockQuote {
                segments,
                text_align: css::block_text_align(element.value().attr("style")),
            }]
        }
        "hr" => vec![ContentBlock::HorizontalRule],
        "img" => image_block(element).into_iter().collect(),
        _ => {
            let nested: Vec<ContentBlock> = element
                .children()
                .filter_map(ElementRef::wrap)
                .flat_map(|child| parse_block(child, context))
                .collect();
            if !nested.is_empty() {
                return nested;
            }
            let segments = inline_segments(element);
            if segments.is_empty() {
                Vec::new()
            } else {
                vec![ContentBlock::Paragraph {
                    segments,
                    text_align: None,
                    first_line_indent_em: None,
                }]
            }
        }
    }
}

/// Paragraph-like element: inline content accumulates until an image or a
/// nested block (outside `<p>`) forces a flush.
fn parse_container(element: ElementRef<'_>, tag: &str, context: &ParseContext) -> Vec<ContentBlock> {
    let from_sheet = context
        .stylesheet
        .resolve(tag, element.value().classes());
    let inline_style = element.value().attr("style");
    let text_align = css::block_text_align(inline_style).or(from_sheet.text_align);
    let indent_em = css::block_first_line_indent(inline_style).or(from_sheet.first_line_indent_em);

    let mut flusher = ParagraphFlusher {
        blocks: Vec::new(),
        pending: Vec::new(),
        text_align,
        indent_em,
        context,
    };

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(text, &TextStyle::default(), None, &mut flusher.pending),
            Node::Element(child_element) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let child_tag = child_element.name().to_ascii_lowercase();
                if child_tag == "img" {
                    flusher.flush();
                    flusher.blocks.extend(image_block(child_ref));
                    continue;
                }
                if tag != "p" && is_nested_block(&child_tag) {
                    flusher.flush();
                    let nested = parse_block(child_ref, context);
                    flusher.blocks.extend(nested);
                    continue;
                }
                walk_inline(child_ref, &TextStyle::default(), None, &mut flusher.pending);
            }
            _ => {}
        }
    }

    flusher.flush();
    flusher.blocks
}

fn is_nested_block(tag: &str) -> bool {
    CONTAINER_BLOCK_TAGS.contains(&tag) || matches!(tag, "ul" | "ol" | "li")
}

struct ParagraphFlusher<'c> {
    blocks: Vec<ContentBlock>,
    pending: Vec<TextSegment>,
    text_align: Option<TextAlign>,
    indent_em: Option<f32>,
    context: &'c ParseContext,
}

impl ParagraphFlusher<'_> {
    fn flush(&mut self) {
        let merged = merge_adjacent_segments(std::mem::take(&mut self.pending));
        if merged.is_empty() {
            return;
        }

        if !self.context.recovering
            && let Some(recovered) = recover_structured_fragment(&merged)
        {
            self.blocks.extend(recovered);
            return;
        }

        let (segments, first_line_indent_em) = match self.indent_em {
            Some(indent) => (merged, Some(indent)),
            None => match infer_leading_indent(&merged) {
                Some((indent, stripped)) => (stripped, Some(indent)),
                None => (merged, None),
            },
        };
        self.blocks.push(ContentBlock::Paragraph {
            segments,
            text_align: self.text_align,
            first_line_indent_em,
        });
    }
}

/// Structured JSON that leaked into a paragraph is rendered and parsed again
/// so the reader sees prose instead of braces.
fn recover_structured_fragment(segments: &[TextSegment]) -> Option<Vec<ContentBlock>> {
    let text: String = segments.iter().map(|segment| segment.text.as_str()).collect();
    if !looks_like_structured_payload(&text) {
        return None;
    }
    let rendered = render_structured_fragment(&text)?;
    let recovered = parse_with_context(&format!("<div>{rendered}</div>"), true).blocks;
    if recovered.is_empty() {
        return None;
    }
    tracing::debug!(blocks = recovered.len(), "Recovered structured fragment inside paragraph");
    Some(recovered)
}

fn prefix_first_paragraph_with_bullet(blocks: &mut [ContentBlock]) {
    let first_paragraph = blocks.iter_mut().find_map(|block| match block {
        ContentBlock::Paragraph { segments, .. } => segments.first_mut(),
        _ => None,
    });
    if let Some(segment) = first_paragraph
        && !segment.text.trim_start().starts_with('•')
    {
        segment.text = format!("{BULLET}{}", segment.text.trim_start());
    }
}

fn inline_segments(element: ElementRef<'_>) -> Vec<TextSegment> {
    let mut out = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(text, &TextStyle::default(), None, &mut out),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    walk_inline(child, &TextStyle::default(), None, &mut out);
                }
            }
            _ => {}
        }
    }
    merge_adjacent_segments(out)
}

fn walk_inline(
    element: ElementRef<'_>,
    inherited: &TextStyle,
    inherited_link: Option<&str>,
    out: &mut Vec<TextSegment>,
) {
    let tag = element.value().name().to_ascii_lowercase();
    if tag == "br" {
        out.push(TextSegment {
            text: "\n".to_string(),
            style: inherited.clone(),
            link_url: inherited_link.map(str::to_string),
        });
        return;
    }
    if tag == "img" || SKIPPED_TAGS.contains(&tag.as_str()) {
        return;
    }

    let style = css::apply_inline_style(inherited, &tag, element.value().attr("style"));
    let href = element
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| tag == "a" && !href.is_empty());
    let link = href.or(inherited_link);

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(text, &style, link, out),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    walk_inline(child, &style, link, out);
                }
            }
            _ => {}
        }
    }
}

/// Text nodes collapse HTML whitespace unless they carry typographic
/// indent spaces, which must survive for indent inference.
fn push_text(raw: &str, style: &TextStyle, link: Option<&str>, out: &mut Vec<TextSegment>) {
    if raw.trim().is_empty() {
        return;
    }
    let text = if raw.chars().any(indent::is_indent_space) {
        raw.to_string()
    } else {
        HTML_WHITESPACE_RE.replace_all(raw, " ").into_owned()
    };
    out.push(TextSegment {
        text,
        style: style.clone(),
        link_url: link.map(str::to_string),
    });
}

fn image_block(element: ElementRef<'_>) -> Option<ContentBlock> {
    let url = image_url(element)?;
    let alt = element
        .value()
        .attr("alt")
        .filter(|alt| !alt.trim().is_empty())
        .map(str::to_string);
    Some(ContentBlock::Image { url, alt })
}

/// `src` and the common lazy-loading attributes, then the first `srcset` entry.
pub(crate) fn image_url(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    if let Some(url) = IMAGE_SOURCE_ATTRS
        .iter()
        .filter_map(|attr| value.attr(attr))
        .map(str::trim)
        .find(|url| !url.is_empty())
    {
        return Some(url.to_string());
    }

    let srcset = value
        .attr("srcset")
        .filter(|set| !set.trim().is_empty())
        .or_else(|| value.attr("data-srcset"))?
        .trim();
    srcset
        .split(',')
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .and_then(|candidate| candidate.split(' ').next())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn collect_stylesheet(document: &Html) -> StyleSheet {
    let css: String = document
        .select(&selector("style"))
        .map(|style| {
            let mut text: String = style.text().collect();
            text.push('\n');
            text
        })
        .collect();
    if css.trim().is_empty() {
        return StyleSheet::default();
    }
    StyleSheet::parse(&css)
}

fn detect_unsupported(document: &Html) -> bool {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|element| {
            let value = element.value();
            let name = value.name().to_ascii_lowercase();
            UNSUPPORTED_TAGS.contains(&name.as_str())
                || value.attr("style").is_some_and(css::has_unsupported_layout)
        })
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(block: &ContentBlock) -> (&[TextSegment], Option<TextAlign>, Option<f32>) {
        match block {
            ContentBlock::Paragraph {
                segments,
                text_align,
                first_line_indent_em,
            } => (segments, *text_align, *first_line_indent_em),
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn extracts_inline_tags_and_links() {
        let html = "<html><body>\n<p><strong>Bold</strong> <em>Italic</em> <a href=\"https://example.com\">Link</a></p>\n</body></html>";
        let result = parse_rich_content(html);
        assert_eq!(result.blocks.len(), 1);
        assert!(!result.unsupported_features_detected);
        let (segments, _, _) = paragraph(&result.blocks[0]);
        // Whitespace-only text nodes between inline tags are dropped.
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Bold", "Italic", "Link"]);
        assert!(segments[0].style.bold);
        assert!(segments[1].style.italic);
        assert_eq!(segments[2].link_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn extracts_headings_quotes_and_images() {
        let html = "<h2>Chapter Header</h2>\n<blockquote>Quote text</blockquote>\n<img src=\"https://example.com/image.jpg\" alt=\"preview\" />";
        let blocks = parse_rich_content(html).blocks;
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], ContentBlock::Heading { level: 2, .. }));
        assert!(matches!(blocks[1], ContentBlock::BlockQuote { .. }));
        assert!(matches!(&blocks[2], ContentBlock::Image { alt: Some(alt), .. } if alt == "preview"));
    }

    #[test]
    fn keeps_plugin_image_inside_paragraph() {
        let blocks =
            parse_rich_content("<p><img src=\"heximg://hexnovels?ref=test-image\" alt=\"hex\" /></p>").blocks;
        assert_eq!(
            blocks,
            vec![ContentBlock::Image {
                url: "heximg://hexnovels?ref=test-image".to_string(),
                alt: Some("hex".to_string()),
            }]
        );
    }

    #[test]
    fn reads_lazy_image_attributes() {
        let blocks = parse_rich_content("<p><img src=\"\" data-src=\"/images/ch1.webp\" alt=\"lazy\" /></p>").blocks;
        assert!(matches!(&blocks[0], ContentBlock::Image { url, .. } if url == "/images/ch1.webp"));

        let blocks = parse_rich_content("<img srcset=\" a.png 1x, b.png 2x\">").blocks;
        assert!(matches!(&blocks[0], ContentBlock::Image { url, .. } if url == "a.png"));
    }

    #[test]
    fn inline_alignment_and_indent() {
        let blocks = parse_rich_content("<p style=\"text-align: center\">Centered text</p>").blocks;
        assert_eq!(paragraph(&blocks[0]).1, Some(TextAlign::Center));

        let blocks = parse_rich_content("<p style=\"text-indent:2em\">Indented</p>").blocks;
        assert_eq!(paragraph(&blocks[0]).2, Some(2.0));

        let blocks = parse_rich_content("<p style=\"text-indent: 24pt\">Indented by pt</p>").blocks;
        assert_eq!(paragraph(&blocks[0]).2, Some(2.0));
    }

    #[test]
    fn stylesheet_rules_apply_with_inline_priority() {
        let cases = [
            ("p { text-indent: 1.5em; }", "<p>x</p>", Some(1.5), None),
            ("p.indent { text-indent: 24px; }", "<p class=\"indent\">x</p>", Some(1.5), None),
            (".entry p { text-indent: 2em; }", "<div class=\"entry\"><p>x</p></div>", Some(2.0), None),
            ("p { text-align: justify; }", "<p>x</p>", None, Some(TextAlign::Justify)),
            ("div { text-indent: 1.5em; }", "<div>x</div>", Some(1.5), None),
            ("p { text-indent: 1em; }", "<p style=\"text-indent: 3em\">x</p>", Some(3.0), None),
        ];
        for (css, body, indent, align) in cases {
            let html = format!("<html><head><style>{css}</style></head><body>{body}</body></html>");
            let blocks = parse_rich_content(&html).blocks;
            let (_, text_align, indent_em) = paragraph(&blocks[0]);
            assert_eq!(indent_em, indent, "{html}");
            assert_eq!(text_align, align, "{html}");
        }
    }

    #[test]
    fn infers_indent_from_leading_typographic_spaces() {
        let blocks = parse_rich_content("<p>\u{3000}\u{3000}Indented by leading spaces</p>").blocks;
        let (segments, _, indent) = paragraph(&blocks[0]);
        assert_eq!(indent, Some(2.0));
        assert_eq!(segments[0].text, "Indented by leading spaces");

        let blocks = parse_rich_content("<p>\n    &emsp;&emsp;Indented by em spaces\n</p>").blocks;
        let (segments, _, indent) = paragraph(&blocks[0]);
        assert_eq!(indent, Some(2.0));
        assert_eq!(segments[0].text.trim(), "Indented by em spaces");

        let blocks = parse_rich_content("<p> Single leading space</p>").blocks;
        assert_eq!(paragraph(&blocks[0]).2, None);
    }

    #[test]
    fn containers_preserve_nested_block_order() {
        let html = "<div>Lead<p>Inner</p><img src=\"a.png\">Tail<div>Deep</div></div>";
        let texts: Vec<String> = parse_rich_content(html)
            .blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Image { url, .. } => format!("img:{url}"),
                other => other.plain_text(),
            })
            .collect();
        assert_eq!(texts, vec!["Lead", "Inner", "img:a.png", "Tail", "Deep"]);
    }

    #[test]
    fn list_items_become_bulleted_paragraphs() {
        let blocks = parse_rich_content("<ul><li>One</li><li><p>Two</p></li></ul>").blocks;
        let texts: Vec<String> = blocks.iter().map(ContentBlock::plain_text).collect();
        assert_eq!(texts, vec!["• One", "• Two"]);
    }

    #[test]
    fn adjacent_equal_segments_merge() {
        let blocks = parse_rich_content("<p>a<span>b</span><b>c</b><strong>d</strong></p>").blocks;
        let (segments, _, _) = paragraph(&blocks[0]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "ab");
        assert_eq!(segments[1].text, "cd");
    }

    #[test]
    fn recovers_json_fragment_inside_paragraph() {
        let html = r#"<p>{"type":"doc","content":[{"type":"bulletList","content":[{"type":"listItem","content":[{"type":"paragraph","content":[{"type":"text","text":"Point"}]}]}]},{"type":"paragraph","content":[{"type":"text","text":"Prose"}]}]}</p>"#;
        let texts: Vec<String> = parse_rich_content(html)
            .blocks
            .iter()
            .map(ContentBlock::plain_text)
            .collect();
        assert_eq!(texts, vec!["• Point", "Prose"]);
        assert!(texts.iter().all(|text| !text.contains('{') && !text.contains("type")));
    }

    #[test]
    fn flags_unsupported_layout() {
        assert!(parse_rich_content("<table><tr><td>Complex layout</td></tr></table>").unsupported_features_detected);
        assert!(parse_rich_content("<div style=\"display:flex\">x</div>").unsupported_features_detected);
        assert!(parse_rich_content("<p><svg></svg></p>").unsupported_features_detected);
        assert!(!parse_rich_content("<p>plain</p>").unsupported_features_detected);
    }

    #[test]
    fn script_and_style_never_leak_into_text() {
        let blocks = parse_rich_content("<div><style>p{color:red}</style><script>var x = 1;</script>Visible</div>").blocks;
        let texts: Vec<String> = blocks.iter().map(ContentBlock::plain_text).collect();
        assert_eq!(texts, vec!["Visible"]);
    }
}
