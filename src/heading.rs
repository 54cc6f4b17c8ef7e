//! Chapter title injection.

use crate::structured::{escape_html, sanitize_text};
use scraper::{Html, Selector};

pub const CHAPTER_TITLE_CLASS: &str = "reader-chapter-title";

/// Prepend `<h1 class="reader-chapter-title">` with the chapter name unless the
/// body already carries a heading. Output is the re-serialized body fragment.
pub fn prepend_chapter_heading_if_missing(html: &str, chapter_name: Option<&str>) -> String {
    let heading_text = sanitize_text(chapter_name.unwrap_or_default());
    if heading_text.is_empty() {
        return html.to_string();
    }

    let fragment = Html::parse_fragment(html);
    let body = fragment.root_element().inner_html();
    let headings = Selector::parse("h1, h2, h3, h4, h5, h6").expect("static selector must parse");
    if fragment.select(&headings).next().is_some() {
        return body;
    }
    format!(
        "<h1 class=\"{CHAPTER_TITLE_CLASS}\">{}</h1>{body}",
        escape_html(&heading_text)
    )
}
