use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Justify,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike_through: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color_css: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
}

impl TextSegment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
            link_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Paragraph {
        segments: Vec<TextSegment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_align: Option<TextAlign>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_line_indent_em: Option<f32>,
    },
    Heading {
        level: u8,
        segments: Vec<TextSegment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_align: Option<TextAlign>,
    },
    BlockQuote {
        segments: Vec<TextSegment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_align: Option<TextAlign>,
    },
    HorizontalRule,
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
}

impl ContentBlock {
    /// Concatenated segment text; empty for rules and images.
    pub fn plain_text(&self) -> String {
        match self {
            ContentBlock::Paragraph { segments, .. }
            | ContentBlock::Heading { segments, .. }
            | ContentBlock::BlockQuote { segments, .. } => {
                segments.iter().map(|segment| segment.text.as_str()).collect()
            }
            ContentBlock::HorizontalRule | ContentBlock::Image { .. } => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichParseResult {
    pub blocks: Vec<ContentBlock>,
    /// Layout the block renderer cannot reproduce; prefer the web renderer.
    pub unsupported_features_detected: bool,
}

/// Merge neighbours that share style and link.
pub fn merge_adjacent_segments(segments: Vec<TextSegment>) -> Vec<TextSegment> {
    let mut merged: Vec<TextSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if last.style == segment.style && last.link_url == segment.link_url => {
                last.text.push_str(&segment.text);
            }
            _ => merged.push(segment),
        }
    }
    merged
}
