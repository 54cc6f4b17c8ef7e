//! First-line indent inferred from typographic spaces at the start of a
//! paragraph, as used by CJK and many scanned-then-typed novels.

use super::model::TextSegment;

const MIN_INDENT_CHARS: usize = 2;
const MIN_INDENT_EM: f32 = 0.5;

/// Width in em of a space character that typesetters use for indentation.
/// Plain ASCII space is deliberately absent.
pub fn indent_space_em(ch: char) -> Option<f32> {
    match ch {
        '\u{3000}' => Some(1.0),
        '\u{2001}' | '\u{2003}' => Some(1.0),
        '\u{2000}' | '\u{2002}' => Some(0.5),
        '\u{2004}' => Some(0.333),
        '\u{2005}' | '\u{2008}' | '\u{00A0}' => Some(0.25),
        '\u{2006}' => Some(0.167),
        '\u{2007}' => Some(0.5),
        '\u{2009}' => Some(0.2),
        '\u{200A}' => Some(0.1),
        '\u{205F}' => Some(0.222),
        _ => None,
    }
}

pub fn is_indent_space(ch: char) -> bool {
    indent_space_em(ch).is_some()
}

/// Measure the leading indent of `text`, skipping HTML formatting whitespace
/// first. Returns the width and the byte length consumed.
fn leading_indent(text: &str) -> Option<(f32, usize)> {
    let mut chars = text.char_indices().peekable();
    while chars
        .next_if(|(_, ch)| matches!(ch, ' ' | '\t' | '\n' | '\r'))
        .is_some()
    {}

    let mut width = 0.0_f32;
    let mut count = 0;
    let mut consumed = chars.peek().map_or(text.len(), |(idx, _)| *idx);
    for (idx, ch) in chars {
        let Some(em) = indent_space_em(ch) else {
            break;
        };
        width += em;
        count += 1;
        consumed = idx + ch.len_utf8();
    }

    (count >= MIN_INDENT_CHARS && width >= MIN_INDENT_EM).then_some((width, consumed))
}

/// Strip an inferred indent from the first segment. `None` when there is no
/// indent or nothing would remain.
pub fn infer_leading_indent(segments: &[TextSegment]) -> Option<(f32, Vec<TextSegment>)> {
    let first = segments.first()?;
    let (width, consumed) = leading_indent(&first.text)?;
    let mut updated = segments.to_vec();
    let rest = &first.text[consumed..];
    if rest.is_empty() {
        updated.remove(0);
    } else {
        updated[0].text = rest.to_string();
    }
    (!updated.is_empty()).then_some((width, updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_ideographic_spaces_make_two_em() {
        let segments = vec![TextSegment::plain("\u{3000}\u{3000}Text")];
        let (width, stripped) = infer_leading_indent(&segments).expect("indent");
        assert_eq!(width, 2.0);
        assert_eq!(stripped[0].text, "Text");
    }

    #[test]
    fn formatting_whitespace_is_skipped_before_measuring() {
        let segments = vec![TextSegment::plain("\n    \u{2003}\u{2003}Body\n")];
        let (width, stripped) = infer_leading_indent(&segments).expect("indent");
        assert_eq!(width, 2.0);
        assert_eq!(stripped[0].text, "Body\n");
    }

    #[test]
    fn single_or_narrow_spaces_do_not_count() {
        assert!(infer_leading_indent(&[TextSegment::plain(" Text")]).is_none());
        assert!(infer_leading_indent(&[TextSegment::plain("\u{3000}Text")]).is_none());
        assert!(infer_leading_indent(&[TextSegment::plain("\u{200A}\u{200A}Text")]).is_none());
    }

    #[test]
    fn indent_only_first_segment_is_dropped() {
        let segments = vec![
            TextSegment::plain("\u{3000}\u{3000}"),
            TextSegment {
                text: "Bold".to_string(),
                style: crate::rich::TextStyle {
                    bold: true,
                    ..Default::default()
                },
                link_url: None,
            },
        ];
        let (_, stripped) = infer_leading_indent(&segments).expect("indent");
        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped[0].text, "Bold");
    }
}
