//! Turning "something JSON-ish" into a `serde_json::Value`.

use super::looks_like_structured_payload;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

/// Nested string re-parses allowed before a candidate is abandoned.
const MAX_DECODE_DEPTH: usize = 4;

const WRAPPER_KEYS: [&str; 7] = [
    "content", "data", "body", "result", "payload", "value", "chapter",
];

const STRUCTURED_NODE_TYPES: [&str; 11] = [
    "doc",
    "paragraph",
    "heading",
    "bulletlist",
    "orderedlist",
    "listitem",
    "blockquote",
    "hardbreak",
    "horizontalrule",
    "image",
    "text",
];

static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)(\s*:)").unwrap());
static SPACED_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([A-Za-z_][A-Za-z0-9_\-]*)\s*:\s*""#).unwrap());
static SINGLE_QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^'\\]*(?:\\.[^'\\]*)*)'").unwrap());
static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Parse a payload into an object or array root, trying progressively more
/// forgiving interpretations.
pub fn parse_structured_root(raw: &str) -> Option<Value> {
    let trimmed = strip_bom(raw);
    if !looks_like_structured_payload(trimmed) {
        return None;
    }

    let mut candidates: Vec<String> = vec![trimmed.to_string()];
    for extra in [extract_json_candidate(trimmed), jsonify_js_like(trimmed)]
        .into_iter()
        .flatten()
    {
        if !candidates.contains(&extra) {
            candidates.push(extra);
        }
    }

    candidates
        .iter()
        .filter_map(|candidate| parse_candidate(candidate, 0))
        .find(|value| value.is_object() || value.is_array())
}

fn parse_candidate(candidate: &str, depth: usize) -> Option<Value> {
    if depth > MAX_DECODE_DEPTH {
        return None;
    }
    let trimmed = candidate.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        match parsed {
            Value::Object(_) | Value::Array(_) => return Some(parsed),
            Value::String(inner) => {
                let inner = inner.trim();
                if !inner.is_empty() {
                    return parse_candidate(inner, depth + 1);
                }
            }
            _ => {}
        }
    }

    let normalized = jsonify_js_like(trimmed).filter(|normalized| normalized != trimmed)?;
    parse_candidate(&normalized, depth + 1)
}

/// Pull the JSON body out of surrounding noise: an HTML wrapper whose text is
/// the payload, or prose/JS around the outermost braces.
pub fn extract_json_candidate(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('<') {
        let document = Html::parse_document(trimmed);
        let body = Selector::parse("body").expect("static selector must parse");
        let text: String = document
            .select(&body)
            .next()
            .map(|body| body.text().collect())
            .unwrap_or_default();
        let text = text.trim();
        if looks_like_structured_payload(text) {
            return Some(text.to_string());
        }
    }

    let start = trimmed.find('{').or_else(|| trimmed.find('['))?;
    let end = trimmed
        .rfind('}')
        .filter(|end| *end > start)
        .or_else(|| trimmed.rfind(']').filter(|end| *end > start))?;
    Some(trimmed[start..=end].trim().to_string())
}

/// Rewrite a JavaScript object literal into strict JSON.
///
/// Only escaped quotes are unescaped; `\n` and `\t` escapes stay escaped so
/// string values remain valid JSON.
pub fn jsonify_js_like(raw: &str) -> Option<String> {
    let mut candidate = strip_bom(raw);
    if let Some(rest) = candidate.strip_prefix("return ") {
        candidate = rest.trim();
    }
    let candidate = candidate.trim_end_matches(';').trim();
    if !looks_like_structured_payload(candidate) {
        return None;
    }

    let mut candidate = if candidate.len() >= 2 && candidate.starts_with('\'') && candidate.ends_with('\'') {
        let inner = &candidate[1..candidate.len() - 1];
        format!("\"{}\"", inner.replace('"', "\\\""))
    } else {
        candidate.to_string()
    };
    if candidate.contains("\\\"") {
        candidate = candidate.replace("\\\"", "\"");
    }

    let candidate = BARE_KEY_RE.replace_all(&candidate, "$1\"$2\"$3");
    let candidate = SPACED_KEY_RE.replace_all(&candidate, "\"$1\":\"");
    let candidate = SINGLE_QUOTED_RE.replace_all(&candidate, |caps: &regex::Captures<'_>| {
        let inner = caps[1].replace("\\'", "'").replace('"', "\\\"");
        format!("\"{inner}\"")
    });
    let candidate = TRAILING_COMMA_RE.replace_all(&candidate, "$1");
    Some(candidate.into_owned())
}

/// Locate the document node inside whatever wrapper the plugin used.
pub fn find_structured_node(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if is_structured_node(map) {
                return Some(value.clone());
            }
            WRAPPER_KEYS.iter().find_map(|key| {
                let nested = map.get(*key)?;
                find_structured_node(nested).or_else(|| {
                    let text = value_as_string(nested)?;
                    parse_structured_root(&text).and_then(|root| find_structured_node(&root))
                })
            })
        }
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_object().is_some_and(is_structured_node))
            .then(|| value.clone()),
        _ => None,
    }
}

fn is_structured_node(map: &serde_json::Map<String, Value>) -> bool {
    if let Some(kind) = normalize_node_type(map.get("type"))
        && STRUCTURED_NODE_TYPES.contains(&kind.as_str())
    {
        return true;
    }
    matches!(map.get("content"), Some(Value::Array(_) | Value::Object(_)))
        || map.get("text").and_then(value_as_string).is_some()
        || matches!(map.get("attrs"), Some(Value::Object(_)))
}

/// Lowercase a node/mark type and drop `_`/`-`, so `bullet_list`,
/// `BulletList` and `bullet-list` compare equal.
pub fn normalize_node_type(value: Option<&Value>) -> Option<String> {
    let raw = value.and_then(value_as_string)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect(),
    )
}

/// Primitive content as text; containers and null have none.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn strip_bom(raw: &str) -> &str {
    raw.trim().trim_start_matches('\u{FEFF}').trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_payloads_wrapped_in_json_strings() {
        let inner = r#"{"type":"doc","content":[]}"#;
        let encoded = serde_json::to_string(inner).unwrap();
        let root = parse_structured_root(&encoded).expect("root");
        assert_eq!(root, json!({"type": "doc", "content": []}));
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = r#"window.__DATA__ = {"type":"doc","content":[]}; // trailing"#;
        assert_eq!(
            extract_json_candidate(raw).as_deref(),
            Some(r#"{"type":"doc","content":[]}"#)
        );
    }

    #[test]
    fn jsonifies_js_object_literals() {
        let raw = "{type: 'doc', content: [{type: 'text', text: 'It\\'s \"fine\"',},],};";
        let root = parse_structured_root(raw).expect("root");
        assert_eq!(root["type"], "doc");
        assert_eq!(root["content"][0]["type"], "text");
        assert_eq!(root["content"][0]["text"], "It's \"fine\"");

        assert_eq!(
            jsonify_js_like("return {count: 1, tags: ['a', 'b',],};").as_deref(),
            Some(r#"{"count": 1, "tags": ["a", "b"]}"#)
        );
    }

    #[test]
    fn finds_document_under_wrapper_keys() {
        let root = json!({
            "status": "ok",
            "data": { "chapter": "{\"type\":\"doc\",\"content\":[{\"type\":\"paragraph\"}]}" }
        });
        let node = find_structured_node(&root).expect("node");
        assert_eq!(node["type"], "doc");
    }

    #[test]
    fn normalizes_node_types() {
        assert_eq!(
            normalize_node_type(Some(&json!(" Bullet_List "))).as_deref(),
            Some("bulletlist")
        );
        assert_eq!(normalize_node_type(Some(&json!(""))), None);
        assert_eq!(normalize_node_type(None), None);
    }

    #[test]
    fn gives_up_on_plain_prose() {
        assert_eq!(parse_structured_root("Just a sentence."), None);
        assert_eq!(parse_structured_root(""), None);
    }
}
