//! Chapter and asset URL resolution.
//!
//! Plugins hand us chapter paths and image references in every shape
//! imaginable: absolute URLs, root-relative paths, bare slugs, and hosts
//! without a scheme. Resolution walks an ordered list of candidate bases and
//! keeps the first one that yields a well-formed `http(s)` URL.

use url::Url;

/// Resolve a chapter (or asset) URL against the plugin site and the novel URL.
///
/// Root-relative inputs prefer the plugin site; everything else prefers the
/// novel URL and then its directory. Returns `None` when no base works.
pub fn resolve_chapter_url(
    chapter_url: &str,
    plugin_site: Option<&str>,
    novel_url: &str,
) -> Option<String> {
    let raw = chapter_url.trim();
    if raw.is_empty() {
        return None;
    }
    if is_data_image(raw) {
        return Some(raw.to_string());
    }
    if is_blob(raw) {
        return None;
    }
    if let Some(absolute) = parse_http_url(raw) {
        return Some(absolute.to_string());
    }

    let novel_base = normalize_url_base(Some(novel_url));
    let site_base = normalize_url_base(plugin_site);
    let novel_dir = novel_base.as_ref().map(ensure_trailing_slash);

    let ordered = if raw.starts_with('/') {
        vec![site_base, novel_base]
    } else {
        vec![novel_base, novel_dir, site_base]
    };
    let mut candidates: Vec<Url> = Vec::with_capacity(ordered.len());
    for base in ordered.into_iter().flatten() {
        if !candidates.contains(&base) {
            candidates.push(base);
        }
    }

    candidates
        .iter()
        .filter_map(|base| base.join(raw).ok())
        .find(is_http_url)
        .map(|resolved| resolved.to_string())
}

/// Resolve an image or other in-chapter resource.
///
/// The chapter's own web URL is the most specific base, so it is tried before
/// falling back to [`resolve_chapter_url`].
pub fn resolve_content_resource_url(
    raw_url: &str,
    chapter_web_url: Option<&str>,
    novel_url: &str,
    plugin_site: Option<&str>,
) -> Option<String> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_data_image(trimmed) || is_plugin_scheme(trimmed) {
        return Some(trimmed.to_string());
    }
    if is_blob(trimmed) {
        return None;
    }
    if let Some(absolute) = parse_http_url(trimmed) {
        return Some(absolute.to_string());
    }

    if let Some(resolved) = chapter_web_url
        .and_then(parse_http_url)
        .and_then(|base| base.join(trimmed).ok())
        .filter(is_http_url)
    {
        return Some(resolved.to_string());
    }

    resolve_chapter_url(trimmed, plugin_site, novel_url)
}

/// Bases and chapter location used to resolve in-chapter resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceBases {
    pub chapter_web_url: Option<String>,
    pub novel_url: String,
    pub plugin_site: Option<String>,
}

impl ResourceBases {
    pub fn resolve(&self, raw_url: &str) -> Option<String> {
        resolve_content_resource_url(
            raw_url,
            self.chapter_web_url.as_deref(),
            &self.novel_url,
            self.plugin_site.as_deref(),
        )
    }
}

fn normalize_url_base(base: Option<&str>) -> Option<Url> {
    let value = base.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return None;
    }

    let lower = value.to_ascii_lowercase();
    let has_scheme = lower.starts_with("http://") || lower.starts_with("https://");
    if has_scheme {
        return parse_http_url(value);
    }
    if value.starts_with('/') {
        return None;
    }

    let host_candidate = value.split('/').next().unwrap_or_default();
    let looks_like_host =
        host_candidate.contains('.') || host_candidate.eq_ignore_ascii_case("localhost");
    if !looks_like_host {
        return None;
    }
    parse_http_url(&format!("https://{value}"))
}

fn ensure_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut with_slash = url.clone();
    let path = format!("{}/", url.path());
    with_slash.set_path(&path);
    with_slash
}

fn parse_http_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim()).ok().filter(is_http_url)
}

fn is_http_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}

fn is_data_image(raw: &str) -> bool {
    raw.get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
}

fn is_blob(raw: &str) -> bool {
    raw.get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("blob:"))
}

/// Custom `scheme://` references served by content plugins themselves
/// (e.g. `heximg://`); they are opaque to us and must pass through as-is.
fn is_plugin_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid && !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https" | "blob")
}
