use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::formats::{Link, collapse_ws, truncate_chars};

const MAX_CONTEXT_CHARS: usize = 200;
const MIN_ANCHOR_CHARS: usize = 2;

const SKIP_CONTAINERS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript",
];

const BLOCK_TAGS: &[&str] = &[
    "p",
    "li",
    "dd",
    "dt",
    "td",
    "th",
    "blockquote",
    "figcaption",
    "caption",
    "section",
    "article",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

const ASSET_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".css", ".js",
];

/// Extract anchor-tagged links with surrounding context from raw HTML.
/// Anchors under nav/header/footer/aside (at any nesting depth) are excluded
/// structurally rather than by pattern matching on the markup.
pub fn extract_links(html: &str, base_url: &str) -> Vec<Link> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(anchor_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    for element in document.select(&anchor_selector) {
        if inside_skipped_container(element) {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") {
            continue;
        }

        let anchor = collapse_ws(&element.text().collect::<String>());
        if anchor.chars().count() < MIN_ANCHOR_CHARS {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if is_asset_url(&resolved) {
            continue;
        }

        let url = resolved.to_string();
        if !seen.insert(url.trim_end_matches('/').to_string()) {
            continue;
        }

        let context = truncate_chars(&block_context(element), MAX_CONTEXT_CHARS).to_string();
        links.push(Link {
            url,
            anchor,
            context,
        });
    }

    links
}

fn inside_skipped_container(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| SKIP_CONTAINERS.contains(&ancestor.value().name()))
}

/// Visible text of the anchor's nearest block-level ancestor, falling back to
/// the direct parent element.
fn block_context(element: ElementRef<'_>) -> String {
    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        if BLOCK_TAGS.contains(&ancestor.value().name()) {
            return collapse_ws(&ancestor.text().collect::<String>());
        }
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .next()
        .map(|parent| collapse_ws(&parent.text().collect::<String>()))
        .unwrap_or_default()
}

fn is_asset_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
