use anyhow::Context as _;
use lazy_static::lazy_static;
use readability_js::{Readability, ReadabilityError, ReadabilityOptions};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::formats::{DocumentType, Link, ThreadDocument, collapse_ws, truncate_chars};
use crate::{links, refs};

use super::Fetcher;

pub(crate) const MAX_BODY_CHARS: usize = 10_000;
const MIN_READABLE_CHARS: usize = 200;

pub async fn fetch(fetcher: &Fetcher, url: &str) -> ThreadDocument {
    let mut doc = ThreadDocument::new(url, DocumentType::WebPage);
    super::stamp_fetched_at(&mut doc);

    let html = match fetch_html(fetcher, url).await {
        Ok(html) => html,
        Err(err) => {
            doc.error = Some(format!("failed to fetch: {err:#}"));
            return doc;
        }
    };

    // HTML parsing is CPU work; keep it off the async runtime.
    let page = {
        let url = url.to_owned();
        match tokio::task::spawn_blocking(move || parse_page(&html, &url)).await {
            Ok(page) => page,
            Err(err) => {
                doc.error = Some(format!("page parse task failed: {err}"));
                return doc;
            }
        }
    };

    doc.title = page.title;
    doc.links = page.links;
    doc.body = page.body;
    // Refs come from the cleaned body only, never the raw markup.
    doc.refs = refs::extract_refs(&doc.body, None);
    doc
}

async fn fetch_html(fetcher: &Fetcher, url: &str) -> anyhow::Result<String> {
    let response = fetcher
        .client
        .get(url)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
        )
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {url} returned {status}");
    }
    response
        .text()
        .await
        .with_context(|| format!("read body: {url}"))
}

struct ParsedPage {
    title: String,
    body: String,
    links: Vec<Link>,
}

fn parse_page(html: &str, url: &str) -> ParsedPage {
    // Links must be extracted from the raw document, before any stripping.
    let links = links::extract_links(html, url);

    let document = Html::parse_document(html);
    let title = extract_title(&document);
    let body = extract_body(html, &document, url);

    ParsedPage {
        title,
        body: truncate_chars(&body, MAX_BODY_CHARS).to_owned(),
        links,
    }
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|element| collapse_ws(&element.text().collect::<String>()))
        .unwrap_or_default()
}

/// Layered body extraction: readability first, full DOM text when the result
/// is implausibly short, pure tag-stripping as the last resort.
fn extract_body(html: &str, document: &Html, url: &str) -> String {
    let mut body = readability_body(html, url).unwrap_or_default();
    if body.chars().count() < MIN_READABLE_CHARS {
        let dom_text = full_text(document);
        if !dom_text.is_empty() {
            body = dom_text;
        }
    }
    if body.is_empty() {
        body = strip_tags(html);
    }
    body
}

fn readability_body(html: &str, url: &str) -> Option<String> {
    let readability = match Readability::new() {
        Ok(readability) => readability,
        Err(err) => {
            tracing::debug!(?err, "readability unavailable");
            return None;
        }
    };

    match readability.parse_with_url(html, url) {
        Ok(article) => Some(collapse_ws(&html2md::parse_html(&article.content))),
        Err(ReadabilityError::ReadabilityCheckFailed) => {
            let options = ReadabilityOptions::new()
                .char_threshold(0)
                .nb_top_candidates(10)
                .link_density_modifier(2.0);
            match readability.parse_with_options(html, Some(url), Some(options)) {
                Ok(article) => Some(collapse_ws(&html2md::parse_html(&article.content))),
                Err(err) => {
                    tracing::debug!(url, ?err, "readability extraction failed");
                    None
                }
            }
        }
        Err(err) => {
            tracing::debug!(url, ?err, "readability extraction failed");
            None
        }
    }
}

fn full_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skip = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|element| matches!(element.value().name(), "script" | "style" | "noscript"));
        if skip {
            continue;
        }
        out.push_str(&text.text);
        out.push(' ');
    }
    collapse_ws(&out)
}

fn strip_tags(html: &str) -> String {
    lazy_static! {
        static ref SCRIPT_BLOCK: Regex = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
        static ref STYLE_BLOCK: Regex = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
        static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    }

    let text = SCRIPT_BLOCK.replace_all(html, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    collapse_ws(&TAG.replace_all(&text, " "))
}
