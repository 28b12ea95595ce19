use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::formats::{RefKind, Reference, collapse_ws};

lazy_static! {
    // "duplicate of <github url>" must run before the plain URL pattern so the
    // more specific type wins the first-occurrence dedup.
    static ref DUPLICATE_URL: Regex = Regex::new(
        r"(?i)(?:duplicate\s+of|duplicates?)\s+https?://github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)/(issues|pull)/(\d+)"
    )
    .unwrap();
    static ref GITHUB_URL: Regex = Regex::new(
        r"https?://github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)/(issues|pull|discussions)/(\d+)"
    )
    .unwrap();
    static ref COMMIT_URL: Regex = Regex::new(
        r"https?://github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)/commit/([0-9a-f]{7,40})"
    )
    .unwrap();
    static ref DUPLICATE_REF: Regex =
        Regex::new(r"(?i)dup(?:licate)?s?(?:\s+of)?\s+#(\d+)").unwrap();
    static ref RELATED_REF: Regex =
        Regex::new(r"(?i)(?:see\s+also|related(?:\s+to)?|fixes|closes|resolves|refs?)\s+#(\d+)")
            .unwrap();
    static ref ISSUE_REF: Regex =
        Regex::new(r"([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)?#(\d+)").unwrap();
    static ref GH_REF: Regex = Regex::new(r"GH-(\d+)").unwrap();
    static ref FULL_SHA: Regex = Regex::new(r"[0-9a-f]{40}").unwrap();
    static ref EXTERNAL_URL: Regex = Regex::new(r"https?://[^\s<>\[\]()]+").unwrap();
    static ref IMAGE_ASSET: Regex =
        Regex::new(r"(?i)\.(png|jpe?g|gif|svg|ico|webp)(\?|$)").unwrap();
}

/// Scan free text for embedded cross-references. `repo_context` is the
/// "owner/repo" used to resolve bare `#123`, `GH-123` and bare-SHA mentions;
/// without it those shapes are skipped. Extraction never fails: unmatched
/// text yields an empty list.
pub fn extract_refs(text: &str, repo_context: Option<&str>) -> Vec<Reference> {
    if text.is_empty() {
        return Vec::new();
    }
    let repo_context = repo_context.map(str::trim).filter(|repo| !repo.is_empty());

    let mut acc = RefAccumulator {
        refs: Vec::new(),
        seen: HashSet::new(),
    };

    for caps in DUPLICATE_URL.captures_iter(text) {
        let (Some(m), Some(repo), Some(segment), Some(number)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let url = format!(
            "https://github.com/{}/{}/{}",
            repo.as_str(),
            segment.as_str(),
            number.as_str()
        );
        acc.add(RefKind::Duplicate, url, context_window(text, m.start(), m.end()));
    }

    for caps in GITHUB_URL.captures_iter(text) {
        let (Some(m), Some(repo), Some(segment), Some(number)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let kind = match segment.as_str() {
            "pull" => RefKind::Pr,
            "discussions" => RefKind::Discussion,
            _ => RefKind::Issue,
        };
        let url = format!(
            "https://github.com/{}/{}/{}",
            repo.as_str(),
            segment.as_str(),
            number.as_str()
        );
        acc.add(kind, url, context_window(text, m.start(), m.end()));
    }

    for caps in COMMIT_URL.captures_iter(text) {
        let (Some(m), Some(repo), Some(sha)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let url = format!("https://github.com/{}/commit/{}", repo.as_str(), sha.as_str());
        acc.add(RefKind::Commit, url, context_window(text, m.start(), m.end()));
    }

    if let Some(repo) = repo_context {
        for caps in DUPLICATE_REF.captures_iter(text) {
            let (Some(m), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let url = format!("https://github.com/{repo}/issues/{}", number.as_str());
            acc.add(RefKind::Duplicate, url, context_window(text, m.start(), m.end()));
        }

        for caps in RELATED_REF.captures_iter(text) {
            let (Some(m), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let url = format!("https://github.com/{repo}/issues/{}", number.as_str());
            acc.add(RefKind::Related, url, context_window(text, m.start(), m.end()));
        }
    }

    for caps in ISSUE_REF.captures_iter(text) {
        let (Some(m), Some(number)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if !boundary_before(text, m.start()) || !boundary_after(text, m.end()) {
            continue;
        }
        let Some(repo) = caps.get(1).map(|group| group.as_str()).or(repo_context) else {
            continue;
        };
        let url = format!("https://github.com/{repo}/issues/{}", number.as_str());
        acc.add(RefKind::Issue, url, context_window(text, m.start(), m.end()));
    }

    if let Some(repo) = repo_context {
        for caps in GH_REF.captures_iter(text) {
            let (Some(m), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !boundary_before(text, m.start()) || !boundary_after(text, m.end()) {
                continue;
            }
            let url = format!("https://github.com/{repo}/issues/{}", number.as_str());
            acc.add(RefKind::Issue, url, context_window(text, m.start(), m.end()));
        }

        for m in FULL_SHA.find_iter(text) {
            if !boundary_before(text, m.start()) || !boundary_after(text, m.end()) {
                continue;
            }
            let url = format!("https://github.com/{repo}/commit/{}", m.as_str());
            acc.add(RefKind::Commit, url, context_window(text, m.start(), m.end()));
        }
    }

    for m in EXTERNAL_URL.find_iter(text) {
        if !whitespace_before(text, m.start()) {
            continue;
        }
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', '\'', '"']);
        if url.is_empty() {
            continue;
        }
        let Ok(parsed) = Url::parse(url) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };
        let host = host.to_ascii_lowercase();
        if host == "github.com" || host == "www.github.com" {
            continue;
        }
        if IMAGE_ASSET.is_match(url) {
            continue;
        }
        acc.add(
            RefKind::Url,
            url.to_string(),
            context_window(text, m.start(), m.end()),
        );
    }

    acc.refs
}

/// Drop later occurrences of the same canonical URL, preserving order.
pub fn dedup_refs(refs: &mut Vec<Reference>) {
    let mut seen = HashSet::new();
    refs.retain(|reference| seen.insert(reference.url.trim_end_matches('/').to_string()));
}

struct RefAccumulator {
    refs: Vec<Reference>,
    seen: HashSet<String>,
}

impl RefAccumulator {
    fn add(&mut self, kind: RefKind, url: String, context: String) {
        let canonical = url.trim_end_matches('/').to_string();
        if self.seen.insert(canonical) {
            self.refs.push(Reference { kind, url, context });
        }
    }
}

// The regex crate has no lookaround, so the boundary classes the patterns
// would otherwise assert are checked against neighbor characters here.

fn boundary_before(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        None => true,
        Some(ch) => ch.is_whitespace() || ch == '(',
    }
}

fn boundary_after(text: &str, end: usize) -> bool {
    match text[end..].chars().next() {
        None => true,
        Some(ch) => ch.is_whitespace() || matches!(ch, ')' | '.' | ',' | ';' | ':' | '!' | '?' | '\''),
    }
}

fn whitespace_before(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        None => true,
        Some(ch) => ch.is_whitespace(),
    }
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(39)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(40)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());
    collapse_ws(&text[from..to])
}
