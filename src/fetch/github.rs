use std::collections::BTreeMap;

use anyhow::Context as _;

use crate::formats::{Comment, DocumentType, RefKind, Reference, ThreadDocument, truncate_chars};
use crate::refs;

use super::{Fetcher, str_field, web};

const TIMELINE_ACCEPT: &str = "application/vnd.github.mockingbird-preview+json";
const DEFAULT_ACCEPT: &str = "application/vnd.github+json";
const REVIEWS_PER_PAGE: usize = 50;

const REACTION_KEYS: &[&str] = &[
    "+1", "-1", "laugh", "hooray", "confused", "heart", "rocket", "eyes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GithubKind {
    Issue,
    Pr,
    Discussion,
}

#[derive(Debug, Clone)]
struct GithubTarget {
    owner: String,
    repo: String,
    kind: GithubKind,
    number: u64,
}

/// GitHub URLs that are not issues, PRs or discussions fall through to the
/// generic web fetcher; discussions use it too (no REST endpoint without
/// GraphQL) but keep their own document type.
pub async fn fetch(fetcher: &Fetcher, url: &str) -> ThreadDocument {
    match parse_github_url(url) {
        Some(target) if target.kind == GithubKind::Discussion => {
            let mut doc = web::fetch(fetcher, url).await;
            doc.doc_type = DocumentType::GithubDiscussion;
            doc
        }
        Some(target) => fetch_issue(fetcher, &target).await,
        None => web::fetch(fetcher, url).await,
    }
}

fn parse_github_url(url: &str) -> Option<GithubTarget> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host != "github.com" && host != "www.github.com" {
        return None;
    }

    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    if segments.len() < 4 {
        return None;
    }
    let kind = match segments[2] {
        "issues" => GithubKind::Issue,
        "pull" => GithubKind::Pr,
        "discussions" => GithubKind::Discussion,
        _ => return None,
    };
    let number = segments[3].parse().ok()?;

    Some(GithubTarget {
        owner: segments[0].to_owned(),
        repo: segments[1].to_owned(),
        kind,
        number,
    })
}

async fn fetch_issue(fetcher: &Fetcher, target: &GithubTarget) -> ThreadDocument {
    let repo_context = format!("{}/{}", target.owner, target.repo);
    let base = format!("{}/repos/{repo_context}", fetcher.config.github_api);

    let mut doc = ThreadDocument::new(
        format!("https://github.com/{repo_context}/issues/{}", target.number),
        DocumentType::GithubIssue,
    );
    super::stamp_fetched_at(&mut doc);

    let issue = match api_get(fetcher, &format!("{base}/issues/{}", target.number), DEFAULT_ACCEPT)
        .await
    {
        Ok(value) => value,
        Err(err) => {
            doc.error = Some(format!("failed to fetch issue: {err:#}"));
            return doc;
        }
    };

    // The issues endpoint serves PRs too; the `pull_request` key tells them
    // apart.
    let is_pr = issue.get("pull_request").is_some_and(|v| !v.is_null());
    if is_pr {
        doc.doc_type = DocumentType::GithubPr;
        doc.url = format!("https://github.com/{repo_context}/pull/{}", target.number);
    }

    doc.title = str_field(&issue, "title");
    doc.body = str_field(&issue, "body");
    doc.state = issue
        .get("state")
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    if issue
        .pointer("/pull_request/merged_at")
        .is_some_and(|v| !v.is_null())
    {
        doc.state = Some("merged".to_owned());
    }
    doc.labels = issue
        .get("labels")
        .and_then(|v| v.as_array())
        .map(|labels| {
            labels
                .iter()
                .filter_map(|label| label.get("name").and_then(|n| n.as_str()))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    doc.metadata.insert(
        "author".to_owned(),
        issue
            .pointer("/user/login")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    );
    for (key, field) in [("created", "created_at"), ("updated", "updated_at")] {
        if let Some(value) = issue.get(field) {
            doc.metadata.insert(key.to_owned(), value.clone());
        }
    }
    if let Some(count) = issue.get("comments") {
        doc.metadata.insert("comment_count".to_owned(), count.clone());
    }
    let reactions = extract_reactions(issue.get("reactions"));
    if !reactions.is_empty() {
        if let Ok(value) = serde_json::to_value(&reactions) {
            doc.metadata.insert("reactions".to_owned(), value);
        }
    }

    let mut all_text = doc.body.clone();
    fetch_comments(fetcher, &base, target.number, &mut doc, &mut all_text).await;

    if doc.doc_type == DocumentType::GithubPr {
        fetch_reviews(fetcher, &base, target.number, &mut doc, &mut all_text).await;
    }

    doc.refs = refs::extract_refs(&all_text, Some(repo_context.as_str()));
    enrich_with_timeline(fetcher, &base, target.number, &repo_context, &mut doc).await;

    doc
}

/// Paginate issue comments up to the configured hard cap. A failed page is a
/// partial-document failure: what was gathered so far stays on the document.
async fn fetch_comments(
    fetcher: &Fetcher,
    base: &str,
    number: u64,
    doc: &mut ThreadDocument,
    all_text: &mut String,
) {
    let max_comments = fetcher.config.max_comments;
    let per_page = max_comments.clamp(1, 100);
    let mut page = 1usize;
    let mut fetched = 0usize;

    'pages: while fetched < max_comments {
        let url = format!("{base}/issues/{number}/comments?page={page}&per_page={per_page}");
        let comments = match api_get(fetcher, &url, DEFAULT_ACCEPT).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(page, error = %format!("{err:#}"), "comment page fetch failed");
                doc.note_error(format!("comment page {page} failed"));
                break;
            }
        };
        let Some(items) = comments.as_array() else {
            break;
        };
        if items.is_empty() {
            break;
        }

        for item in items {
            let body = str_field(item, "body");
            doc.comments.push(Comment {
                author: item
                    .pointer("/user/login")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned(),
                date: str_field(item, "created_at"),
                body: body.clone(),
                score: None,
                depth: None,
                reactions: extract_reactions(item.get("reactions")),
            });
            all_text.push('\n');
            all_text.push_str(&body);
            fetched += 1;
            if fetched >= max_comments {
                break 'pages;
            }
        }

        if items.len() < per_page {
            break;
        }
        page += 1;
    }
}

/// PR review bodies join the comment stream, tagged with their review state.
async fn fetch_reviews(
    fetcher: &Fetcher,
    base: &str,
    number: u64,
    doc: &mut ThreadDocument,
    all_text: &mut String,
) {
    let url = format!("{base}/pulls/{number}/reviews?per_page={REVIEWS_PER_PAGE}");
    let reviews = match api_get(fetcher, &url, DEFAULT_ACCEPT).await {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "review fetch failed");
            doc.note_error("review fetch failed");
            return;
        }
    };

    let Some(items) = reviews.as_array() else {
        return;
    };
    for review in items {
        let body = str_field(review, "body");
        if body.trim().is_empty() {
            continue;
        }
        let state = review
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("COMMENTED");
        doc.comments.push(Comment {
            author: review
                .pointer("/user/login")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned(),
            date: str_field(review, "submitted_at"),
            body: format!("[Review: {state}] {body}"),
            score: None,
            depth: None,
            reactions: BTreeMap::new(),
        });
        all_text.push('\n');
        all_text.push_str(&body);
    }
}

/// Timeline events recover cross-repo references and connected commits that
/// never appear in the thread text. Needs a preview media type.
async fn enrich_with_timeline(
    fetcher: &Fetcher,
    base: &str,
    number: u64,
    repo_context: &str,
    doc: &mut ThreadDocument,
) {
    let url = format!("{base}/issues/{number}/timeline?per_page=100");
    let events = match api_get(fetcher, &url, TIMELINE_ACCEPT).await {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "timeline fetch failed");
            doc.note_error("timeline fetch failed");
            return;
        }
    };

    let Some(events) = events.as_array() else {
        return;
    };
    for event in events {
        match event.get("event").and_then(|v| v.as_str()).unwrap_or_default() {
            "cross-referenced" => {
                let Some(source) = event.pointer("/source/issue") else {
                    continue;
                };
                let Some(src_number) = source.get("number").and_then(|v| v.as_u64()) else {
                    continue;
                };
                let src_repo = source
                    .pointer("/repository/full_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(repo_context);
                let is_pr = source.get("pull_request").is_some_and(|v| !v.is_null());
                let (kind, segment) = if is_pr {
                    (RefKind::CrossRefPr, "pull")
                } else {
                    (RefKind::CrossRefIssue, "issues")
                };
                let title = source.get("title").and_then(|v| v.as_str()).unwrap_or_default();
                doc.refs.push(Reference {
                    kind,
                    url: format!("https://github.com/{src_repo}/{segment}/{src_number}"),
                    context: format!("Referenced by {src_repo}#{src_number}: {title}"),
                });
            }
            "referenced" | "connected" => {
                if let Some(commit) = event.get("commit_id").and_then(|v| v.as_str()) {
                    doc.refs.push(Reference {
                        kind: RefKind::Commit,
                        url: format!("https://github.com/{repo_context}/commit/{commit}"),
                        context: format!("Referenced in commit {}", truncate_chars(commit, 7)),
                    });
                }
            }
            _ => {}
        }
    }

    refs::dedup_refs(&mut doc.refs);
}

async fn api_get(
    fetcher: &Fetcher,
    url: &str,
    accept: &str,
) -> anyhow::Result<serde_json::Value> {
    let mut request = fetcher
        .client
        .get(url)
        .header(reqwest::header::ACCEPT, accept);
    if let Some(token) = &fetcher.config.github_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.with_context(|| format!("GET {url}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("read body: {url}"))?;
    if !status.is_success() {
        anyhow::bail!("GitHub API {status}: {}", truncate_chars(&body, 200));
    }
    serde_json::from_str(&body).with_context(|| format!("parse json: {url}"))
}

fn extract_reactions(value: Option<&serde_json::Value>) -> BTreeMap<String, u64> {
    let mut reactions = BTreeMap::new();
    let Some(value) = value else {
        return reactions;
    };
    for key in REACTION_KEYS {
        if let Some(count) = value.get(*key).and_then(|v| v.as_u64())
            && count > 0
        {
            reactions.insert((*key).to_owned(), count);
        }
    }
    reactions
}
