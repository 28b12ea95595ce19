mod source_stub;

use chaintrail::config::FetchConfig;
use chaintrail::fetch::{Fetcher, github, hn, reddit, v2ex, web};
use chaintrail::formats::{DocumentType, RefKind};
use source_stub::{StubResponse, StubServer};

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

fn fetcher_for(base: &str) -> Fetcher {
    let config = FetchConfig {
        github_api: base.to_string(),
        reddit_base: base.to_string(),
        hn_api: base.to_string(),
        v2ex_base: base.to_string(),
        github_token: None,
        max_comments: 100,
    };
    Fetcher::new(config).expect("build fetcher")
}

fn github_issue_body(number: u64, is_pr: bool) -> serde_json::Value {
    let mut issue = serde_json::json!({
        "title": "Crash on startup",
        "body": "See also #42 and check https://blog.example/post",
        "state": "open",
        "labels": [{"name": "bug"}, {"name": "P-high"}],
        "user": {"login": "alice"},
        "comments": 2,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z",
        "reactions": {"+1": 2, "-1": 0},
        "number": number,
    });
    if is_pr {
        issue["pull_request"] = serde_json::json!({"merged_at": "2024-02-01T00:00:00Z"});
        issue["state"] = serde_json::json!("closed");
    }
    issue
}

#[tokio::test]
async fn github_issue_collects_comments_refs_and_timeline() {
    let server = StubServer::spawn(|path| match path {
        "/repos/o/r/issues/1" => StubResponse::json(github_issue_body(1, false)),
        "/repos/o/r/issues/1/comments?page=1&per_page=100" => StubResponse::json(serde_json::json!([
            {
                "user": {"login": "bob"},
                "created_at": "2024-01-03T00:00:00Z",
                "body": "duplicate of #7",
                "reactions": {"heart": 1}
            },
            {
                "user": {"login": "carol"},
                "created_at": "2024-01-04T00:00:00Z",
                "body": "confirmed on nightly"
            }
        ])),
        "/repos/o/r/issues/1/timeline?per_page=100" => StubResponse::json(serde_json::json!([
            {
                "event": "cross-referenced",
                "source": {"issue": {
                    "number": 9,
                    "title": "Linked issue",
                    "repository": {"full_name": "x/y"}
                }}
            },
            {"event": "referenced", "commit_id": SHA}
        ])),
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let doc = github::fetch(&fetcher, "https://github.com/o/r/issues/1").await;

    assert_eq!(doc.doc_type, DocumentType::GithubIssue);
    assert_eq!(doc.title, "Crash on startup");
    assert_eq!(doc.state.as_deref(), Some("open"));
    assert_eq!(doc.labels, vec!["bug", "P-high"]);
    assert_eq!(doc.comments.len(), 2);
    assert_eq!(doc.comments[0].author, "bob");
    assert_eq!(doc.comments[0].reactions.get("heart"), Some(&1));
    assert_eq!(doc.metadata["author"], "alice");
    assert!(doc.error.is_none(), "unexpected error: {:?}", doc.error);

    let entries: Vec<(RefKind, &str)> = doc
        .refs
        .iter()
        .map(|r| (r.kind, r.url.as_str()))
        .collect();
    assert!(entries.contains(&(RefKind::Related, "https://github.com/o/r/issues/42")));
    assert!(entries.contains(&(RefKind::Duplicate, "https://github.com/o/r/issues/7")));
    assert!(entries.contains(&(RefKind::Url, "https://blog.example/post")));
    assert!(entries.contains(&(RefKind::CrossRefIssue, "https://github.com/x/y/issues/9")));
    let commit_url = format!("https://github.com/o/r/commit/{SHA}");
    assert!(entries.contains(&(RefKind::Commit, commit_url.as_str())));
}

#[tokio::test]
async fn github_pr_merges_review_comments_and_state() {
    let server = StubServer::spawn(|path| match path {
        "/repos/o/r/issues/2" => StubResponse::json(github_issue_body(2, true)),
        "/repos/o/r/issues/2/comments?page=1&per_page=100" => {
            StubResponse::json(serde_json::json!([]))
        }
        "/repos/o/r/pulls/2/reviews?per_page=50" => StubResponse::json(serde_json::json!([
            {
                "state": "APPROVED",
                "user": {"login": "dana"},
                "submitted_at": "2024-01-05T00:00:00Z",
                "body": "LGTM overall"
            },
            {"state": "COMMENTED", "user": {"login": "eli"}, "body": "   "}
        ])),
        "/repos/o/r/issues/2/timeline?per_page=100" => StubResponse::json(serde_json::json!([])),
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let doc = github::fetch(&fetcher, "https://github.com/o/r/pull/2").await;

    assert_eq!(doc.doc_type, DocumentType::GithubPr);
    assert_eq!(doc.url, "https://github.com/o/r/pull/2");
    assert_eq!(doc.state.as_deref(), Some("merged"));
    // The blank review body is dropped; the real one is tagged.
    assert_eq!(doc.comments.len(), 1);
    assert_eq!(doc.comments[0].body, "[Review: APPROVED] LGTM overall");
    assert_eq!(doc.comments[0].author, "dana");
}

#[tokio::test]
async fn github_api_failure_yields_document_with_error() {
    let server = StubServer::spawn(|_| StubResponse::error(403));

    let fetcher = fetcher_for(&server.base_url);
    let doc = github::fetch(&fetcher, "https://github.com/o/r/issues/3").await;

    assert_eq!(doc.doc_type, DocumentType::GithubIssue);
    assert!(doc.title.is_empty());
    let error = doc.error.expect("error is set");
    assert!(error.contains("failed to fetch issue"), "error: {error}");
    assert!(error.contains("403"), "error: {error}");
}

#[tokio::test]
async fn reddit_post_builds_bounded_comment_tree() {
    let server = StubServer::spawn(|path| match path {
        "/r/rust/comments/abc/title.json?limit=500&depth=4" => {
            StubResponse::json(serde_json::json!([
                {"data": {"children": [{"data": {
                    "title": "Async question",
                    "selftext": "Context at https://blog.example/async",
                    "author": "poster",
                    "created_utc": 1700000000.0,
                    "score": 42,
                    "upvote_ratio": 0.97,
                    "num_comments": 3,
                    "subreddit": "rust"
                }}]}},
                {"data": {"children": [
                    {"kind": "t1", "data": {
                        "author": "first",
                        "body": "top-level answer",
                        "created_utc": 1700000100.0,
                        "score": 10,
                        "replies": {"data": {"children": [
                            {"kind": "t1", "data": {
                                "author": "second",
                                "body": "nested reply",
                                "created_utc": 1700000200.0,
                                "score": 3,
                                "replies": ""
                            }}
                        ]}}
                    }},
                    {"kind": "more", "data": {"count": 12}}
                ]}}
            ]))
        }
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let doc = reddit::fetch(&fetcher, "https://www.reddit.com/r/rust/comments/abc/title/").await;

    assert_eq!(doc.doc_type, DocumentType::RedditPost);
    assert_eq!(doc.title, "Async question");
    assert!(doc.error.is_none(), "unexpected error: {:?}", doc.error);
    assert_eq!(doc.metadata["subreddit"], "rust");

    // Flattened depth-first, "more" stubs skipped, tree retained.
    assert_eq!(doc.comments.len(), 2);
    assert_eq!(doc.comments[0].body, "top-level answer");
    assert_eq!(doc.comments[0].depth, Some(0));
    assert_eq!(doc.comments[1].body, "nested reply");
    assert_eq!(doc.comments[1].depth, Some(1));
    assert_eq!(doc.comment_tree.len(), 1);
    assert_eq!(doc.comment_tree[0].replies.len(), 1);

    assert!(
        doc.refs
            .iter()
            .any(|r| r.url == "https://blog.example/async")
    );
}

#[tokio::test]
async fn reddit_api_failure_falls_back_to_web_fetch() {
    let server = StubServer::spawn(|path| {
        if path.starts_with("/r/rust/comments/abc/title.json") {
            StubResponse::error(503)
        } else if path == "/r/rust/comments/abc/title" {
            StubResponse::html(
                "<html><head><title>Thread mirror</title></head>\
                 <body><p>Mirrored content with <a href=\"/archive\">archive copy</a>.</p></body></html>",
            )
        } else {
            StubResponse::not_found()
        }
    });

    let fetcher = fetcher_for(&server.base_url);
    let url = format!("{}/r/rust/comments/abc/title", server.base_url);
    let doc = reddit::fetch(&fetcher, &url).await;

    assert_eq!(doc.doc_type, DocumentType::RedditPost);
    let error = doc.error.as_deref().expect("error is set");
    assert!(error.contains("Reddit API failed"), "error: {error}");
    assert_eq!(doc.title, "Thread mirror");
    assert!(!doc.links.is_empty(), "fallback recovers links");
}

#[tokio::test]
async fn hn_item_strips_comment_markup() {
    let server = StubServer::spawn(|path| match path {
        "/api/v1/items/123" => StubResponse::json(serde_json::json!({
            "title": "Show HN: chain tracking",
            "text": "",
            "url": "https://project.example",
            "author": "dan",
            "created_at": "2024-03-01T00:00:00Z",
            "points": 120,
            "num_comments": 2,
            "type": "story",
            "children": [
                {
                    "author": "erin",
                    "created_at": "2024-03-01T01:00:00Z",
                    "text": "<p>Great &amp; useful, it&#x27;s fast</p>",
                    "children": [
                        {
                            "author": "frank",
                            "created_at": "2024-03-01T02:00:00Z",
                            "text": "agreed",
                            "children": []
                        }
                    ]
                },
                {"text": "deleted comment without author", "children": []}
            ]
        })),
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let doc = hn::fetch(&fetcher, "https://news.ycombinator.com/item?id=123").await;

    assert_eq!(doc.doc_type, DocumentType::HnItem);
    assert_eq!(doc.title, "Show HN: chain tracking");
    assert_eq!(doc.body, "https://project.example");
    assert_eq!(doc.metadata["score"], 120);
    assert!(doc.error.is_none(), "unexpected error: {:?}", doc.error);

    assert_eq!(doc.comments.len(), 2);
    assert_eq!(doc.comments[0].body, "Great & useful, it's fast");
    assert_eq!(doc.comments[1].author, "frank");
    assert_eq!(doc.comments[1].depth, Some(1));
}

#[tokio::test]
async fn v2ex_topic_reads_replies() {
    let server = StubServer::spawn(|path| match path {
        "/api/topics/show.json?id=9" => StubResponse::json(serde_json::json!([{
            "title": "Rust async runtime",
            "content": "Benchmarks at https://bench.example/run",
            "member": {"username": "zhang"},
            "created": 1700000000,
            "replies": 1,
            "node": {"name": "rust"}
        }])),
        "/api/replies/show.json?topic_id=9" => StubResponse::json(serde_json::json!([{
            "member": {"username": "li"},
            "created": 1700000500,
            "content": "tokio wins here"
        }])),
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let doc = v2ex::fetch(&fetcher, "https://www.v2ex.com/t/9").await;

    assert_eq!(doc.doc_type, DocumentType::V2exTopic);
    assert_eq!(doc.title, "Rust async runtime");
    assert!(doc.error.is_none(), "unexpected error: {:?}", doc.error);
    assert_eq!(doc.metadata["author"], "zhang");
    assert_eq!(doc.metadata["node"], "rust");
    assert_eq!(doc.comments.len(), 1);
    assert_eq!(doc.comments[0].author, "li");
    assert!(doc.refs.iter().any(|r| r.url == "https://bench.example/run"));
}

#[tokio::test]
async fn v2ex_api_failure_falls_back_to_web_fetch() {
    let server = StubServer::spawn(|path| {
        if path.starts_with("/api/topics/show.json") {
            StubResponse::error(500)
        } else if path == "/t/9" {
            StubResponse::html(
                "<html><head><title>Topic mirror</title></head>\
                 <body><p>Cached topic body with <a href=\"/related-topic\">related topic</a>.</p></body></html>",
            )
        } else {
            StubResponse::not_found()
        }
    });

    let fetcher = fetcher_for(&server.base_url);
    let url = format!("{}/t/9", server.base_url);
    let doc = v2ex::fetch(&fetcher, &url).await;

    assert_eq!(doc.doc_type, DocumentType::V2exTopic);
    let error = doc.error.as_deref().expect("error is set");
    assert!(error.contains("V2EX API failed"), "error: {error}");
    assert_eq!(doc.title, "Topic mirror");
    assert!(!doc.links.is_empty(), "fallback recovers links");
}

#[tokio::test]
async fn web_page_extracts_title_links_and_refs() {
    let server = StubServer::spawn(|path| match path {
        "/page" => StubResponse::html(
            "<html><head><title>Example Docs</title></head>\
             <body>\
             <nav><a href=\"/nav-entry\">Navigation entry</a></nav>\
             <p>Intro text mentioning https://reflink.example/deep for background.</p>\
             <p><a href=\"/child-a\">Child A</a> and <a href=\"/child-b\">Child B</a> \
             plus <a href=\"/logo.png\">Logo file</a>.</p>\
             <footer><a href=\"/footer-entry\">Footer entry</a></footer>\
             </body></html>",
        ),
        _ => StubResponse::not_found(),
    });

    let fetcher = fetcher_for(&server.base_url);
    let url = format!("{}/page", server.base_url);
    let doc = web::fetch(&fetcher, &url).await;

    assert_eq!(doc.doc_type, DocumentType::WebPage);
    assert_eq!(doc.title, "Example Docs");
    assert!(doc.error.is_none(), "unexpected error: {:?}", doc.error);
    assert!(doc.body.contains("Intro text mentioning"));

    let link_urls: Vec<&str> = doc.links.iter().map(|l| l.url.as_str()).collect();
    assert!(link_urls.contains(&format!("{}/child-a", server.base_url).as_str()));
    assert!(link_urls.contains(&format!("{}/child-b", server.base_url).as_str()));
    assert!(
        !link_urls.iter().any(|u| u.contains("nav-entry")
            || u.contains("footer-entry")
            || u.contains("logo.png")),
        "boilerplate and asset links are excluded: {link_urls:?}"
    );

    assert!(
        doc.refs
            .iter()
            .any(|r| r.kind == RefKind::Url && r.url == "https://reflink.example/deep"),
        "refs from cleaned body: {:?}",
        doc.refs
    );
}

#[tokio::test]
async fn web_fetch_failure_sets_error() {
    let server = StubServer::spawn(|_| StubResponse::error(500));

    let fetcher = fetcher_for(&server.base_url);
    let url = format!("{}/gone", server.base_url);
    let doc = web::fetch(&fetcher, &url).await;

    assert_eq!(doc.doc_type, DocumentType::WebPage);
    let error = doc.error.expect("error is set");
    assert!(error.contains("failed to fetch"), "error: {error}");
    assert!(doc.body.is_empty());
}

#[tokio::test]
async fn router_rejects_unsupported_schemes() {
    let fetcher = fetcher_for("http://127.0.0.1:1");
    assert!(fetcher.fetch("ftp://example.com/file").await.is_err());
    assert!(fetcher.fetch("not a url").await.is_err());
}
