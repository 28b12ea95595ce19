use std::collections::BTreeMap;

use anyhow::Context as _;

use crate::formats::{Comment, CommentNode, DocumentType, ThreadDocument};
use crate::refs;

use super::{Fetcher, flatten_comments, get_json, scalar_string, str_field, web_fallback};

pub(crate) const MAX_COMMENT_NODES: usize = 200;
pub(crate) const MAX_COMMENT_DEPTH: u32 = 4;

pub async fn fetch(fetcher: &Fetcher, url: &str) -> ThreadDocument {
    let mut doc = ThreadDocument::new(url, DocumentType::RedditPost);
    super::stamp_fetched_at(&mut doc);

    let listing_url = match listing_url(&fetcher.config.reddit_base, url) {
        Ok(value) => value,
        Err(err) => {
            doc.error = Some(format!("failed to build reddit listing url: {err:#}"));
            return doc;
        }
    };

    match populate(fetcher, &listing_url, &mut doc).await {
        Ok(()) => doc,
        Err(err) => web_fallback(fetcher, url, doc, "Reddit", err).await,
    }
}

/// The read-only listing endpoint: post path + `.json`, bounded server-side
/// by limit/depth query params.
fn listing_url(base: &str, url: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(url).context("parse reddit url")?;
    let path = parsed.path().trim_end_matches('/');
    Ok(format!(
        "{}{path}.json?limit=500&depth={MAX_COMMENT_DEPTH}",
        base.trim_end_matches('/')
    ))
}

async fn populate(
    fetcher: &Fetcher,
    listing_url: &str,
    doc: &mut ThreadDocument,
) -> anyhow::Result<()> {
    let listing = get_json(&fetcher.client, listing_url).await?;

    // Reddit returns [post_listing, comment_listing].
    let post = listing
        .pointer("/0/data/children/0/data")
        .ok_or_else(|| anyhow::anyhow!("unexpected reddit listing shape"))?;

    doc.title = str_field(post, "title");
    doc.body = str_field(post, "selftext");
    if doc.body.is_empty() {
        doc.body = str_field(post, "url");
    }

    doc.metadata.insert(
        "author".to_owned(),
        post.get("author").cloned().unwrap_or(serde_json::Value::Null),
    );
    for (key, field) in [
        ("created", "created_utc"),
        ("score", "score"),
        ("upvote_ratio", "upvote_ratio"),
        ("comment_count", "num_comments"),
        ("subreddit", "subreddit"),
        ("flair", "link_flair_text"),
    ] {
        if let Some(value) = post.get(field)
            && !value.is_null()
        {
            doc.metadata.insert(key.to_owned(), value.clone());
        }
    }

    let tree: Vec<CommentNode> = listing
        .pointer("/1/data/children")
        .and_then(|v| v.as_array())
        .map(|children| {
            children
                .iter()
                .filter_map(|child| parse_comment(child, 0))
                .collect()
        })
        .unwrap_or_default();

    let mut flat = Vec::new();
    flatten_comments(&tree, MAX_COMMENT_NODES, &mut flat);
    doc.comment_tree = tree;
    doc.comments = flat;

    let mut all_text = doc.body.clone();
    for comment in &doc.comments {
        all_text.push(' ');
        all_text.push_str(&comment.body);
    }
    doc.refs = refs::extract_refs(&all_text, None);

    Ok(())
}

fn parse_comment(node: &serde_json::Value, depth: u32) -> Option<CommentNode> {
    if node.get("kind").and_then(|v| v.as_str()) != Some("t1") {
        return None;
    }
    let data = node.get("data")?;

    let mut comment = CommentNode {
        comment: Comment {
            author: str_field(data, "author"),
            date: data
                .get("created_utc")
                .map(scalar_string)
                .unwrap_or_default(),
            body: str_field(data, "body"),
            score: data.get("score").and_then(|v| v.as_i64()),
            depth: Some(depth),
            reactions: BTreeMap::new(),
        },
        replies: Vec::new(),
    };

    // `replies` is an empty string on leaf comments, a listing otherwise.
    if depth < MAX_COMMENT_DEPTH
        && let Some(children) = data.pointer("/replies/data/children").and_then(|v| v.as_array())
    {
        comment.replies = children
            .iter()
            .filter_map(|child| parse_comment(child, depth + 1))
            .collect();
    }

    Some(comment)
}
