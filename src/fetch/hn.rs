use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::formats::{Comment, CommentNode, DocumentType, ThreadDocument, collapse_ws};
use crate::refs;

use super::{Fetcher, flatten_comments, get_json, str_field, web_fallback};

pub(crate) const MAX_COMMENT_NODES: usize = 200;

pub async fn fetch(fetcher: &Fetcher, url: &str) -> ThreadDocument {
    let mut doc = ThreadDocument::new(url, DocumentType::HnItem);
    super::stamp_fetched_at(&mut doc);

    let Some(item_id) = item_id(url) else {
        doc.error = Some("cannot parse HN item id from url".to_owned());
        return doc;
    };

    match populate(fetcher, &item_id, &mut doc).await {
        Ok(()) => doc,
        Err(err) => web_fallback(fetcher, url, doc, "HN", err).await,
    }
}

fn item_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()))
}

async fn populate(fetcher: &Fetcher, item_id: &str, doc: &mut ThreadDocument) -> anyhow::Result<()> {
    let item = get_json(
        &fetcher.client,
        &format!("{}/api/v1/items/{item_id}", fetcher.config.hn_api),
    )
    .await?;

    doc.title = str_field(&item, "title");
    if doc.title.is_empty() {
        doc.title = str_field(&item, "story_title");
    }
    doc.body = str_field(&item, "text");
    if doc.body.is_empty() {
        doc.body = str_field(&item, "url");
    }

    doc.metadata.insert(
        "author".to_owned(),
        item.get("author").cloned().unwrap_or(serde_json::Value::Null),
    );
    for (key, field) in [
        ("created", "created_at"),
        ("score", "points"),
        ("comment_count", "num_comments"),
        ("item_type", "type"),
    ] {
        if let Some(value) = item.get(field)
            && !value.is_null()
        {
            doc.metadata.insert(key.to_owned(), value.clone());
        }
    }

    let tree: Vec<CommentNode> = item
        .get("children")
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
    let author = str_field(node, "author");
    if author.is_empty() {
        return None;
    }

    let mut comment = CommentNode {
        comment: Comment {
            author,
            date: str_field(node, "created_at"),
            body: strip_html(&str_field(node, "text")),
            score: node.get("points").and_then(|v| v.as_i64()),
            depth: Some(depth),
            reactions: BTreeMap::new(),
        },
        replies: Vec::new(),
    };

    if let Some(children) = node.get("children").and_then(|v| v.as_array()) {
        comment.replies = children
            .iter()
            .filter_map(|child| parse_comment(child, depth + 1))
            .collect();
    }

    Some(comment)
}

/// Algolia serves comment bodies as HTML fragments; flatten them to text.
fn strip_html(input: &str) -> String {
    lazy_static! {
        static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    }
    collapse_ws(&unescape_entities(&TAG.replace_all(input, " ")))
}

fn unescape_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
