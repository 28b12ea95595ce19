use std::collections::BTreeMap;

use anyhow::Context as _;

use crate::formats::{Comment, DocumentType, ThreadDocument};
use crate::refs;

use super::{Fetcher, get_json, scalar_string, str_field, web_fallback};

pub async fn fetch(fetcher: &Fetcher, url: &str) -> ThreadDocument {
    let mut doc = ThreadDocument::new(url, DocumentType::V2exTopic);
    super::stamp_fetched_at(&mut doc);

    let Some(topic_id) = topic_id(url) else {
        doc.error = Some("cannot parse V2EX topic id from url".to_owned());
        return doc;
    };

    match populate(fetcher, &topic_id, &mut doc).await {
        Ok(()) => doc,
        Err(err) => web_fallback(fetcher, url, doc, "V2EX", err).await,
    }
}

fn topic_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["t", id] if !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()) => {
            Some((*id).to_owned())
        }
        _ => None,
    }
}

async fn populate(fetcher: &Fetcher, topic_id: &str, doc: &mut ThreadDocument) -> anyhow::Result<()> {
    let base = fetcher.config.v2ex_base.trim_end_matches('/');

    let topics = get_json(
        &fetcher.client,
        &format!("{base}/api/topics/show.json?id={topic_id}"),
    )
    .await
    .context("fetch topic")?;
    let topic = topics
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("empty v2ex topic response"))?;

    doc.title = str_field(topic, "title");
    doc.body = str_field(topic, "content");
    doc.metadata.insert(
        "author".to_owned(),
        topic
            .pointer("/member/username")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    );
    for (key, pointer) in [
        ("created", "/created"),
        ("reply_count", "/replies"),
        ("node", "/node/name"),
    ] {
        if let Some(value) = topic.pointer(pointer)
            && !value.is_null()
        {
            doc.metadata.insert(key.to_owned(), value.clone());
        }
    }

    // Replies are a flat list; a failure here degrades the whole fetch to the
    // web fallback rather than returning a topic with silently missing
    // discussion.
    let replies = get_json(
        &fetcher.client,
        &format!("{base}/api/replies/show.json?topic_id={topic_id}"),
    )
    .await
    .context("fetch replies")?;

    if let Some(items) = replies.as_array() {
        for reply in items {
            doc.comments.push(Comment {
                author: reply
                    .pointer("/member/username")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned(),
                date: reply.get("created").map(scalar_string).unwrap_or_default(),
                body: str_field(reply, "content"),
                score: None,
                depth: None,
                reactions: BTreeMap::new(),
            });
        }
    }

    let mut all_text = doc.body.clone();
    for comment in &doc.comments {
        all_text.push(' ');
        all_text.push_str(&comment.body);
    }
    doc.refs = refs::extract_refs(&all_text, None);

    Ok(())
}
