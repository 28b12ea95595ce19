use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    GithubIssue,
    GithubPr,
    GithubDiscussion,
    RedditPost,
    HnItem,
    V2exTopic,
    WebPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Issue,
    Pr,
    Discussion,
    Commit,
    Duplicate,
    Related,
    Url,
    CrossRefIssue,
    CrossRefPr,
}

impl RefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Issue => "issue",
            RefKind::Pr => "pr",
            RefKind::Discussion => "discussion",
            RefKind::Commit => "commit",
            RefKind::Duplicate => "duplicate",
            RefKind::Related => "related",
            RefKind::Url => "url",
            RefKind::CrossRefIssue => "cross_ref_issue",
            RefKind::CrossRefPr => "cross_ref_pr",
        }
    }
}

/// A cross-reference recovered from free text or timeline events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: RefKind,
    pub url: String,
    pub context: String,
}

/// An anchor-tagged outbound link from a generic web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub anchor: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub date: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, u64>,
}

/// One node of a nested comment tree (Reddit, Hacker News).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentNode>,
}

/// The normalized record every platform fetcher produces. A fetcher never
/// fails past its boundary: partial failures set `error` and leave the rest
/// of the fields at whatever was gathered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDocument {
    pub url: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub title: String,
    pub body: String,
    pub state: Option<String>,
    pub labels: Vec<String>,
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comment_tree: Vec<CommentNode>,
    pub refs: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ThreadDocument {
    pub fn new(url: impl Into<String>, doc_type: DocumentType) -> Self {
        Self {
            url: url.into(),
            doc_type,
            title: String::new(),
            body: String::new(),
            state: None,
            labels: Vec::new(),
            comments: Vec::new(),
            comment_tree: Vec::new(),
            refs: Vec::new(),
            links: Vec::new(),
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    /// Append a failure note without clobbering earlier ones.
    pub fn note_error(&mut self, note: impl Into<String>) {
        let note = note.into();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {note}"),
            None => note,
        });
    }
}

/// A not-yet-visited link discovered inside a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub anchor: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub score: f64,
    pub reason: String,
}

/// One visited node in the crawl result. `score`/`reason` explain why the
/// node was visited; seeds carry score 1.0 and reason "seed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackNode {
    pub url: String,
    pub depth: u32,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub title: String,
    pub body: String,
    pub comments: Vec<Comment>,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResult {
    pub query: String,
    pub knowledge_state: String,
    pub nodes: Vec<TrackNode>,
    pub total_fetched: usize,
}

/// Slice off the first `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn render_markdown(doc: &ThreadDocument) -> String {
    let mut lines: Vec<String> = Vec::new();

    let title = if doc.title.is_empty() {
        "Untitled"
    } else {
        doc.title.as_str()
    };
    lines.push(format!("# {title}"));
    lines.push(format!("URL: {}", doc.url));

    let mut meta_parts = Vec::new();
    if let Some(author) = doc.metadata.get("author") {
        let author = metadata_scalar(author);
        if !author.is_empty() {
            meta_parts.push(format!("Author: @{author}"));
        }
    }
    if let Some(state) = doc.state.as_deref() {
        meta_parts.push(format!("State: {state}"));
    }
    if let Some(created) = doc.metadata.get("created") {
        let created = metadata_scalar(created);
        if !created.is_empty() {
            meta_parts.push(format!("Created: {created}"));
        }
    }
    if let Some(count) = doc.metadata.get("comment_count") {
        let count = metadata_scalar(count);
        if !count.is_empty() && count != "0" {
            meta_parts.push(format!("Comments: {count}"));
        }
    }
    if !meta_parts.is_empty() {
        lines.push(meta_parts.join(" | "));
    }

    if !doc.labels.is_empty() {
        lines.push(format!("Labels: {}", doc.labels.join(", ")));
    }

    lines.push(String::new());

    if !doc.body.is_empty() {
        lines.push("## Body".to_string());
        lines.push(truncate_chars(&doc.body, 5_000).to_string());
        lines.push(String::new());
    }

    if !doc.comments.is_empty() {
        lines.push(format!("## Comments ({})", doc.comments.len()));
        for (idx, comment) in doc.comments.iter().enumerate() {
            let author = if comment.author.is_empty() {
                "?"
            } else {
                comment.author.as_str()
            };
            let date = if comment.date.is_empty() {
                "?"
            } else {
                comment.date.as_str()
            };
            lines.push(format!("### Comment {} — @{author} ({date})", idx + 1));
            if comment.body.chars().count() > 2_000 {
                lines.push(format!(
                    "{}\n... (truncated)",
                    truncate_chars(&comment.body, 2_000)
                ));
            } else {
                lines.push(comment.body.clone());
            }
            if !comment.reactions.is_empty() {
                let reactions = comment
                    .reactions
                    .iter()
                    .map(|(name, count)| format!("{name}: {count}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("Reactions: {reactions}"));
            }
            lines.push(String::new());
        }
    }

    if !doc.refs.is_empty() {
        lines.push(format!("## References ({})", doc.refs.len()));
        for reference in &doc.refs {
            let context = if reference.context.is_empty() {
                String::new()
            } else {
                format!(" — {}", reference.context)
            };
            lines.push(format!(
                "- [{}] {}{context}",
                reference.kind.as_str(),
                reference.url
            ));
        }
        lines.push(String::new());
    }

    if let Some(error) = doc.error.as_deref() {
        lines.push(format!("## Error\n{error}"));
    }

    lines.join("\n")
}

fn metadata_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
