use crate::formats::{TrackNode, truncate_chars};
use crate::llm::LlmClient;

const MAX_BODY_EXCERPT_CHARS: usize = 500;
const MAX_COMMENT_EXCERPT_CHARS: usize = 100;
const MAX_COMMENT_EXCERPTS: usize = 5;

/// Fold the just-visited node into the running knowledge state. On any
/// service failure (or an empty reply) the update degrades to deterministic
/// concatenation so the crawl never stalls here.
pub async fn update_knowledge(llm: &LlmClient, knowledge_state: &str, node: &TrackNode) -> String {
    let prompt = build_prompt(knowledge_state, node);

    match llm.complete(&prompt).await {
        Ok(raw) => {
            let updated = raw.trim();
            if updated.is_empty() {
                fallback(knowledge_state, &node.title)
            } else {
                updated.to_owned()
            }
        }
        Err(err) => {
            tracing::warn!(
                url = %node.url,
                error = %format!("{err:#}"),
                "knowledge update failed; falling back to concatenation"
            );
            fallback(knowledge_state, &node.title)
        }
    }
}

fn fallback(knowledge_state: &str, title: &str) -> String {
    if knowledge_state.is_empty() {
        format!("Read: {title}.")
    } else {
        format!("{knowledge_state} Also read: {title}.")
    }
}

fn build_prompt(knowledge_state: &str, node: &TrackNode) -> String {
    let current = if knowledge_state.is_empty() {
        "Nothing known yet."
    } else {
        knowledge_state
    };
    let body = truncate_chars(&node.body, MAX_BODY_EXCERPT_CHARS);
    let comments = node
        .comments
        .iter()
        .take(MAX_COMMENT_EXCERPTS)
        .map(|comment| truncate_chars(&comment.body, MAX_COMMENT_EXCERPT_CHARS))
        .collect::<Vec<_>>()
        .join(" ");

    let mut prompt = format!(
        "Current knowledge state: {current}\n\
\n\
Just read: \"{title}\"\n\
Content summary: {body}\n",
        title = node.title,
    );
    if !comments.trim().is_empty() {
        prompt.push_str(&format!("Key comments: {comments}\n"));
    }
    prompt.push_str(
        "\n\
Update the knowledge state in 1-2 sentences:\n\
- What new facts were learned?\n\
- What is still unclear or needs more investigation?\n\
\n\
Respond with ONLY the updated knowledge state text, no preamble.",
    );
    prompt
}
