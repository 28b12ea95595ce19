use std::collections::{HashSet, VecDeque};

use anyhow::Context as _;

use crate::cli::TrackArgs;
use crate::config::{FetchConfig, LlmConfig};
use crate::fetch::Fetcher;
use crate::formats::{Candidate, ThreadDocument, TrackNode, TrackResult, truncate_chars};
use crate::gate;
use crate::llm::LlmClient;
use crate::summary;

/// Hard cap on candidates handed to the relevance gate per node; refs and
/// links beyond it are silently dropped.
pub const MAX_CANDIDATES_PER_NODE: usize = 20;

const MAX_NODE_BODY_CHARS: usize = 2_000;
const MAX_NODE_COMMENTS: usize = 10;

#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub query: String,
    pub seed_urls: Vec<String>,
    pub max_depth: u32,
    pub threshold: f64,
    pub max_per_level: usize,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    url: String,
    depth: u32,
    score: f64,
    reason: String,
}

/// Breadth-first, relevance-gated traversal from the seed URLs.
///
/// One traversal step (fetch, summarize, score, enqueue) completes before the
/// next queue entry is processed; the knowledge state is a strict fold over
/// the node-visitation order. Worst-case fetch count is
/// `seeds * max_per_level^max_depth`.
pub async fn track(request: &TrackRequest, fetcher: &Fetcher, llm: &LlmClient) -> TrackResult {
    let run_id = uuid::Uuid::new_v4();
    let mut visited: HashSet<String> = HashSet::new();
    let mut nodes: Vec<TrackNode> = Vec::new();
    let mut knowledge_state = String::new();

    let mut queue: VecDeque<QueueEntry> = request
        .seed_urls
        .iter()
        .map(|url| QueueEntry {
            url: url.clone(),
            depth: 0,
            score: 1.0,
            reason: "seed".to_owned(),
        })
        .collect();

    while let Some(entry) = queue.pop_front() {
        let canonical = entry.url.trim_end_matches('/').to_owned();
        if visited.contains(&canonical) || entry.depth > request.max_depth {
            continue;
        }
        visited.insert(canonical);

        tracing::info!(%run_id, depth = entry.depth, url = %entry.url, "fetching");
        let doc = match fetcher.fetch(&entry.url).await {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(
                    %run_id,
                    url = %entry.url,
                    error = %format!("{err:#}"),
                    "fetch failed; dropping node"
                );
                continue;
            }
        };

        let node = build_node(&entry, &doc);
        knowledge_state = summary::update_knowledge(llm, &knowledge_state, &node).await;
        tracing::debug!(
            %run_id,
            knowledge = %truncate_chars(&knowledge_state, 100),
            "knowledge updated"
        );
        nodes.push(node);

        // Terminal by depth: record the node but never expand it.
        if entry.depth == request.max_depth {
            continue;
        }

        let candidates = collect_candidates(&doc);
        if candidates.is_empty() {
            continue;
        }

        let scored = gate::score_candidates(
            llm,
            &request.query,
            &knowledge_state,
            &candidates,
            request.threshold,
        )
        .await;

        for candidate in scored.into_iter().take(request.max_per_level) {
            queue.push_back(QueueEntry {
                url: candidate.candidate.url,
                depth: entry.depth + 1,
                score: candidate.score,
                reason: candidate.reason,
            });
        }
    }

    tracing::info!(%run_id, nodes = nodes.len(), "traversal complete");
    TrackResult {
        query: request.query.clone(),
        knowledge_state,
        total_fetched: nodes.len(),
        nodes,
    }
}

pub async fn run(args: TrackArgs) -> anyhow::Result<()> {
    let llm_config = LlmConfig::from_env().context("load llm config")?;
    let llm = LlmClient::new(&llm_config).context("build llm client")?;
    let fetcher = Fetcher::new(FetchConfig::from_env()).context("build fetcher")?;

    let request = TrackRequest {
        query: args.query,
        seed_urls: args.urls,
        max_depth: args.max_depth,
        threshold: args.threshold,
        max_per_level: args.max_per_level,
    };
    let result = track(&request, &fetcher, &llm).await;

    let out = serde_json::to_string_pretty(&result).context("serialize track result")?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &out).with_context(|| format!("write results: {path}"))?;
            tracing::info!(path = %path, nodes = result.nodes.len(), "results written");
        }
        None => println!("{out}"),
    }
    Ok(())
}

fn build_node(entry: &QueueEntry, doc: &ThreadDocument) -> TrackNode {
    TrackNode {
        url: entry.url.clone(),
        depth: entry.depth,
        doc_type: doc.doc_type,
        title: doc.title.clone(),
        body: truncate_chars(&doc.body, MAX_NODE_BODY_CHARS).to_owned(),
        comments: doc.comments.iter().take(MAX_NODE_COMMENTS).cloned().collect(),
        score: entry.score,
        reason: entry.reason.clone(),
    }
}

/// Merge refs then links into one candidate list, deduplicated by canonical
/// URL and capped before any scoring happens.
fn collect_candidates(doc: &ThreadDocument) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    for reference in &doc.refs {
        if reference.url.is_empty() {
            continue;
        }
        if seen.insert(reference.url.trim_end_matches('/').to_owned()) {
            candidates.push(Candidate {
                url: reference.url.clone(),
                anchor: reference.kind.as_str().to_owned(),
                context: reference.context.clone(),
            });
        }
    }

    for link in &doc.links {
        if link.url.is_empty() {
            continue;
        }
        if seen.insert(link.url.trim_end_matches('/').to_owned()) {
            candidates.push(Candidate {
                url: link.url.clone(),
                anchor: link.anchor.clone(),
                context: link.context.clone(),
            });
        }
    }

    candidates.truncate(MAX_CANDIDATES_PER_NODE);
    candidates
}
