use std::collections::HashMap;

use anyhow::Context as _;

use crate::cli::ScoreArgs;
use crate::config::LlmConfig;
use crate::formats::{Candidate, ScoredCandidate, truncate_chars};
use crate::llm::LlmClient;

const MAX_ANCHOR_CHARS: usize = 60;
const MAX_CONTEXT_CHARS: usize = 150;
const NEUTRAL_SCORE: f64 = 0.5;

/// Batch-score candidate links against the query and the current knowledge
/// state. One reasoning call per batch, never per candidate.
///
/// Fails open: if the service is unreachable or its output unparseable, every
/// candidate comes back at the neutral score so the crawl never halts on a
/// dead scorer.
pub async fn score_candidates(
    llm: &LlmClient,
    query: &str,
    knowledge_state: &str,
    candidates: &[Candidate],
    threshold: f64,
) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let prompt = build_prompt(query, knowledge_state, candidates);

    let raw = match llm.complete(&prompt).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(
                candidates = candidates.len(),
                error = %format!("{err:#}"),
                "relevance call failed; passing all candidates through"
            );
            return pass_through(candidates, "LLM unavailable");
        }
    };

    let scores = match parse_scores(&raw) {
        Ok(scores) => scores,
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                sample = truncate_chars(&raw, 200),
                "unparseable relevance response; passing all candidates through"
            );
            return pass_through(candidates, "parse error");
        }
    };

    let mut result: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| match scores.get(&(idx + 1)) {
            Some(entry) => ScoredCandidate {
                candidate: candidate.clone(),
                score: entry.score.clamp(0.0, 1.0),
                reason: entry.reason.clone(),
            },
            None => ScoredCandidate {
                candidate: candidate.clone(),
                score: NEUTRAL_SCORE,
                reason: String::new(),
            },
        })
        .filter(|scored| scored.score >= threshold)
        .collect();

    // Stable sort keeps discovery order on score ties.
    result.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result
}

pub async fn run(args: ScoreArgs) -> anyhow::Result<()> {
    let candidates: Vec<Candidate> =
        serde_json::from_str(&args.candidates).context("parse --candidates json")?;

    let config = LlmConfig::from_env().context("load llm config")?;
    let llm = LlmClient::new(&config).context("build llm client")?;

    let scored =
        score_candidates(&llm, &args.query, &args.knowledge, &candidates, args.threshold).await;

    let out = serde_json::to_string_pretty(&scored).context("serialize scored candidates")?;
    println!("{out}");
    Ok(())
}

fn pass_through(candidates: &[Candidate], reason: &str) -> Vec<ScoredCandidate> {
    candidates
        .iter()
        .map(|candidate| ScoredCandidate {
            candidate: candidate.clone(),
            score: NEUTRAL_SCORE,
            reason: reason.to_owned(),
        })
        .collect()
}

fn build_prompt(query: &str, knowledge_state: &str, candidates: &[Candidate]) -> String {
    let mut candidate_lines = Vec::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        let anchor = if candidate.anchor.is_empty() {
            truncate_chars(&candidate.context, MAX_ANCHOR_CHARS)
        } else {
            truncate_chars(&candidate.anchor, MAX_ANCHOR_CHARS)
        };
        candidate_lines.push(format!(
            "{n}. anchor=\"{anchor}\" url={url}\n   context=\"{context}\"",
            n = idx + 1,
            url = candidate.url,
            context = truncate_chars(&candidate.context, MAX_CONTEXT_CHARS),
        ));
    }

    let knowledge = if knowledge_state.is_empty() {
        "Nothing yet."
    } else {
        knowledge_state
    };

    format!(
        "You are a research assistant evaluating whether web links are worth following.\n\
\n\
Original query: {query}\n\
\n\
What we already know: {knowledge}\n\
\n\
Candidate links to evaluate:\n\
{candidates}\n\
\n\
For each candidate, score 0.0-1.0 how likely following this link will provide NEW, \
RELEVANT information to answer the original query.\n\
- Score > 0.7: definitely follow (directly relevant, likely new info)\n\
- Score 0.4-0.7: maybe follow (somewhat relevant or unclear)\n\
- Score < 0.4: skip (irrelevant, duplicate, or noise)\n\
\n\
Respond with ONLY a JSON array, no explanation outside JSON:\n\
[\n\
  {{\"id\": 1, \"score\": 0.9, \"reason\": \"one sentence\"}},\n\
  {{\"id\": 2, \"score\": 0.2, \"reason\": \"one sentence\"}},\n\
  ...\n\
]",
        candidates = candidate_lines.join("\n"),
    )
}

#[derive(Debug)]
struct ParsedScore {
    score: f64,
    reason: String,
}

fn parse_scores(raw: &str) -> anyhow::Result<HashMap<usize, ParsedScore>> {
    let json = extract_json_array(raw)?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(json).context("parse score array")?;

    let mut scores = HashMap::new();
    for entry in entries {
        let Some(id) = entry.get("id").and_then(|v| v.as_u64()) else {
            continue;
        };
        let score = entry
            .get("score")
            .and_then(|v| v.as_f64())
            .unwrap_or(NEUTRAL_SCORE);
        let reason = entry
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned();
        scores.insert(id as usize, ParsedScore { score, reason });
    }
    Ok(scores)
}

fn extract_json_array(text: &str) -> anyhow::Result<&str> {
    let text = strip_code_fences(text);
    let start = text.find('[').ok_or_else(|| anyhow::anyhow!("missing `[`"))?;
    let end = text.rfind(']').ok_or_else(|| anyhow::anyhow!("missing `]`"))?;
    if end <= start {
        anyhow::bail!("invalid json array span");
    }
    Ok(&text[start..=end])
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line, then the closing fence.
    let rest = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
    rest.trim_end().trim_end_matches('`').trim()
}
