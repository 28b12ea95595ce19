pub mod github;
pub mod hn;
pub mod reddit;
pub mod v2ex;
pub mod web;

use std::time::Duration;

use anyhow::Context as _;

use crate::cli::{FetchArgs, FetchFormat};
use crate::config::FetchConfig;
use crate::formats::{Comment, CommentNode, ThreadDocument, render_markdown, truncate_chars};
use crate::platform::{self, Platform};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = "Mozilla/5.0 (compatible; chaintrail/0.1)";

/// Routes a URL to the matching platform adapter and exposes one normalized
/// entry point. Platform adapters absorb their own failures into the
/// document's `error` field; an `Err` from [`Fetcher::fetch`] means the URL
/// itself was unusable.
#[derive(Debug, Clone)]
pub struct Fetcher {
    pub(crate) client: reqwest::Client,
    pub(crate) config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .context("build fetch http client")?;

        Ok(Self { client, config })
    }

    pub async fn fetch(&self, url: &str) -> anyhow::Result<ThreadDocument> {
        let parsed = url::Url::parse(url).with_context(|| format!("parse url: {url}"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("unsupported scheme: {url}");
        }

        let doc = match platform::detect(url) {
            Platform::Github => github::fetch(self, url).await,
            Platform::Reddit => reddit::fetch(self, url).await,
            Platform::HackerNews => hn::fetch(self, url).await,
            Platform::V2ex => v2ex::fetch(self, url).await,
            Platform::Web => web::fetch(self, url).await,
        };
        Ok(doc)
    }
}

pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let mut config = FetchConfig::from_env();
    config.max_comments = args.max_comments;
    let fetcher = Fetcher::new(config).context("build fetcher")?;

    let doc = fetcher.fetch(&args.url).await.context("fetch thread")?;

    if args.refs_only {
        let ref_count = doc.refs.len();
        let out = serde_json::json!({
            "url": doc.url,
            "type": doc.doc_type,
            "refs": doc.refs,
            "ref_count": ref_count,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("serialize refs")?
        );
        return Ok(());
    }

    match args.format {
        FetchFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&doc).context("serialize document")?
        ),
        FetchFormat::Markdown => println!("{}", render_markdown(&doc)),
    }
    Ok(())
}

/// Shared degradation path: keep whatever the platform API recovered, fetch
/// the page as plain web content and merge the recoverable fields. The error
/// stays on the document.
pub(crate) async fn web_fallback(
    fetcher: &Fetcher,
    url: &str,
    mut doc: ThreadDocument,
    api_name: &str,
    err: anyhow::Error,
) -> ThreadDocument {
    tracing::warn!(
        url,
        api = api_name,
        error = %format!("{err:#}"),
        "platform api failed; falling back to web fetch"
    );
    doc.note_error(format!("{api_name} API failed: {err:#}; fell back to web fetch"));

    let fallback = web::fetch(fetcher, url).await;
    if doc.title.is_empty() {
        doc.title = fallback.title;
    }
    doc.body = fallback.body;
    doc.links = fallback.links;
    doc.refs = fallback.refs;
    doc
}

pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<serde_json::Value> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("read body: {url}"))?;
    if !status.is_success() {
        anyhow::bail!("GET {url} returned {status}: {}", truncate_chars(&body, 200));
    }
    serde_json::from_str(&body).with_context(|| format!("parse json: {url}"))
}

pub(crate) fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned()
}

pub(crate) fn scalar_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Depth-first flatten of a comment tree, bounded to `limit` total nodes.
pub(crate) fn flatten_comments(nodes: &[CommentNode], limit: usize, flat: &mut Vec<Comment>) {
    for node in nodes {
        if flat.len() >= limit {
            return;
        }
        flat.push(node.comment.clone());
        flatten_comments(&node.replies, limit, flat);
    }
}

pub(crate) fn stamp_fetched_at(doc: &mut ThreadDocument) {
    doc.metadata.insert(
        "fetched_at".to_owned(),
        serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
    );
}
