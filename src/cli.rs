use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Track(TrackArgs),
    Fetch(FetchArgs),
    Score(ScoreArgs),
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Original search query driving relevance decisions.
    #[arg(long)]
    pub query: String,

    /// Seed URL to start from (repeatable).
    #[arg(long = "url", required = true)]
    pub urls: Vec<String>,

    /// Maximum hop count from the nearest seed.
    #[arg(long, default_value_t = 3)]
    pub max_depth: u32,

    /// Minimum relevance score for a candidate to survive the gate.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Maximum links followed per visited node.
    #[arg(long, default_value_t = 3)]
    pub max_per_level: usize,

    /// Write the result JSON to this file instead of stdout.
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URL to fetch (GitHub issue/PR, Reddit post, HN item, V2EX topic, or any web page).
    #[arg(long)]
    pub url: String,

    /// Maximum comments to fetch for threaded platforms.
    #[arg(long, default_value_t = 100)]
    pub max_comments: usize,

    /// Only output the extracted references, not the full thread.
    #[arg(long)]
    pub refs_only: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "json")]
    pub format: FetchFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchFormat {
    Json,
    Markdown,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Original search query.
    #[arg(long)]
    pub query: String,

    /// Current knowledge-state summary.
    #[arg(long, default_value = "")]
    pub knowledge: String,

    /// JSON array of {"url","anchor","context"} candidate objects.
    #[arg(long)]
    pub candidates: String,

    /// Minimum score threshold.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,
}
