use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    chaintrail::logging::init().context("init logging")?;

    let cli = chaintrail::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        chaintrail::cli::Command::Track(args) => {
            chaintrail::track::run(args).await.context("track")?;
        }
        chaintrail::cli::Command::Fetch(args) => {
            chaintrail::fetch::run(args).await.context("fetch")?;
        }
        chaintrail::cli::Command::Score(args) => {
            chaintrail::gate::run(args).await.context("score")?;
        }
    }

    Ok(())
}
