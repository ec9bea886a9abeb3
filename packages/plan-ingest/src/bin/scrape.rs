// Command line entry point for scrape runs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plan_ingest::{
    Config, HttpFetcher, IngestionWriter, OpenAI, PgVectorStore, PostgresPlanStore, Scraper,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plan-scrape", about = "Crawl a training-plan site and ingest its plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl from SEED_URL and commit every plan found
    Scrape {
        seed_url: String,

        /// Override MAX_DEPTH
        #[arg(long)]
        max_depth: Option<usize>,

        /// Override RUN_TIMEOUT_SECS
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plan_ingest=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;

    let plans = PostgresPlanStore::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Command::Migrate => {
            plans.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Migrations complete");
        }
        Command::Scrape {
            seed_url,
            max_depth,
            timeout_secs,
        } => {
            if let Some(depth) = max_depth {
                config.pipeline.crawl.max_depth = depth;
            }
            if let Some(secs) = timeout_secs {
                config.pipeline.run_timeout = Duration::from_secs(secs);
            }

            let openai = OpenAI::new(config.openai_api_key.clone())
                .with_model(config.classifier_model.clone())
                .with_embedding_model(config.embedding_model.clone());
            let vectors = PgVectorStore::new(plans.pool().clone(), openai.clone());
            let writer = IngestionWriter::new(vectors, plans, config.embedding_model.clone());
            let fetcher =
                HttpFetcher::new(&config.pipeline.crawl).context("Failed to build HTTP client")?;
            let scraper = Scraper::new(fetcher, Arc::new(openai), writer, config.pipeline);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling scrape");
                    on_signal.cancel();
                }
            });

            let report = scraper
                .scrape_url(&cancel, &seed_url)
                .await
                .with_context(|| format!("Scrape of {seed_url} failed"))?;

            tracing::info!(
                pages_visited = report.pages_visited,
                committed = report.committed,
                failures = report.failures.len(),
                "Done"
            );
        }
    }

    Ok(())
}
