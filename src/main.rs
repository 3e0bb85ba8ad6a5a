//! measure-crawler
//!
//! Crawl-and-extract engine for quality measure pages on the CMIT portal:
//! resolves measure codes to variant ids, renders each section page in a
//! headless browser, extracts tables, and writes a flat table plus an
//! audit log.

mod audit;
mod cli;
mod config;
mod crawl;
mod errors;
mod export;
mod flatten;
mod resolver;
mod retry;
mod scraper;
mod types;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Crawl(args) => cli::run_crawl(args, cli.config).await,
        Commands::Pending { targets, audit } => cli::run_pending(targets, audit),
        Commands::Summary { audit } => cli::run_summary(audit),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "measure_crawler=debug"
    } else {
        "measure_crawler=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
