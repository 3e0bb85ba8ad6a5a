//! CLI commands for measure-crawler.
//!
//! `crawl` runs the browser against a target list, `pending` and `summary`
//! inspect the audit log of a previous run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::config::{AppConfig, OutputFormat};
use crate::crawl::{CancelFlag, CrawlSettings, Crawler};
use crate::export::{save_table, OutputPaths};
use crate::flatten::flatten;
use crate::resolver::{load_targets, Resolver, VariantMap};
use crate::retry::{retry, RetryConfig};
use crate::scraper::{ChromeSession, Session};

#[derive(Parser)]
#[command(name = "measure-crawler")]
#[command(version, about = "Crawl measure pages from the CMIT portal into a flat table", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file; defaults to ./crawler.{toml,yaml,json} when present
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl every target and write the flat table plus audit log
    Crawl(CrawlArgs),

    /// List targets a resumed crawl would still visit
    Pending {
        /// Target list, one CMIT ID per line
        #[arg(value_name = "TARGETS")]
        targets: PathBuf,

        /// Audit log of the previous run
        #[arg(short, long)]
        audit: PathBuf,
    },

    /// Summarize an audit log
    Summary {
        /// Audit log (JSON Lines)
        #[arg(value_name = "AUDIT")]
        audit: PathBuf,
    },
}

#[derive(Args)]
pub struct CrawlArgs {
    /// Target list, one CMIT ID per line
    #[arg(value_name = "TARGETS")]
    pub targets: PathBuf,

    /// Mapping CSV with cmit_id and variant_id columns
    #[arg(short, long)]
    pub mapping: PathBuf,

    /// Output directory override
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output format override
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Skip targets already finished in this audit log
    #[arg(long, value_name = "AUDIT")]
    pub resume: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Crawl at most this many targets
    #[arg(long)]
    pub limit: Option<usize>,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let path = path
                .to_str()
                .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;
            AppConfig::load(Some(path))
        }
        None => AppConfig::load(None),
    }
}

/// Crawl the targets and write outputs.
pub async fn run_crawl(args: CrawlArgs, config_path: Option<PathBuf>) -> Result<()> {
    // Load configuration
    let mut config = load_config(config_path.as_deref())?;

    // Override with CLI args
    if let Some(dir) = args.output_dir {
        config.output.dir = dir.to_string_lossy().to_string();
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.headed {
        config.browser.headless = false;
    }

    let map = VariantMap::from_csv(&args.mapping)?;
    eprintln!("Loaded {} mappings from {}", map.len(), args.mapping.display());

    let targets = load_targets(&args.targets)?;
    let unmapped = targets.iter().filter(|t| map.resolve(t).is_none()).count();
    eprintln!("Loaded {} targets ({} without a variant id)", targets.len(), unmapped);

    let previous = match &args.resume {
        Some(path) => {
            let log = AuditLog::load(path)?;
            eprintln!("Resuming from {} ({} entries)", path.display(), log.len());
            Some(log)
        }
        None => None,
    };

    let mut pending = previous
        .as_ref()
        .unwrap_or(&AuditLog::default())
        .pending(&targets);
    if let Some(limit) = args.limit {
        pending.truncate(limit);
    }
    if pending.is_empty() {
        eprintln!("Nothing to crawl");
        return Ok(());
    }
    eprintln!("Crawling {} targets...", pending.len());

    // Ctrl-C stops after the current page; partial output is still written
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current page");
                cancel.cancel();
            }
        });
    }

    let mut session = retry(&RetryConfig::browser(), "Browser launch", || {
        ChromeSession::launch(&config.browser, &config.portal.not_found_markers)
    })
    .await?;

    let crawler = Crawler::new(
        &mut session,
        &map,
        CrawlSettings::from_config(&config),
        config.rate_limit.limiter(),
    )
    .with_cancel(cancel);
    let crawler = match &previous {
        Some(log) => crawler.resume_from(log),
        None => crawler,
    };
    let report = crawler.run(&pending).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close browser: {}", e);
    }

    // Write outputs
    let rows = flatten(&report.records);
    std::fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("Failed to create output directory {}", config.output.dir))?;
    let paths = OutputPaths::new(
        &config.output.dir,
        &config.output.prefix,
        config.output.format,
        &Local::now(),
    );
    save_table(&paths.table, &rows, config.output.format)?;
    eprintln!("Wrote {} rows to {}", rows.len(), paths.table.display());

    let summary = report.audit.summary();
    let mut audit = previous.unwrap_or_default();
    audit.extend(report.audit);
    audit.save(&paths.audit)?;
    eprintln!("Wrote {} audit entries to {}", audit.len(), paths.audit.display());

    println!("{}", summary);
    if report.cancelled {
        eprintln!(
            "Run was interrupted; continue with --resume {}",
            paths.audit.display()
        );
    }
    info!("Done");

    Ok(())
}

/// Print the targets a resumed crawl would still visit.
pub fn run_pending(targets_path: PathBuf, audit_path: PathBuf) -> Result<()> {
    let targets = load_targets(&targets_path)?;
    let audit = AuditLog::load(&audit_path)?;

    let pending = audit.pending(&targets);
    for code in &pending {
        println!("{}", code);
    }
    eprintln!("{} of {} targets pending", pending.len(), targets.len());
    Ok(())
}

/// Print an audit log summary.
pub fn run_summary(audit_path: PathBuf) -> Result<()> {
    let audit = AuditLog::load(&audit_path)?;
    if audit.is_empty() {
        eprintln!("{} has no entries", audit_path.display());
        return Ok(());
    }
    println!("{}", audit.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_crawl() {
        let cli = Cli::try_parse_from([
            "measure-crawler",
            "crawl",
            "targets.txt",
            "--mapping",
            "map.csv",
            "--format",
            "parquet",
            "--limit",
            "10",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Crawl(args) => {
                assert_eq!(args.targets, PathBuf::from("targets.txt"));
                assert_eq!(args.format, Some(OutputFormat::Parquet));
                assert_eq!(args.limit, Some(10));
                assert!(!args.headed);
                assert!(args.resume.is_none());
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_crawl_requires_mapping() {
        assert!(Cli::try_parse_from(["measure-crawler", "crawl", "targets.txt"]).is_err());
    }
}
