//! Batch shadow runner CLI.
//!
//! Runs the shadow pipeline over a connector's matches (or an explicit
//! list) and prints the aggregated batch report as canonical JSON.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin shadow_batch -- \
//!   --connector real_provider \
//!   --db data/pitchbot.sqlite \
//!   --fixtures-dir fixtures \
//!   --reports-dir reports \
//!   --matches m-001,m-002 \
//!   --final-score m-001=2:1
//! ```
//!
//! # Exit Codes
//!
//! - 0: Batch completed without failures
//! - 1: Batch completed with per-match failures
//! - 2: Configuration error
//! - 3: Runtime error (database, I/O)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

use pitchbot_backend::activation::tiers::ActivationEnv;
use pitchbot_backend::engine::canonical::canonical_string;
use pitchbot_backend::engine::policy::load_active_policy;
use pitchbot_backend::engine::stability::StabilityStore;
use pitchbot_backend::evaluation::attach_result::FinalScore;
use pitchbot_backend::ingestion::live_io::LiveIoContext;
use pitchbot_backend::ingestion::registry::ConnectorRegistry;
use pitchbot_backend::pipeline::shadow::PipelineContext;
use pitchbot_backend::runner::shadow_batch::{run_shadow_batch, BatchRunConfig};
use pitchbot_backend::storage::SqliteRepository;

#[derive(Debug, Parser)]
#[command(name = "shadow_batch", about = "Run the shadow pipeline over a batch of matches")]
struct Args {
    /// Connector name (real_provider, stub_live_platform, multi_source).
    #[arg(long, default_value = "real_provider")]
    connector: String,

    /// Comma-separated match ids; defaults to the connector's listing.
    #[arg(long)]
    matches: Option<String>,

    /// Known final scores, repeatable: --final-score MATCH_ID=HOME:AWAY
    #[arg(long = "final-score")]
    final_scores: Vec<String>,

    /// SQLite database path.
    #[arg(long, default_value = "data/pitchbot.sqlite")]
    db: PathBuf,

    /// Root directory of recorded connector fixtures.
    #[arg(long, default_value = "fixtures")]
    fixtures_dir: PathBuf,

    /// Reports directory (index lives at <reports-dir>/index.json).
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Active policy JSON file; bootstrap default when absent.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Request activation (still subject to every gate).
    #[arg(long)]
    activation: bool,

    /// Compute everything, persist nothing.
    #[arg(long)]
    dry_run: bool,

    /// Write the batch report JSON to this path as well as stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_final_scores(raw: &[String]) -> Result<BTreeMap<String, FinalScore>> {
    let mut out = BTreeMap::new();
    for entry in raw {
        let (match_id, score) = entry
            .split_once('=')
            .with_context(|| format!("--final-score must be MATCH_ID=HOME:AWAY, got {entry:?}"))?;
        let (home, away) = score
            .split_once(':')
            .with_context(|| format!("score must be HOME:AWAY, got {score:?}"))?;
        out.insert(
            match_id.trim().to_string(),
            FinalScore {
                home: home.trim().parse().context("home score must be an integer")?,
                away: away.trim().parse().context("away score must be an integer")?,
            },
        );
    }
    Ok(out)
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Some(parent) = args.db.parent() {
        std::fs::create_dir_all(parent).context("creating database directory")?;
    }
    let repo = Arc::new(SqliteRepository::new(&args.db).context("opening repository")?);
    let live_io = LiveIoContext::from_env();
    let connectors = Arc::new(ConnectorRegistry::new(&args.fixtures_dir, live_io));

    let ctx = Arc::new(PipelineContext {
        repo,
        connectors,
        stability: Arc::new(StabilityStore::new()),
        policy: load_active_policy(args.policy.as_deref()),
        activation_env: ActivationEnv::from_env(),
        index_path: args.reports_dir.join("index.json"),
    });

    let mut config = BatchRunConfig::new(&args.connector, Utc::now());
    config.match_ids = args.matches.as_deref().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    });
    config.final_scores = parse_final_scores(&args.final_scores)?;
    config.activation = args.activation;
    config.dry_run = args.dry_run;

    let report = run_shadow_batch(ctx, config).await;
    let rendered = canonical_string(&report);
    println!("{rendered}");
    if let Some(output) = &args.output {
        std::fs::write(output, &rendered).context("writing report output")?;
    }

    if let Some(error) = &report.error {
        info!(error = %error, "batch ended with a configuration error");
        return Ok(ExitCode::from(2));
    }
    if report.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        info!(failures = report.failures.len(), "batch completed with failures");
        Ok(ExitCode::from(1))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("shadow_batch failed: {e:#}");
            ExitCode::from(3)
        }
    }
}
