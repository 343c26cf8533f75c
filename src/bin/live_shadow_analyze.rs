//! Live-shadow analyze CLI.
//!
//! Runs the full analyzer on both a live and a recorded side per match and
//! compares picks, confidences, reasons, and coverage. Persistence is
//! hard-blocked regardless of capability flags.
//!
//! # Exit Codes
//!
//! - 0: Comparison completed with no alerts
//! - 1: Comparison completed with alerts
//! - 2: Configuration error
//! - 3: Runtime error

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
use pitchbot_backend::reports::analyze_guardrails::AnalyzeGuardrailPolicy;
use pitchbot_backend::runner::live_shadow_analyze_runner::{
    run_live_shadow_analyze, AnalyzeRunConfig,
};
use pitchbot_backend::storage::SqliteRepository;

#[derive(Debug, Parser)]
#[command(
    name = "live_shadow_analyze",
    about = "Compare live vs recorded analyzer output in shadow mode"
)]
struct Args {
    /// Live connector name.
    #[arg(long, default_value = "stub_live_platform")]
    connector: String,

    /// Recorded baseline connector name.
    #[arg(long, default_value = "real_provider")]
    recorded_connector: String,

    /// Comma-separated match ids; defaults to the live connector's listing.
    #[arg(long)]
    matches: Option<String>,

    /// Known final scores, repeatable: --final-score MATCH_ID=HOME:AWAY
    #[arg(long = "final-score")]
    final_scores: Vec<String>,

    /// SQLite database path (read-only use; nothing is persisted).
    #[arg(long, default_value = "data/pitchbot.sqlite")]
    db: PathBuf,

    /// Root directory of recorded connector fixtures.
    #[arg(long, default_value = "fixtures")]
    fixtures_dir: PathBuf,

    /// Reports directory.
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Active policy JSON file; bootstrap default when absent.
    #[arg(long)]
    policy: Option<PathBuf>,
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
    let index_path = args.reports_dir.join("index.json");

    let ctx = Arc::new(PipelineContext {
        repo,
        connectors,
        stability: Arc::new(StabilityStore::new()),
        policy: load_active_policy(args.policy.as_deref()),
        activation_env: ActivationEnv::from_env(),
        index_path: index_path.clone(),
    });

    let config = AnalyzeRunConfig {
        live_connector: args.connector.clone(),
        recorded_connector: args.recorded_connector.clone(),
        match_ids: args.matches.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
        final_scores: parse_final_scores(&args.final_scores)?,
        policy: AnalyzeGuardrailPolicy::default(),
        now_utc: Utc::now(),
    };

    let report = run_live_shadow_analyze(ctx, config, &args.reports_dir, &index_path).await;
    println!("{}", canonical_string(&report));

    if report.error.is_some() {
        return Ok(ExitCode::from(2));
    }
    if report.alerts.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        info!(alerts = report.alerts.len(), "analyze run completed with alerts");
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
            eprintln!("live_shadow_analyze failed: {e:#}");
            ExitCode::from(3)
        }
    }
}
