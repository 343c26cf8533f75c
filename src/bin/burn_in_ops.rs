//! Burn-in ops runner CLI.
//!
//! Runs ingestion -> live-shadow compare -> live-shadow analyze and, when
//! explicitly requested AND approved, a burn-in activation batch. The
//! approval gate guards the activation path: a denial aborts with a distinct
//! exit code and is never swallowed.
//!
//! # Exit Codes
//!
//! - 0: Run completed
//! - 1: Run completed with alerts
//! - 2: Configuration error or activation not approved
//! - 3: Runtime error

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use pitchbot_backend::activation::approval::{
    require_activation_approval, ApprovalContext, ApprovalEnv,
};
use pitchbot_backend::activation::tiers::ActivationEnv;
use pitchbot_backend::engine::canonical::canonical_string;
use pitchbot_backend::engine::policy::load_active_policy;
use pitchbot_backend::engine::stability::StabilityStore;
use pitchbot_backend::evaluation::attach_result::FinalScore;
use pitchbot_backend::ingestion::live_io::LiveIoContext;
use pitchbot_backend::ingestion::registry::ConnectorRegistry;
use pitchbot_backend::pipeline::shadow::PipelineContext;
use pitchbot_backend::reports::index_store::load_index;
use pitchbot_backend::runner::burn_in_ops::{
    run_burn_in_ops, BurnInOpsConfig, DEFAULT_MAX_BUNDLES_RETAINED,
};
use pitchbot_backend::storage::SqliteRepository;

#[derive(Debug, Parser)]
#[command(name = "burn_in_ops", about = "Consolidated burn-in ops run")]
struct Args {
    /// Live connector name.
    #[arg(long, default_value = "real_provider")]
    connector: String,

    /// Recorded baseline connector name.
    #[arg(long, default_value = "real_provider")]
    recorded_connector: String,

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

    /// Reports directory.
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Active policy JSON file; bootstrap default when absent.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Enable the burn-in activation step (requires approval).
    #[arg(long)]
    enable_activation: bool,

    /// Approval token matched against ACTIVATION_APPROVAL_TOKEN.
    #[arg(long)]
    approval_token: Option<String>,

    /// Active policy version pin required for approval.
    #[arg(long)]
    policy_version_pin: Option<String>,

    /// Declare the audit trail enabled (approval prerequisite).
    #[arg(long)]
    audit_trail_enabled: bool,

    /// Compute everything, persist nothing.
    #[arg(long)]
    dry_run: bool,
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
    let policy = load_active_policy(args.policy.as_deref());
    let index_path = args.reports_dir.join("index.json");

    // Real activation requires the approval gate; the denial propagates.
    if args.enable_activation && !args.dry_run {
        let approval_env = ApprovalEnv::from_env();
        let context = ApprovalContext {
            approval_token: args.approval_token.clone(),
            policy_version_pin: args.policy_version_pin.clone(),
            audit_trail_enabled: args.audit_trail_enabled,
        };
        let index = load_index(&index_path);
        if let Err(denied) = require_activation_approval(&approval_env, &context, &policy, &index) {
            error!(code = denied.code(), detail = %denied.detail(), "activation not approved");
            eprintln!("{denied}");
            return Ok(ExitCode::from(2));
        }
        info!("activation approved by the approval gate");
    }

    let ctx = Arc::new(PipelineContext {
        repo,
        connectors,
        stability: Arc::new(StabilityStore::new()),
        policy,
        activation_env: ActivationEnv::from_env(),
        index_path: index_path.clone(),
    });

    let config = BurnInOpsConfig {
        connector_name: args.connector.clone(),
        recorded_connector_name: args.recorded_connector.clone(),
        match_ids: args.matches.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
        final_scores: parse_final_scores(&args.final_scores)?,
        enable_activation: args.enable_activation,
        dry_run: args.dry_run,
        now_utc: Utc::now(),
        max_bundles_retained: DEFAULT_MAX_BUNDLES_RETAINED,
    };

    let report = run_burn_in_ops(ctx, config, &args.reports_dir, &index_path).await;
    println!("{}", canonical_string(&report));

    if report.error.is_some() {
        return Ok(ExitCode::from(2));
    }
    if report.alerts_count > 0 {
        info!(alerts = report.alerts_count, "burn-in run completed with alerts");
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
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
            eprintln!("burn_in_ops failed: {e:#}");
            ExitCode::from(3)
        }
    }
}
