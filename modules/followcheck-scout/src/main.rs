use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use followcheck_common::{load_config, Config, FileConfig};
use followcheck_scout::infra::BrowserlessSession;
use followcheck_scout::report::ReportWriter;
use followcheck_scout::workflows::{AuditRun, EngagementAudit, FollowerAudit};

#[derive(Parser)]
#[command(
    name = "followcheck",
    about = "Sample a profile's followers or posts and test their counts against Benford's law"
)]
struct Cli {
    /// Path to a TOML tunables file (overrides FOLLOWCHECK_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ids to sample
    #[arg(long)]
    target: Option<usize>,

    /// Upper bound on scroll/extract cycles
    #[arg(long)]
    max_cycles: Option<u32>,

    /// Consecutive no-progress cycles before the list counts as exhausted
    #[arg(long)]
    stagnation_limit: Option<u32>,

    /// Directory for the CSV and JSON report
    #[arg(long, default_value = "./reports")]
    out_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit the follower counts of a profile's followers
    Followers { profile: String },
    /// Audit likes and comments across a profile's posts
    Engagement { profile: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("followcheck=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("followcheck starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let mut tunables = match cli.config.as_ref().or(config.config_path.as_ref()) {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FileConfig::default(),
    };
    if let Some(target) = cli.target {
        tunables.harvest.target_sample_size = target;
    }
    if let Some(max_cycles) = cli.max_cycles {
        tunables.harvest.max_cycles = max_cycles;
    }
    if let Some(limit) = cli.stagnation_limit {
        tunables.harvest.stagnation_limit = limit;
    }
    tunables.validate()?;

    let session = BrowserlessSession::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
        config.session_cookie.as_deref(),
        tunables.harvest.container_selectors.clone(),
        tunables.harvest.scroll_pause(),
    )
    .context("Failed to set up browser session")?;

    let run: AuditRun = match &cli.command {
        Command::Followers { profile } => FollowerAudit::new(&session, &tunables).run(profile).await,
        Command::Engagement { profile } => {
            EngagementAudit::new(&session, &tunables).run(profile).await
        }
    };

    println!("{}", run.stats);
    let summary = &run.report.summary;
    println!(
        "Verdict: {} (score {}/{})",
        summary.verdict, summary.score, summary.max_score
    );
    for reason in &summary.reasons {
        println!("  - {reason}");
    }

    let paths = ReportWriter::new(&cli.out_dir).write(&run.report)?;
    for path in &paths {
        info!(path = %path.display(), "Wrote");
    }

    if let Some(reason) = &summary.aborted {
        bail!("Run aborted, partial report written: {reason}");
    }
    Ok(())
}
