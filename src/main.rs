use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use ow_status::config::Config;
use ow_status::monitor::Monitor;
use ow_status::probe::LiveNetwork;
use ow_status::publish::webhook::DiscordWebhook;

/// Overwatch backend status monitor publishing to a Discord webhook.
#[derive(Parser)]
#[command(name = "ow-status", about)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the state directory.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Render and print the payload without publishing it.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string.
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("ow-status {}", version::full());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    let mut cfg = Config::load(cli.config.as_deref(), |key| std::env::var(key).ok())
        .context("loading configuration")?;
    if let Some(dir) = cli.state_dir {
        cfg.state_dir = dir;
    }

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        state_dir = %cfg.state_dir.display(),
        dry_run = cli.dry_run,
        "starting ow-status run",
    );

    // Network checks run concurrently, so a multi-threaded runtime is used
    // even though the run itself is a single pass.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg, cli.dry_run))
}

async fn run(cfg: Config, dry_run: bool) -> Result<()> {
    let channel = if dry_run {
        None
    } else {
        Some(DiscordWebhook::new(&cfg.webhook.url, cfg.timeouts.webhook)?)
    };

    let net = LiveNetwork::new()?;
    let monitor = Monitor::new(cfg, net)?;
    let outcome = monitor.run(channel, chrono::Utc::now()).await?;

    match outcome.publish {
        Some(publish) => {
            tracing::info!(overall = %outcome.report.overall, publish = %publish, "run complete");
        }
        None => {
            let payload: serde_json::Value = serde_json::from_slice(&outcome.payload)
                .context("decoding rendered payload")?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}
