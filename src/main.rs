use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdp_probe::{probe, ProbeConfig};

/// Launches a headless browser, loads one page and reports its title.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the browser executable (overrides detection).
    #[arg(long, value_name = "PATH")]
    chrome: Option<PathBuf>,

    /// Writable scratch root the browser's profile, cache and data paths
    /// are redirected into.
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Upstream time budget in milliseconds. Without it the built-in
    /// platform margin alone bounds the run.
    #[arg(long, value_name = "MS")]
    budget_ms: Option<u64>,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let mut cfg = ProbeConfig::default();
    if let Some(chrome) = cli.chrome {
        cfg.executable = chrome;
    }
    if let Some(scratch) = cli.scratch_dir {
        cfg.scratch_dir = scratch;
    }

    let upstream_deadline = cli
        .budget_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));

    match probe::run(&cfg, upstream_deadline).await {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "probe failed");
            eprintln!("probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from([
            "titleprobe",
            "--chrome",
            "/opt/chromium",
            "--budget-ms",
            "45000",
        ]);
        assert_eq!(cli.chrome, Some(PathBuf::from("/opt/chromium")));
        assert_eq!(cli.budget_ms, Some(45000));
        assert!(cli.scratch_dir.is_none());
    }
}
