// src/main.rs
//! listing-watch binary entrypoint.
//! One invocation per process start (external timer), or an in-process loop.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use listing_watch::config::Settings;
use listing_watch::metrics::Metrics;
use listing_watch::scheduler::{run_every, ScheduleCfg};
use listing_watch::{run_invocation, JobContext, Trigger};
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Email new classifieds listings matching a fixed search")]
struct CliArgs {
    /// Read the real seen-set but never write it; log emails instead of sending.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one invocation and exit (default).
    Run {
        /// The scheduler fired later than planned (logged only).
        #[arg(long)]
        past_due: bool,
    },
    /// Keep running, one invocation every `--every` seconds.
    Loop {
        #[arg(long, default_value_t = 300)]
        every: u64,
    },
}

/// `LOG_FORMAT=json` switches to one JSON object per line; filter via `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the host injects the environment.
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = CliArgs::parse();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "configuration incomplete; nothing was done");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match JobContext::from_settings(&settings, args.dry_run) {
        Ok(c) => c,
        Err(e) => {
            error!(error = ?e, "could not build clients");
            return ExitCode::FAILURE;
        }
    };

    let command = args.command.unwrap_or(Command::Run { past_due: false });
    // only the long-running loop serves a scrape endpoint
    let listen = match command {
        Command::Loop { .. } => settings.metrics_addr,
        Command::Run { .. } => None,
    };
    let metrics = match Metrics::init(listen) {
        Ok(m) => m,
        Err(e) => {
            error!(error = ?e, "could not install metrics recorder");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Run { past_due } => {
            // aborted runs are reported through logs and the operator email
            if let Err(e) = run_invocation(&ctx, Trigger { past_due }).await {
                info!(error = %e, "invocation aborted");
            }
        }
        Command::Loop { every } => {
            let cfg = ScheduleCfg {
                every: Duration::from_secs(every.max(1)),
                max_runs: None,
            };
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let runs = run_every(&ctx, cfg, shutdown).await;
            info!(runs, "loop stopped");
        }
    }

    debug!(metrics = %metrics.render(), "final counters");
    ExitCode::SUCCESS
}
