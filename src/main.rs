use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use windowgate::config::{LogFormat, WindowgateConfig};
use windowgate::ratelimit::{MonotonicClock, RateLimiter, RatePolicy};

/// Reads one subject per line from stdin and prints a JSON rate limit
/// decision for each.
#[derive(Debug, Parser)]
#[command(name = "windowgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named policy to enforce instead of the default one
    #[arg(short, long)]
    policy: Option<String>,

    /// Log output format, overrides the configuration file
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output<'a> {
    Decision {
        subject: &'a str,
        allowed: bool,
        limit: u32,
        remaining: u32,
        reset_after_ms: u64,
    },
    Rejected {
        subject: &'a str,
        error: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = WindowgateConfig::load(args.config.as_deref())?;
    init_tracing(
        args.log_format.unwrap_or(config.logging.format),
        &config.logging.level,
    );

    info!("Starting windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = Arc::new(RateLimiter::from_config(
        &config.limiter,
        Arc::new(MonotonicClock::new()),
    )?);

    let policy = match &args.policy {
        Some(name) => config.policy_rules().get(name)?,
        None => limiter.default_policy(),
    };
    info!(
        policy = args.policy.as_deref().unwrap_or("default"),
        max_calls = policy.max_calls(),
        window_ms = policy.window_ms(),
        max_tracked_subjects = config.limiter.max_tracked_subjects,
        "Rate limiter initialized"
    );

    let cleanup = limiter.start_cleanup(config.limiter.cleanup_interval())?;

    tokio::select! {
        result = serve_stdin(&limiter, policy) => {
            result?;
            info!("Input closed, shutting down");
        }
        _ = shutdown_signal() => {}
    }

    cleanup.stop().await;
    info!(
        tracked_subjects = limiter.tracked_subjects(),
        "Windowgate stopped"
    );
    Ok(())
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Pretty => builder.with_thread_ids(true).init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Answer one decision per input line until stdin closes.
///
/// Stdin is read on a plain thread so a pending read never holds up runtime
/// shutdown.
async fn serve_stdin(limiter: &RateLimiter, policy: RatePolicy) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<std::io::Result<String>>(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = tokio::io::stdout();

    while let Some(line) = rx.recv().await {
        let line = line?;
        let subject = line.trim();
        if subject.is_empty() {
            continue;
        }

        let output = match limiter.check_detailed(subject, policy) {
            Ok(decision) => Output::Decision {
                subject,
                allowed: decision.allowed,
                limit: decision.limit,
                remaining: decision.remaining,
                reset_after_ms: decision.reset_after.as_millis() as u64,
            },
            Err(e) => Output::Rejected {
                subject,
                error: e.to_string(),
            },
        };

        let mut rendered = serde_json::to_string(&output)?;
        rendered.push('\n');
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
