//! Ball and Hoop Tracker
//!
//! ```text
//! tracker calibrate [--host NAME] [--config PATH]
//! tracker run       [--host NAME] [--config PATH]
//! ```
//!
//! The host name selects this node's section of the configuration file and
//! defaults to the machine's host name.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ball_hoop_tracker::app::{machine_hostname, Application};
use ball_hoop_tracker::config::AppConfig;

const USAGE: &str = "usage: tracker <calibrate|run> [--host NAME] [--config PATH]";

enum Command {
    Calibrate,
    Run,
}

struct Args {
    command: Command,
    host: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let command = match args.next().as_deref() {
        Some("calibrate") => Command::Calibrate,
        Some("run") => Command::Run,
        _ => bail!(USAGE),
    };
    let mut host = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => host = Some(args.next().context(USAGE)?),
            "--config" => config = Some(PathBuf::from(args.next().context(USAGE)?)),
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(Args { command, host, config })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    let hostname = match args.host {
        Some(host) => {
            tracing::info!("Forcing host name '{}'", host);
            host
        }
        None => machine_hostname()?,
    };
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    tracing::info!("Starting tracker as '{}' with {}", hostname, config_path.display());

    let mut app = Application::load(&config_path, hostname)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match args.command {
        Command::Calibrate => {
            let frame = app.calibration_frame()?;
            let report = app.calibrate(&frame)?;
            println!(
                "Hoop @ {:?} with r={} ({} markers)",
                report.hoop.center(),
                report.hoop.radius(),
                report.hoop.center_dots().len()
            );
            match report.ball {
                Some(ball) => println!(
                    "Ball @ {:?} with r={}, angle {:.1}",
                    ball.center,
                    ball.radius,
                    ball.angle()
                ),
                None => println!("No ball found"),
            }
        }
        Command::Run => {
            let stop = Arc::new(AtomicBool::new(false));
            let signal_stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, shutting down");
                    signal_stop.store(true, Ordering::SeqCst);
                }
            });

            tracing::info!("Tracking - press Ctrl+C to stop");
            let stats = tokio::task::spawn_blocking(move || {
                let mut source = app.frame_source()?;
                app.run(&mut source, stop)
            })
            .await??;
            println!(
                "Frames: {} submitted, {} accepted, {} not found, {} out of order, {} faults",
                stats.submitted, stats.accepted, stats.not_found, stats.stale, stats.worker_faults
            );
        }
    }

    Ok(())
}
