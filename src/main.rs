use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use robot_camera_streamer::{Config, Orchestrator, Shutdown, V4lDriver};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// TOML configuration file. Built-in defaults (port 3000, cameras 0 and 2) when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port the viewer connects to for the handshake. Overrides the config file.
    #[arg(long)]
    listen_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    log::info!("Starting application with args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.listen_port {
        config.handshake.listen_port = port;
    }
    config.validate()?;

    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("interrupted. Exiting...");
                interrupt.trigger();
            }
            Err(e) => log::error!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    let orchestrator = Orchestrator::new(config, V4lDriver);
    let reports = orchestrator.run(shutdown).await?;

    for report in &reports {
        log::info!(
            "{}: captured {}, sent {} ({} bytes)",
            report.label,
            report.stats.frames_captured,
            report.stats.frames_sent,
            report.stats.bytes_sent
        );
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.outcome.is_error())
        .map(|r| r.label.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("camera streamer(s) failed: {}", failed.join(", "));
    }

    log::info!("main thread exiting");
    Ok(())
}
