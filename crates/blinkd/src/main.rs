use anyhow::Result;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod events;
mod pipeline;
mod video;

use config::Config;
use events::Emitter;
use pipeline::SessionOutcome;

#[derive(Parser)]
#[command(
    name = "blinkd",
    about = "Eye-blink counting pipeline — streams delimited JSON events on stdout"
)]
struct Cli {
    /// Stream downsampled video frames as base64-encoded JPEG events
    #[arg(long)]
    stream_video: bool,
}

fn main() -> Result<()> {
    // stdout carries the event protocol; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(err) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %err, "failed to install interrupt handler");
        }
    }

    let mut emitter = Emitter::new(std::io::stdout().lock());
    let outcome = pipeline::run_session(&config, cli.stream_video, &shutdown, &mut emitter)?;

    if outcome == SessionOutcome::AcquisitionFailed {
        std::process::exit(1);
    }
    Ok(())
}
