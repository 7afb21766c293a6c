//! voice-play: play a local file through the gapless chunk scheduler.
//!
//! The file is decoded up front and cut into variable-length chunks, which a producer thread
//! then feeds to the engine with random arrival jitter. This reproduces what a streaming
//! speech synthesizer delivers and exercises buffering, crossfades, loudness leveling and
//! suspend/resume on a real output device.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,voice_player=info,voice_play=info")
        }))
        .init();

    match &args.cmd {
        cli::Command::Devices { json } => runtime::run_devices(*json),
        cli::Command::Play(play) => runtime::run_play(play),
    }
}
