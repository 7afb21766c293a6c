use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voice-play", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices
    Devices {
        /// Print as JSON instead of one line per device
        #[arg(long)]
        json: bool,
    },

    /// Play a local file as if it were streamed in chunks by a speech synthesizer
    Play(PlayArgs),
}

#[derive(ClapArgs, Debug)]
pub struct PlayArgs {
    /// Path to an audio file (WAV, FLAC, MP3, ...)
    pub path: PathBuf,

    /// TOML file with engine settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Preferred output sample rate
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Lookahead kept ahead of the device clock, in seconds (clamped to 0.2..=0.6)
    #[arg(long)]
    pub target_buffer: Option<f64>,

    /// Crossfade between consecutive chunks, in milliseconds
    #[arg(long)]
    pub crossfade_ms: Option<f64>,

    /// Play a zero-length buffer on the first unlock
    #[arg(long)]
    pub prime: bool,

    /// Disable loudness leveling
    #[arg(long)]
    pub no_leveling: bool,

    /// Shortest chunk cut from the file, in milliseconds
    #[arg(long, default_value_t = 120)]
    pub min_chunk_ms: u32,

    /// Longest chunk cut from the file, in milliseconds
    #[arg(long, default_value_t = 600)]
    pub max_chunk_ms: u32,

    /// Upper bound of the random delay between chunk arrivals, in milliseconds
    #[arg(long, default_value_t = 150)]
    pub jitter_ms: u64,

    /// Simulate a platform suspension this many seconds into playback
    #[arg(long)]
    pub suspend_after: Option<f64>,

    /// How long the simulated suspension lasts, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub suspend_for: f64,
}
