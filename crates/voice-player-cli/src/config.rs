//! Configuration loading and parsing.
//!
//! The TOML file mirrors the library's config structs; every key is optional.
//!
//! ```toml
//! device = "USB"
//! sample_rate = 48000
//!
//! [engine]
//! target_buffer_secs = 0.4
//! crossfade_secs = 0.010
//!
//! [engine.loudness]
//! smoothing = 0.5
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use voice_player::EngineConfig;

use crate::cli::PlayArgs;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device substring.
    pub device: Option<String>,
    /// Preferred output sample rate.
    pub sample_rate: Option<u32>,
    pub engine: EngineConfig,
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlayerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `--config` when given, then apply the command-line overrides.
    pub fn resolve(args: &PlayArgs) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(args);
        Ok(cfg)
    }

    fn apply_overrides(&mut self, args: &PlayArgs) {
        if let Some(device) = &args.device {
            self.device = Some(device.clone());
        }
        if let Some(rate) = args.sample_rate {
            self.sample_rate = Some(rate);
        }
        if let Some(secs) = args.target_buffer {
            self.engine.target_buffer_secs = secs;
        }
        if let Some(ms) = args.crossfade_ms {
            self.engine.crossfade_secs = ms / 1_000.0;
        }
        if args.prime {
            self.engine.prime_on_unlock = true;
        }
        if args.no_leveling {
            self.engine.loudness.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Args, Command};

    fn play_args(extra: &[&str]) -> PlayArgs {
        let mut argv = vec!["voice-play", "play", "speech.wav"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().cmd {
            Command::Play(play) => play,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: PlayerConfig = toml::from_str(
            r#"
            device = "usb"

            [engine]
            target_buffer_secs = 0.45

            [engine.loudness]
            smoothing = 0.5

            [engine.output.compressor]
            ratio = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.as_deref(), Some("usb"));
        assert_eq!(cfg.sample_rate, None);
        assert_eq!(cfg.engine.target_buffer_secs, 0.45);
        assert_eq!(cfg.engine.crossfade_secs, 0.008);
        assert_eq!(cfg.engine.loudness.smoothing, 0.5);
        assert_eq!(cfg.engine.loudness.target_rms, 0.125);
        assert_eq!(cfg.engine.output.compressor.ratio, 4.0);
        assert_eq!(cfg.engine.output.compressor.threshold_db, -24.0);
    }

    #[test]
    fn flags_override_defaults() {
        let mut cfg = PlayerConfig::default();
        cfg.apply_overrides(&play_args(&[
            "--device",
            "dac",
            "--crossfade-ms",
            "12",
            "--target-buffer",
            "0.5",
            "--prime",
            "--no-leveling",
        ]));
        assert_eq!(cfg.device.as_deref(), Some("dac"));
        assert!((cfg.engine.crossfade_secs - 0.012).abs() < 1e-12);
        assert_eq!(cfg.engine.target_buffer_secs, 0.5);
        assert!(cfg.engine.prime_on_unlock);
        assert!(!cfg.engine.loudness.enabled);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PlayerConfig::load(Path::new("/nonexistent/voice.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }
}
