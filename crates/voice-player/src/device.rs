//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config and a buffer size small enough for the scheduling lookahead

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

/// Upper bound on the callback buffer. The lookahead target is a few hundred milliseconds, so
/// the device must consume audio in much smaller steps than that.
const MAX_BUFFER_FRAMES: u32 = 1_024;

/// Pick the first output device whose name contains `needle` (case-insensitive), or the host
/// default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config for a preferred sample rate.
///
/// With `target_rate` set, the rate closest to it wins, preferring rates at or below the
/// target. Without one, the device default config is used. Ties go to the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let Some(target) = target_rate else {
        return device
            .default_output_config()
            .context("No default output config");
    };

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in device.supported_output_configs()? {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target);
        let candidate = Candidate {
            below: rate <= target,
            distance: rate.abs_diff(target),
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => candidate.is_better_than(current),
        };
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size no larger than [`MAX_BUFFER_FRAMES`].
///
/// Returns `None` when the device only supports the default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            clamp_buffer_frames(*min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Output device metadata for `voice-play devices`.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub default_rate: Option<u32>,
    pub default_channels: Option<u16>,
}

/// Enumerate output devices of `host`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());

    let devices = host.output_devices().context("No output devices")?;
    let mut out = Vec::new();
    for (index, d) in devices.enumerate() {
        let name = match d.description() {
            Ok(desc) => desc.name().to_string(),
            Err(err) => {
                tracing::debug!(index, error = %err, "skipping device without description");
                continue;
            }
        };
        let default_cfg = d.default_output_config().ok();
        out.push(DeviceInfo {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            default_rate: default_cfg.as_ref().map(|c| c.sample_rate()),
            default_channels: default_cfg.as_ref().map(|c| c.channels()),
            name,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    below: bool,
    distance: u32,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        if self.below != other.below {
            self.below
        } else if self.distance != other.distance {
            self.distance < other.distance
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn clamp_buffer_frames(min: u32, max: u32) -> u32 {
    MAX_BUFFER_FRAMES.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(below: bool, distance: u32, format_rank: u8) -> Candidate {
        Candidate {
            below,
            distance,
            format_rank,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn clamp_rate_prefers_target_when_in_range() {
        assert_eq!(clamp_rate(44_100, 96_000, 48_000), 48_000);
        assert_eq!(clamp_rate(44_100, 96_000, 22_050), 44_100);
        assert_eq!(clamp_rate(44_100, 96_000, 192_000), 96_000);
    }

    #[test]
    fn buffer_frames_stay_small() {
        assert_eq!(clamp_buffer_frames(64, 16_384), MAX_BUFFER_FRAMES);
        assert_eq!(clamp_buffer_frames(64, 512), 512);
        assert_eq!(clamp_buffer_frames(2_048, 8_192), 2_048);
    }

    #[test]
    fn candidate_prefers_below_target() {
        assert!(candidate(true, 100, 3).is_better_than(&candidate(false, 10, 0)));
    }

    #[test]
    fn candidate_prefers_closer_rate() {
        assert!(candidate(true, 0, 2).is_better_than(&candidate(true, 4_000, 2)));
    }

    #[test]
    fn candidate_prefers_lower_format_rank() {
        assert!(candidate(true, 0, 0).is_better_than(&candidate(true, 0, 2)));
        assert!(!candidate(true, 0, 2).is_better_than(&candidate(true, 0, 2)));
    }
}
