//! ALSA PCM device wrappers for audio capture and playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{bail, Context, Result};

use super::pcm::FRAME_SAMPLES;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// Open a mono float stream for capture. The rate is a hard requirement:
/// capture frames carry a fixed 16 kHz tag and are never resampled.
pub fn open_capture(device: &str, sample_rate: u32) -> Result<(PCM, DeviceParams)> {
    let (pcm, params) = open_pcm(
        device,
        Direction::Capture,
        Format::FloatLE,
        sample_rate,
        Some(FRAME_SAMPLES),
        "Capture",
    )?;
    if params.sample_rate != sample_rate {
        bail!(
            "capture device '{}' negotiated {} Hz instead of {} Hz",
            device,
            params.sample_rate,
            sample_rate
        );
    }
    Ok((pcm, params))
}

/// Open a mono 16-bit stream for playback, again at an exact rate.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    period_size: Option<usize>,
) -> Result<(PCM, DeviceParams)> {
    let (pcm, params) = open_pcm(
        device,
        Direction::Playback,
        Format::S16LE,
        sample_rate,
        period_size,
        "Playback",
    )?;
    if params.sample_rate != sample_rate {
        bail!(
            "playback device '{}' negotiated {} Hz instead of {} Hz",
            device,
            params.sample_rate,
            sample_rate
        );
    }
    Ok((pcm, params))
}

fn open_pcm(
    device: &str,
    direction: Direction,
    format: Format,
    sample_rate: u32,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, DeviceParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(format)?;
        hwp.set_channels(1)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        if let Some(ps) = period_size {
            hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
        }
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = DeviceParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size,
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok((pcm, params))
}
