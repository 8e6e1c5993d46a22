//! ALSA PCM duplex stream for the pipeline.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::backend::{AudioBackend, DuplexStream, StreamParams};
use super::frame::{f32_to_i16, i16_to_f32};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(channels)?;
        hwp.set_rate(sample_rate, ValueOr::Nearest)
            .with_context(|| format!("{} does not support {}Hz", device, sample_rate))?;
        hwp.set_period_size_near(period_size as alsa::pcm::Frames, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = AlsaParams {
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

/// Opens ALSA capture and playback on the configured devices.
pub struct AlsaBackend;

impl AudioBackend for AlsaBackend {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn DuplexStream>> {
        let (capture, cap) = open_pcm(
            &params.capture_device,
            Direction::Capture,
            params.sample_rate,
            params.channels,
            params.frame_size,
            "Capture",
        )?;
        let (playback, play) = open_pcm(
            &params.playback_device,
            Direction::Playback,
            params.sample_rate,
            params.channels,
            params.frame_size,
            "Playback",
        )?;

        // No sample-rate conversion or remixing: the hardware must match.
        if cap.sample_rate != params.sample_rate || cap.channels != params.channels {
            anyhow::bail!(
                "Capture negotiated {}Hz/{}ch, pipeline needs {}Hz/{}ch",
                cap.sample_rate,
                cap.channels,
                params.sample_rate,
                params.channels
            );
        }
        if cap.period_size != params.frame_size {
            log::warn!(
                "Capture period is {} frames, pipeline frame is {}",
                cap.period_size,
                params.frame_size
            );
        }
        if play.channels != params.channels {
            anyhow::bail!(
                "Playback negotiated {}ch, pipeline needs {}ch",
                play.channels,
                params.channels
            );
        }

        Ok(Box::new(AlsaDuplex {
            capture,
            playback,
            channels: params.channels as usize,
            read_buf: vec![0i16; params.tick_samples()],
            write_buf: Vec::with_capacity(params.tick_samples()),
        }))
    }
}

struct AlsaDuplex {
    capture: PCM,
    playback: PCM,
    channels: usize,
    read_buf: Vec<i16>,
    write_buf: Vec<i16>,
}

impl DuplexStream for AlsaDuplex {
    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let want = buf.len().min(self.read_buf.len());
        let io = self.capture.io_i16()?;
        match io.readi(&mut self.read_buf[..want]) {
            Ok(frames) => {
                let n = frames * self.channels;
                for (dst, &src) in buf.iter_mut().zip(&self.read_buf[..n]) {
                    *dst = i16_to_f32(src);
                }
                Ok(frames)
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                self.capture
                    .prepare()
                    .context("Failed to recover PCM capture")?;
                Ok(0)
            }
        }
    }

    fn write(&mut self, buf: &[f32]) -> Result<()> {
        self.write_buf.clear();
        self.write_buf.extend(buf.iter().map(|&s| f32_to_i16(s)));

        let io = self.playback.io_i16()?;
        // Retry short writes and XRUNs without losing samples.
        let total_frames = self.write_buf.len() / self.channels;
        let mut frames_written = 0;
        while frames_written < total_frames {
            let offset = frames_written * self.channels;
            match io.writei(&self.write_buf[offset..]) {
                Ok(n) => frames_written += n,
                Err(e) => {
                    log::warn!("ALSA playback error: {}, recovering...", e);
                    self.playback
                        .prepare()
                        .context("Failed to recover PCM playback")?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for AlsaDuplex {
    fn drop(&mut self) {
        let _ = self.playback.drain();
        log::info!("ALSA duplex stream closed");
    }
}
