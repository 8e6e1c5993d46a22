//! Interleaved audio frames and sample conversions.

use bytes::{BufMut, Bytes, BytesMut};

/// Scale between normalized `[-1.0, 1.0]` floats and the PCM16 range.
pub const PCM16_SCALE: f32 = 32768.0;

/// One block of interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<f32>,
    channels: usize,
}

impl Frame {
    /// `samples.len()` must be a multiple of `channels`; a trailing partial
    /// sample group is dropped.
    pub fn new(mut samples: Vec<f32>, channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self { samples, channels }
    }

    /// Replace the contents with `samples`, reusing the allocation. The
    /// channel count is kept; a trailing partial sample group is dropped.
    pub fn refill(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels;
        self.samples.clear();
        self.samples.extend_from_slice(&samples[..whole]);
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Copy channel `ch` into `out`, scaled to the PCM16 range. Returns the
    /// number of samples written.
    pub fn read_channel_scaled(&self, ch: usize, out: &mut [f32]) -> usize {
        let n = self.len().min(out.len());
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = self.samples[i * self.channels + ch] * PCM16_SCALE;
        }
        n
    }

    /// Inverse of [`Frame::read_channel_scaled`].
    pub fn write_channel_scaled(&mut self, ch: usize, input: &[f32]) {
        let n = self.len().min(input.len());
        for (i, value) in input.iter().take(n).enumerate() {
            self.samples[i * self.channels + ch] = value / PCM16_SCALE;
        }
    }

    /// Interleaved little-endian PCM16, the payload of the audio stream
    /// endpoint.
    pub fn to_pcm16_le(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            buf.put_i16_le(f32_to_i16(s));
        }
        buf.freeze()
    }
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
