//! Hardware audio backend seam.

use anyhow::Result;

/// Shape of the duplex stream, fixed when the pipeline starts.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub capture_device: String,
    pub playback_device: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// Samples per channel per tick.
    pub frame_size: usize,
}

impl StreamParams {
    /// Interleaved samples per tick.
    pub fn tick_samples(&self) -> usize {
        self.frame_size * self.channels as usize
    }
}

/// Opens duplex streams. Failure to open is fatal to the pipeline.
pub trait AudioBackend: Send + Sync {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn DuplexStream>>;
}

/// An open capture+playback stream. `read` blocks for at most one period
/// and paces the pipeline; dropping the stream closes the device. Streams
/// are opened and dropped on the audio thread.
pub trait DuplexStream {
    /// Fill `buf` with interleaved normalized samples. Returns the number of
    /// samples per channel captured; `Ok(0)` means nothing this period.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize>;

    /// Play interleaved normalized samples.
    fn write(&mut self, buf: &[f32]) -> Result<()>;
}
