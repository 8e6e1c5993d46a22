//! Frame-in/frame-out adapter around a suppression engine.
//!
//! Owns the per-channel engine states exclusively. States are created on
//! [`FrameTransform::activate`] and dropped on [`FrameTransform::deactivate`]
//! or when the transform itself is dropped. Both calls are idempotent.

use std::sync::Arc;

use anyhow::Result;

use super::frame::Frame;
use super::suppressor::{ChannelState, SuppressionEngine};

pub struct FrameTransform {
    engine: Option<Arc<dyn SuppressionEngine>>,
    engine_channels: usize,
    states: Option<Vec<Box<dyn ChannelState>>>,
    scratch_in: Vec<f32>,
    // one output buffer per engine channel, committed only when all succeed
    scratch_out: Vec<Vec<f32>>,
    activations: u64,
    faults: u64,
}

impl FrameTransform {
    /// `engine_channels` is the channel count the engine is driven with;
    /// mono input is duplicated up to it.
    pub fn new(engine: Option<Arc<dyn SuppressionEngine>>, engine_channels: usize) -> Self {
        let frame_len = engine.as_ref().map(|e| e.frame_len()).unwrap_or(0);
        let engine_channels = engine_channels.max(1);
        Self {
            engine,
            engine_channels,
            states: None,
            scratch_in: vec![0.0; frame_len],
            scratch_out: vec![vec![0.0; frame_len]; engine_channels],
            activations: 0,
            faults: 0,
        }
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.states.is_some()
    }

    /// Number of times engine states were (re)created.
    #[cfg(test)]
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Frames returned unprocessed because the engine failed on them.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Create engine states if not already live. Returns whether the
    /// transform is active afterwards.
    pub fn activate(&mut self) -> Result<bool> {
        if self.states.is_some() {
            return Ok(true);
        }
        let Some(engine) = &self.engine else {
            return Ok(false);
        };
        let states = (0..self.engine_channels)
            .map(|_| engine.create_state())
            .collect::<Result<Vec<_>>>()?;
        self.activations += 1;
        log::info!(
            "{} initialized with {} channels, frame size {} (activation {})",
            engine.name(),
            states.len(),
            engine.frame_len(),
            self.activations
        );
        self.states = Some(states);
        Ok(true)
    }

    /// Release engine states if live.
    pub fn deactivate(&mut self) {
        if let Some(states) = self.states.take() {
            log::info!("Releasing {} noise suppression states", states.len());
        }
    }

    /// Run one frame through the engine. Same shape out as in. Without live
    /// states, or on any engine failure, the input is returned unchanged and
    /// a failure is counted in [`FrameTransform::faults`].
    pub fn process(&mut self, mut frame: Frame) -> Frame {
        if self.states.is_none() || frame.is_empty() {
            return frame;
        }
        if self.try_process(&mut frame).is_err() {
            self.faults += 1;
        }
        frame
    }

    fn try_process(&mut self, frame: &mut Frame) -> Result<()> {
        let Some(states) = self.states.as_mut() else {
            return Ok(());
        };
        let in_channels = frame.channels();

        // Mono input feeds every engine channel; extra outputs are discarded.
        // Input channels beyond the engine's count pass through.
        for (engine_ch, state) in states.iter_mut().enumerate() {
            let src_ch = engine_ch.min(in_channels - 1);

            // pad with zeros or truncate to the engine's frame length
            self.scratch_in.fill(0.0);
            frame.read_channel_scaled(src_ch, &mut self.scratch_in);
            let out = &mut self.scratch_out[engine_ch];
            out.fill(0.0);

            state.process(out, &self.scratch_in)?;

            if out.iter().any(|s| !s.is_finite()) {
                anyhow::bail!("engine produced non-finite samples on channel {}", engine_ch);
            }
        }
        for (ch, out) in self.scratch_out.iter().enumerate().take(in_channels) {
            frame.write_channel_scaled(ch, out);
        }
        Ok(())
    }
}

impl Drop for FrameTransform {
    fn drop(&mut self) {
        self.deactivate();
    }
}
