//! Mode and volume requests from the remote channel.
//!
//! Only writes the shared configuration and drives the gain backend; never
//! touches audio buffers.

use std::sync::Arc;

use bytes::Bytes;

use crate::gain::GainBackend;
use crate::mode::{Configuration, ModeController, ModeError};

pub struct ControlPlane {
    modes: Arc<ModeController>,
    gain: Arc<dyn GainBackend>,
}

impl ControlPlane {
    pub fn new(modes: Arc<ModeController>, gain: Arc<dyn GainBackend>) -> Self {
        Self { modes, gain }
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.modes.current()
    }

    /// Switch mode, then realize its volume and equalizer on the codec.
    pub async fn apply_mode(&self, name: &str) -> Result<Arc<Configuration>, ModeError> {
        let cfg = self.modes.set_mode(name)?;
        self.realize(&cfg).await;
        Ok(cfg)
    }

    /// Clamp to `[0, MAX_SAFE_VOLUME]` and set the output level. Mode is
    /// left alone.
    pub async fn apply_volume(&self, percent: i64) -> Arc<Configuration> {
        let cfg = self.modes.set_volume(percent);
        if let Err(e) = self.gain.set_output_gain(cfg.volume).await {
            log::error!("Failed to set volume {}%: {:#}", cfg.volume, e);
        } else {
            log::info!("Volume set to {}%", cfg.volume);
        }
        cfg
    }

    /// Push volume and every band of `cfg` to the gain backend. Failures are
    /// logged once per call; the configuration stays committed.
    pub async fn realize(&self, cfg: &Configuration) {
        let mut failed = Vec::new();
        if let Err(e) = self.gain.set_output_gain(cfg.volume).await {
            failed.push(format!("volume: {:#}", e));
        }
        for (band, &db) in cfg.eq_profile.iter().enumerate() {
            if let Err(e) = self.gain.set_band_gain(band, db).await {
                failed.push(format!("EQ{}: {:#}", band + 1, e));
            }
        }
        if !failed.is_empty() {
            log::error!(
                "Mode {} partially applied on mixer ({} failures): {}",
                cfg.mode,
                failed.len(),
                failed.join("; ")
            );
        }
    }

    /// Decode a volume write: ASCII decimal text, or a single raw byte.
    pub fn parse_volume(payload: &[u8]) -> Option<i64> {
        if let Ok(text) = std::str::from_utf8(payload) {
            if let Ok(v) = text.trim().parse::<i64>() {
                return Some(v);
            }
        }
        match payload {
            [byte] => Some(*byte as i64),
            _ => None,
        }
    }

    pub fn volume_payload(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.current().volume])
    }

    pub fn mode_payload(&self) -> Bytes {
        Bytes::from_static(self.current().mode.name().as_bytes())
    }
}
