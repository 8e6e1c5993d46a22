//! Operating modes and the live configuration record.
//!
//! The live [`Configuration`] is an immutable snapshot behind an `ArcSwap`.
//! The control path replaces it as a whole; the audio thread only ever
//! `load()`s it, which never blocks and never observes a half-written record.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

/// Global safety ceiling for output volume, in percent.
pub const MAX_SAFE_VOLUME: u8 = 85;

/// Number of equalizer bands on the codec (EQ1..EQ5).
pub const EQ_BANDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Normal,
    School,
    Transport,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("empty mode request")]
    Empty,
    #[error("unknown mode: {0}")]
    Unknown(String),
}

/// Equalizer, suppression and volume settings a mode maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    /// Gain per band in dB, bass first.
    pub eq_gains: [i8; EQ_BANDS],
    pub suppression: bool,
    /// Recommended volume, applied on entering the mode.
    pub volume_ceiling: u8,
}

// 平坦，轻微衰减高音
const NORMAL_PROFILE: ModeProfile = ModeProfile {
    eq_gains: [0, 0, 0, 0, -3],
    suppression: false,
    volume_ceiling: 65,
};

// 人声频段提升，低音/高音衰减
const SCHOOL_PROFILE: ModeProfile = ModeProfile {
    eq_gains: [-6, 3, 6, 3, -6],
    suppression: true,
    volume_ceiling: 60,
};

// 去除引擎低频噪声，保留广播人声
const TRANSPORT_PROFILE: ModeProfile = ModeProfile {
    eq_gains: [-12, -6, 4, 0, -9],
    suppression: true,
    volume_ceiling: 55,
};

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Normal, Mode::School, Mode::Transport];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::School => "SCHOOL",
            Mode::Transport => "TRANSPORT",
        }
    }

    pub fn profile(&self) -> &'static ModeProfile {
        match self {
            Mode::Normal => &NORMAL_PROFILE,
            Mode::School => &SCHOOL_PROFILE,
            Mode::Transport => &TRANSPORT_PROFILE,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    /// Case-insensitive; the app writes `MODE_SCHOOL` style names, so the
    /// `MODE_` prefix is accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ModeError::Empty);
        }
        let upper = trimmed.to_ascii_uppercase();
        let bare = upper.strip_prefix("MODE_").unwrap_or(&upper);
        Mode::ALL
            .into_iter()
            .find(|m| m.name() == bare)
            .ok_or_else(|| ModeError::Unknown(trimmed.to_string()))
    }
}

/// Clamp any requested volume into `[0, MAX_SAFE_VOLUME]`.
pub fn clamp_volume(percent: i64) -> u8 {
    percent.clamp(0, MAX_SAFE_VOLUME as i64) as u8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub mode: Mode,
    pub volume: u8,
    pub suppression_enabled: bool,
    pub eq_profile: [i8; EQ_BANDS],
}

impl Configuration {
    fn for_mode(mode: Mode) -> Self {
        let profile = mode.profile();
        Self {
            mode,
            volume: profile.volume_ceiling.min(MAX_SAFE_VOLUME),
            suppression_enabled: profile.suppression,
            eq_profile: profile.eq_gains,
        }
    }
}

impl Default for Configuration {
    /// Safe startup state: NORMAL, moderate volume, suppression off.
    fn default() -> Self {
        Self::for_mode(Mode::Normal)
    }
}

/// Read-only view of the live configuration, cheap to clone into any
/// execution context.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<Configuration>>,
}

impl ConfigHandle {
    #[cfg(test)]
    pub fn load(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Lock-free read of the suppression flag for the real-time path.
    pub fn suppression_enabled(&self) -> bool {
        self.current.load().suppression_enabled
    }
}

/// Owner of the authoritative configuration. Writers are serialized by
/// `write_lock`; readers go through [`ConfigHandle`].
pub struct ModeController {
    current: Arc<ArcSwap<Configuration>>,
    write_lock: Mutex<()>,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Configuration::default())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> ConfigHandle {
        ConfigHandle {
            current: self.current.clone(),
        }
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Switch mode. Unrecognized input leaves the configuration untouched.
    pub fn set_mode(&self, requested: &str) -> Result<Arc<Configuration>, ModeError> {
        let mode = match requested.parse::<Mode>() {
            Ok(mode) => mode,
            Err(e) => {
                log::warn!("Ignoring mode request {:?}: {}", requested, e);
                return Err(e);
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let previous = self.current.load();
        let next = Arc::new(Configuration::for_mode(mode));
        if previous.suppression_enabled != next.suppression_enabled {
            log::info!(
                "Noise suppression {} ({} -> {})",
                if next.suppression_enabled { "enabled" } else { "disabled" },
                previous.mode,
                mode
            );
        }
        self.current.store(next.clone());
        log::info!(
            "Mode {} active: eq={:?}, volume={}%",
            mode,
            next.eq_profile,
            next.volume
        );
        Ok(next)
    }

    /// Set the output volume, clamped to `[0, MAX_SAFE_VOLUME]`. Mode and
    /// equalizer are left as they are.
    pub fn set_volume(&self, percent: i64) -> Arc<Configuration> {
        let volume = clamp_volume(percent);
        if volume as i64 != percent {
            log::warn!("Volume {}% out of range, clamped to {}%", percent, volume);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.current.load();
        if current.volume == volume {
            return self.current.load_full();
        }
        let next = Arc::new(Configuration {
            volume,
            ..(**current).clone()
        });
        self.current.store(next.clone());
        next
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}
