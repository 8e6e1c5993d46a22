//! Volume and equalizer control on the codec.
//!
//! Calls are fire-and-forget from the caller's point of view: failures are
//! returned for logging but never undo the configuration.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{Duration, timeout};

#[async_trait]
pub trait GainBackend: Send + Sync {
    /// Output level in percent, already clamped by the caller.
    async fn set_output_gain(&self, percent: u8) -> anyhow::Result<()>;

    /// `band_index` is zero-based, bass first.
    async fn set_band_gain(&self, band_index: usize, db: i8) -> anyhow::Result<()>;
}

/// Drives the WM8960 mixer controls through `amixer`.
pub struct AmixerBackend {
    card: String,
    command_timeout: Duration,
}

impl AmixerBackend {
    pub fn new(card: &str) -> Self {
        Self {
            card: card.to_string(),
            command_timeout: Duration::from_secs(2),
        }
    }

    async fn sset(&self, control: &str, value: &str) -> anyhow::Result<()> {
        let mut cmd = Command::new("amixer");
        cmd.args(["-c", self.card.as_str(), "sset", control, value])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("amixer {} timed out", control))?
            .map_err(|e| anyhow::anyhow!("Failed to spawn amixer: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let err_str = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("amixer sset {} {} failed: {}", control, value, err_str.trim())
        }
    }

    /// Conservative startup levels for hyperacusis users, plus routing the
    /// microphones and DAC on. Each failure is logged and skipped.
    pub async fn init_safe_config(&self) {
        log::info!("Applying safe mixer defaults on card {}", self.card);
        let steps = [
            ("Headphone", "60%"),
            ("Speaker", "60%"),
            ("Capture", "70%"),
            ("Left Output Mixer PCM", "on"),
            ("Right Output Mixer PCM", "on"),
            ("Left Input Mixer Boost", "on"),
            ("Right Input Mixer Boost", "on"),
            ("Mic Bias", "on"),
        ];
        for (control, value) in steps {
            if let Err(e) = self.sset(control, value).await {
                log::error!("Mixer init: {}", e);
            }
        }
    }
}

/// `+6`, `0`, `-3` as amixer expects for the EQ controls.
pub fn format_band_db(db: i8) -> String {
    if db > 0 {
        format!("+{}", db)
    } else {
        db.to_string()
    }
}

#[async_trait]
impl GainBackend for AmixerBackend {
    async fn set_output_gain(&self, percent: u8) -> anyhow::Result<()> {
        let value = format!("{}%", percent);
        let headphone = self.sset("Headphone", &value).await;
        let speaker = self.sset("Speaker", &value).await;
        headphone.and(speaker)
    }

    async fn set_band_gain(&self, band_index: usize, db: i8) -> anyhow::Result<()> {
        let control = format!("EQ{}", band_index + 1);
        self.sset(&control, &format_band_db(db)).await
    }
}
