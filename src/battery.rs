use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use bytes::Bytes;
use tokio::time::Duration;

use crate::notify_bridge::NotificationSink;
use crate::protocol::Endpoint;

/// Battery level from sysfs, notified to subscribers on every poll.
pub struct BatteryMonitor {
    capacity_path: String,
    level: AtomicU8,
    notifying: AtomicBool,
}

impl BatteryMonitor {
    pub fn new(capacity_path: &str) -> Self {
        Self {
            capacity_path: capacity_path.to_string(),
            level: AtomicU8::new(100),
            notifying: AtomicBool::new(false),
        }
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn payload(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.level()])
    }

    pub fn set_notifying(&self, enable: bool) {
        let was = self.notifying.swap(enable, Ordering::SeqCst);
        match (was, enable) {
            (false, true) => log::info!("Battery notifications enabled"),
            (true, false) => log::info!("Battery notifications disabled"),
            (true, true) => log::info!("Battery already notifying"),
            (false, false) => log::info!("Battery not notifying"),
        }
    }

    pub fn is_notifying(&self) -> bool {
        self.notifying.load(Ordering::SeqCst)
    }

    /// Re-read the capacity file; keeps the last level when unreadable.
    pub async fn refresh(&self) -> u8 {
        match tokio::fs::read_to_string(&self.capacity_path).await {
            Ok(text) => match text.trim().parse::<u8>() {
                Ok(v) => self.level.store(v.min(100), Ordering::Relaxed),
                Err(e) => log::debug!("Bad battery capacity {:?}: {}", text.trim(), e),
            },
            Err(e) => log::debug!("Battery capacity unavailable at {}: {}", self.capacity_path, e),
        }
        self.level()
    }

    pub async fn run(self: Arc<Self>, sink: Arc<dyn NotificationSink>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let level = self.refresh().await;
            log::debug!("Battery updated: {}%", level);
            if self.is_notifying() {
                if let Err(e) = sink.notify(Endpoint::Battery, self.payload()).await {
                    log::warn!("Failed to notify battery level: {}", e);
                }
            }
        }
    }
}
