//! Drains processed frames to the remote audio-stream endpoint on its own
//! timer, decoupled from the audio deadline.
//!
//! The timer only runs while at least one subscriber is active. The last
//! unsubscribe stops it and abandons whatever is still queued.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

use crate::audio::DeliveryReceiver;
use crate::protocol::Endpoint;

/// Where notifications go. Implemented by the remote link.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, endpoint: Endpoint, payload: Bytes) -> anyhow::Result<()>;
}

struct BridgeState {
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

pub struct NotificationBridge {
    queue: DeliveryReceiver,
    sink: Arc<dyn NotificationSink>,
    period: Duration,
    runtime: Handle,
    state: Mutex<BridgeState>,
}

impl NotificationBridge {
    /// Must be called from within a tokio runtime.
    pub fn new(queue: DeliveryReceiver, sink: Arc<dyn NotificationSink>, period: Duration) -> Self {
        Self {
            queue,
            sink,
            period,
            runtime: Handle::current(),
            state: Mutex::new(BridgeState {
                subscribers: 0,
                task: None,
            }),
        }
    }

    #[cfg(test)]
    pub fn subscribers(&self) -> usize {
        self.lock().subscribers
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.lock()
            .task
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Register a subscriber; the first one starts the timer.
    pub fn subscribe(&self) -> usize {
        let mut state = self.lock();
        state.subscribers += 1;
        if state.subscribers == 1 {
            // frames queued while nobody listened are stale
            let stale = self.queue.drain();
            log::info!(
                "Audio stream notifications enabled (every {:?}, {} stale frames dropped)",
                self.period,
                stale
            );
            state.task = Some(self.runtime.spawn(drain_loop(
                self.queue.clone(),
                self.sink.clone(),
                self.period,
            )));
        }
        state.subscribers
    }

    /// Remove a subscriber; the last one stops the timer. Extra calls are
    /// ignored.
    pub fn unsubscribe(&self) -> usize {
        let mut state = self.lock();
        if state.subscribers == 0 {
            log::info!("Audio stream not notifying");
            return 0;
        }
        state.subscribers -= 1;
        if state.subscribers == 0 {
            if let Some(task) = state.task.take() {
                task.abort();
            }
            let abandoned = self.queue.drain();
            log::info!(
                "Audio stream notifications disabled ({} queued frames abandoned)",
                abandoned
            );
        }
        state.subscribers
    }

    /// Stop regardless of subscriber count.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.subscribers = 0;
        if let Some(task) = state.task.take() {
            task.abort();
        }
        self.queue.drain();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drain_loop(queue: DeliveryReceiver, sink: Arc<dyn NotificationSink>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u64 = 0;
    loop {
        ticker.tick().await;
        let Some(frame) = queue.poll() else {
            continue;
        };
        if let Err(e) = sink.notify(Endpoint::AudioStream, frame.to_pcm16_le()).await {
            // log the first failure of each streak only
            if failures == 0 {
                log::warn!("Failed to deliver audio frame: {}", e);
            }
            failures += 1;
        } else if failures > 0 {
            log::info!("Audio delivery recovered after {} failures", failures);
            failures = 0;
        }
    }
}
