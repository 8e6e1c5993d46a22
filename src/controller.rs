use crate::audio::AudioPipeline;
use crate::battery::BatteryMonitor;
use crate::control::ControlPlane;
use crate::notify_bridge::{NotificationBridge, NotificationSink};
use crate::protocol::{Endpoint, Op, RemoteRequest};
use crate::remote_link::RemoteEvent;
use bytes::Bytes;
use std::sync::Arc;

/// Routes remote requests to the control plane, the notification bridge and
/// the battery monitor, and answers reads.
pub struct CoreController {
    control: Arc<ControlPlane>,
    bridge: Arc<NotificationBridge>,
    battery: Arc<BatteryMonitor>,
    pipeline: Arc<AudioPipeline>,
    replies: Arc<dyn NotificationSink>,
}

impl CoreController {
    pub fn new(
        control: Arc<ControlPlane>,
        bridge: Arc<NotificationBridge>,
        battery: Arc<BatteryMonitor>,
        pipeline: Arc<AudioPipeline>,
        replies: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            control,
            bridge,
            battery,
            pipeline,
            replies,
        }
    }

    pub async fn handle_remote_event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::Request(req) => self.handle_request(req).await,
        }
    }

    async fn handle_request(&self, req: RemoteRequest) {
        log::debug!("Remote request: {:?}", req);
        match req.op {
            Op::Read => self.handle_read(req.endpoint).await,
            Op::Write => self.handle_write(req.endpoint, req.value.as_deref()).await,
            Op::Subscribe | Op::Unsubscribe => {
                self.handle_subscription(req.endpoint, req.op == Op::Subscribe)
            }
        }
    }

    async fn handle_read(&self, endpoint: Endpoint) {
        if !endpoint.readable() {
            log::warn!("Read not supported on {:?}", endpoint);
            return;
        }
        let payload = match endpoint {
            Endpoint::Volume => self.control.volume_payload(),
            Endpoint::Mode => self.control.mode_payload(),
            Endpoint::Battery => self.battery.payload(),
            Endpoint::Status => self.status_payload(),
            Endpoint::AudioStream => return,
        };
        log::info!("{:?} read: {:?}", endpoint, payload);
        if let Err(e) = self.replies.notify(endpoint, payload).await {
            log::warn!("Failed to answer {:?} read: {}", endpoint, e);
        }
    }

    async fn handle_write(&self, endpoint: Endpoint, value: Option<&str>) {
        if !endpoint.writable() {
            log::warn!("Write not supported on {:?}", endpoint);
            return;
        }
        let Some(value) = value else {
            log::warn!("Write to {:?} without a value", endpoint);
            return;
        };
        match endpoint {
            Endpoint::Mode => {
                log::info!("Mode change received: {}", value);
                // invalid names are logged by the mode controller
                let _ = self.control.apply_mode(value).await;
            }
            Endpoint::Volume => match ControlPlane::parse_volume(value.as_bytes()) {
                Some(percent) => {
                    self.control.apply_volume(percent).await;
                }
                None => log::warn!("Invalid volume payload: {:?}", value),
            },
            _ => {}
        }
    }

    fn handle_subscription(&self, endpoint: Endpoint, enable: bool) {
        if !endpoint.notifiable() {
            log::warn!("Notify not supported on {:?}", endpoint);
            return;
        }
        match (endpoint, enable) {
            (Endpoint::AudioStream, true) => {
                self.bridge.subscribe();
            }
            (Endpoint::AudioStream, false) => {
                self.bridge.unsubscribe();
            }
            (Endpoint::Battery, enable) => self.battery.set_notifying(enable),
            _ => {}
        }
    }

    pub fn status_payload(&self) -> Bytes {
        let status: &'static str = if !self.pipeline.is_running() {
            "TEARIS_STOPPED"
        } else if !self.pipeline.has_engine() {
            "TEARIS_PASSTHROUGH"
        } else {
            "TEARIS_READY"
        };
        Bytes::from_static(status.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{StreamParams, delivery_queue};
    use crate::control::tests::RecordingGain;
    use crate::mode::{Mode, ModeController};
    use crate::notify_bridge::tests::RecordingSink;
    use std::time::Duration;

    struct NoDevice;

    impl crate::audio::AudioBackend for NoDevice {
        fn open(&self, _params: &StreamParams) -> anyhow::Result<Box<dyn crate::audio::DuplexStream>> {
            anyhow::bail!("no device in tests")
        }
    }

    fn controller() -> (CoreController, Arc<ModeController>, Arc<RecordingSink>, Arc<NotificationBridge>) {
        let modes = Arc::new(ModeController::new());
        let control = Arc::new(ControlPlane::new(modes.clone(), Arc::new(RecordingGain::default())));
        let (tx, rx) = delivery_queue(5);
        let sink = Arc::new(RecordingSink::default());
        let bridge = Arc::new(NotificationBridge::new(rx, sink.clone(), Duration::from_millis(5)));
        let pipeline = Arc::new(AudioPipeline::new(
            Arc::new(NoDevice),
            StreamParams {
                capture_device: "none".into(),
                playback_device: "none".into(),
                sample_rate: 48000,
                channels: 2,
                frame_size: 480,
            },
            modes.handle(),
            None,
            tx,
        ));
        let battery = Arc::new(BatteryMonitor::new("/nonexistent/capacity"));
        let core = CoreController::new(control, bridge.clone(), battery, pipeline, sink.clone());
        (core, modes, sink, bridge)
    }

    fn request(json: &str) -> RemoteEvent {
        RemoteEvent::Request(serde_json::from_str(json).unwrap())
    }

    #[tokio::test]
    async fn mode_and_volume_writes_apply() {
        let (core, modes, _sink, _bridge) = controller();
        core.handle_remote_event(request(r#"{"op":"write","endpoint":"mode","value":"MODE_SCHOOL"}"#))
            .await;
        assert_eq!(modes.current().mode, Mode::School);

        core.handle_remote_event(request(r#"{"op":"write","endpoint":"volume","value":"120"}"#))
            .await;
        assert_eq!(modes.current().volume, 85);

        core.handle_remote_event(request(r#"{"op":"write","endpoint":"mode","value":"rave"}"#))
            .await;
        assert_eq!(modes.current().mode, Mode::School);
    }

    #[tokio::test]
    async fn reads_are_answered() {
        let (core, _modes, sink, _bridge) = controller();
        core.handle_remote_event(request(r#"{"op":"read","endpoint":"mode"}"#)).await;
        core.handle_remote_event(request(r#"{"op":"read","endpoint":"status"}"#)).await;
        core.handle_remote_event(request(r#"{"op":"read","endpoint":"audio_stream"}"#)).await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], (Endpoint::Mode, Bytes::from_static(b"NORMAL")));
        assert_eq!(sent[1], (Endpoint::Status, Bytes::from_static(b"TEARIS_STOPPED")));
    }

    #[tokio::test]
    async fn audio_subscription_drives_bridge() {
        let (core, _modes, _sink, bridge) = controller();
        core.handle_remote_event(request(r#"{"op":"subscribe","endpoint":"audio_stream"}"#)).await;
        assert_eq!(bridge.subscribers(), 1);
        assert!(bridge.is_running());
        core.handle_remote_event(request(r#"{"op":"unsubscribe","endpoint":"audio_stream"}"#)).await;
        assert_eq!(bridge.subscribers(), 0);

        // status is read-only
        core.handle_remote_event(request(r#"{"op":"write","endpoint":"status","value":"x"}"#)).await;
    }
}
