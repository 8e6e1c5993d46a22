//! The capture → suppress → play/deliver loop.
//!
//! Runs on a dedicated OS thread (NOT a tokio task) so the real-time path
//! never contends with async control and network work. The only links to
//! the rest of the process are the lock-free configuration snapshot and the
//! lossy delivery queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::Notify;

use super::backend::{AudioBackend, DuplexStream, StreamParams};
use super::frame::Frame;
use super::queue::{DeliveryReceiver, DeliverySender};
use super::suppressor::SuppressionEngine;
use super::transform::FrameTransform;
use crate::mode::ConfigHandle;

/// Counters written by the audio thread, read by the stats reporter.
#[derive(Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    frames_suppressed: AtomicU64,
    transform_faults: AtomicU64,
    activation_failures: AtomicU64,
    busy_nanos: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub frames_suppressed: u64,
    pub transform_faults: u64,
    pub activation_failures: u64,
    pub busy_nanos: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_suppressed: self.frames_suppressed.load(Ordering::Relaxed),
            transform_faults: self.transform_faults.load(Ordering::Relaxed),
            activation_failures: self.activation_failures.load(Ordering::Relaxed),
            busy_nanos: self.busy_nanos.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Average per-tick processing time in ms between two snapshots.
    pub fn avg_latency_ms(&self, prev: &StatsSnapshot) -> f64 {
        let ticks = self.ticks.saturating_sub(prev.ticks);
        if ticks == 0 {
            return 0.0;
        }
        self.busy_nanos.saturating_sub(prev.busy_nanos) as f64 / ticks as f64 / 1_000_000.0
    }
}

/// Per-tick callback body. Owns the transform, so engine states live and
/// die on the audio thread.
pub struct FrameProcessor {
    transform: FrameTransform,
    config: ConfigHandle,
    delivery: DeliverySender,
    stats: Arc<PipelineStats>,
    frame_size: usize,
    channels: usize,
    activation_failed: bool,
    // reused for every chunk handed to the transform
    chunk: Frame,
}

impl FrameProcessor {
    pub fn new(
        transform: FrameTransform,
        config: ConfigHandle,
        delivery: DeliverySender,
        stats: Arc<PipelineStats>,
        frame_size: usize,
        channels: usize,
    ) -> Self {
        let frame_size = frame_size.max(1);
        let channels = channels.max(1);
        Self {
            transform,
            config,
            delivery,
            stats,
            frame_size,
            channels,
            activation_failed: false,
            chunk: Frame::new(Vec::with_capacity(frame_size * channels), channels),
        }
    }

    #[cfg(test)]
    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    /// Process one captured block into `output` (same length as `input`)
    /// and offer a copy to the delivery queue.
    ///
    /// Blocks longer than one frame are split into frame-aligned chunks; a
    /// shorter remainder is passed through unprocessed.
    pub fn on_tick(&mut self, input: &[f32], output: &mut [f32]) {
        let started = Instant::now();
        let len = input.len().min(output.len());
        let enabled = self.config.suppression_enabled();
        self.sync_engine(enabled);

        let chunk = self.frame_size * self.channels;
        let mut offset = 0;
        while offset + chunk <= len {
            let src = &input[offset..offset + chunk];
            let dst = &mut output[offset..offset + chunk];
            if enabled && self.transform.is_active() {
                let mut frame =
                    std::mem::replace(&mut self.chunk, Frame::new(Vec::new(), self.channels));
                frame.refill(src);
                let faults = self.transform.faults();
                let frame = self.transform.process(frame);
                dst.copy_from_slice(frame.samples());
                if self.transform.faults() > faults {
                    self.stats.transform_faults.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.frames_suppressed.fetch_add(1, Ordering::Relaxed);
                }
                self.chunk = frame;
            } else {
                dst.copy_from_slice(src);
            }
            offset += chunk;
        }
        output[offset..len].copy_from_slice(&input[offset..len]);

        // best effort: dropped when the bridge is behind
        self.delivery
            .offer(Frame::new(output[..len].to_vec(), self.channels));

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        self.stats
            .busy_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    fn sync_engine(&mut self, enabled: bool) {
        if !enabled {
            self.activation_failed = false;
            self.transform.deactivate();
            return;
        }
        if self.transform.is_active() || self.activation_failed || !self.transform.has_engine() {
            return;
        }
        if let Err(e) = self.transform.activate() {
            // don't retry every tick; the next enable cycle tries again
            log::error!("Failed to create noise suppression state: {:#}", e);
            self.activation_failed = true;
            self.stats.activation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Start/stop wrapper running a [`FrameProcessor`] against a duplex stream.
pub struct AudioPipeline {
    backend: Arc<dyn AudioBackend>,
    params: StreamParams,
    config: ConfigHandle,
    engine: Option<Arc<dyn SuppressionEngine>>,
    delivery: DeliverySender,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
    failed: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPipeline {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        params: StreamParams,
        config: ConfigHandle,
        engine: Option<Arc<dyn SuppressionEngine>>,
        delivery: DeliverySender,
    ) -> Self {
        Self {
            backend,
            params,
            config,
            engine,
            delivery,
            stats: Arc::new(PipelineStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves when the audio thread exits on a stream error after a
    /// successful start. A plain `stop()` does not resolve it.
    pub async fn failed(&self) {
        self.failed.notified().await
    }

    /// Open the stream and start the audio thread. No-op when already
    /// running. Returns the open error if the device cannot be opened.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() && self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        // reap a thread that ended on a stream error
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }

        log::info!(
            "AudioPipeline starting: capture: \"{}\", playback: \"{}\", rate: {}Hz, ch: {}, frame: {}, engine: {}",
            self.params.capture_device,
            self.params.playback_device,
            self.params.sample_rate,
            self.params.channels,
            self.params.frame_size,
            self.engine.as_ref().map(|e| e.name()).unwrap_or("none"),
        );

        self.running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let handle = {
            let backend = self.backend.clone();
            let params = self.params.clone();
            let running = self.running.clone();
            let failed = self.failed.clone();
            let processor = FrameProcessor::new(
                FrameTransform::new(self.engine.clone(), self.params.channels as usize),
                self.config.clone(),
                self.delivery.clone(),
                self.stats.clone(),
                self.params.frame_size,
                self.params.channels as usize,
            );
            let spawned = thread::Builder::new()
                .name("audio-pipeline".into())
                .spawn(move || {
                    let stream = match backend.open(&params) {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            running.store(false, Ordering::SeqCst);
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let result = run_duplex(stream, processor, &params, &running);
                    running.store(false, Ordering::SeqCst);
                    if let Err(e) = result {
                        log::error!("Audio pipeline error: {:#}", e);
                        failed.notify_one();
                    }
                });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e).context("Failed to spawn audio thread");
                }
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.context("Failed to open audio stream"))
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                anyhow::bail!("Audio thread exited during startup")
            }
        }
    }

    /// Stop the audio thread and wait for the in-flight tick to finish.
    /// The stream and any engine states are released before this returns.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = worker.take() {
            let _ = handle.join();
            log::info!("AudioPipeline stopped");
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_duplex(
    mut stream: Box<dyn DuplexStream>,
    mut processor: FrameProcessor,
    params: &StreamParams,
    running: &AtomicBool,
) -> Result<()> {
    let channels = params.channels as usize;
    let mut input = vec![0.0f32; params.tick_samples()];
    let mut output = vec![0.0f32; params.tick_samples()];

    log::info!("Audio pipeline running");

    while running.load(Ordering::Relaxed) {
        let frames = stream.read(&mut input)?;
        if frames == 0 {
            continue;
        }
        let n = (frames * channels).min(input.len());
        processor.on_tick(&input[..n], &mut output[..n]);
        stream.write(&output[..n])?;
    }

    // engine states before the device
    drop(processor);
    drop(stream);
    Ok(())
}

/// Log a processing summary every `period` until the task is dropped.
pub async fn report_stats(
    stats: Arc<PipelineStats>,
    queue: DeliveryReceiver,
    period: Duration,
    frame_budget: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    let mut prev = stats.snapshot();
    loop {
        ticker.tick().await;
        let now = stats.snapshot();
        let avg_ms = now.avg_latency_ms(&prev);
        let budget_ms = frame_budget.as_secs_f64() * 1000.0;
        let cpu = if budget_ms > 0.0 { avg_ms / budget_ms * 100.0 } else { 0.0 };
        log::info!(
            "Latency: {:.2}ms | CPU: ~{:.1}% | ticks: {} | suppressed: {} | faults: {} | activation failures: {} | dropped: {} | queue: {}/{}",
            avg_ms,
            cpu,
            now.ticks - prev.ticks,
            now.frames_suppressed - prev.frames_suppressed,
            now.transform_faults - prev.transform_faults,
            now.activation_failures,
            queue.dropped(),
            queue.len(),
            queue.capacity(),
        );
        if now.transform_faults > prev.transform_faults {
            log::warn!(
                "{} frames passed through unprocessed after engine faults",
                now.transform_faults - prev.transform_faults
            );
        }
        prev = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::delivery_queue;
    use crate::audio::transform::tests::HalvingEngine;
    use crate::mode::ModeController;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const FRAME: usize = 480;
    const CH: usize = 2;

    fn ramp(samples: usize) -> Vec<f32> {
        (0..samples).map(|i| ((i % 64) as f32 - 32.0) / 64.0).collect()
    }

    fn processor_with(
        engine: Option<Arc<dyn SuppressionEngine>>,
        modes: &ModeController,
        capacity: usize,
    ) -> (FrameProcessor, DeliveryReceiver, Arc<PipelineStats>) {
        let (tx, rx) = delivery_queue(capacity);
        let stats = Arc::new(PipelineStats::default());
        let processor = FrameProcessor::new(
            FrameTransform::new(engine, CH),
            modes.handle(),
            tx,
            stats.clone(),
            FRAME,
            CH,
        );
        (processor, rx, stats)
    }

    #[test]
    fn disabled_suppression_is_bit_exact_pass_through() {
        let engine = HalvingEngine::new(FRAME);
        let calls = engine.calls.clone();
        let modes = ModeController::new();
        let (mut p, rx, _) = processor_with(Some(Arc::new(engine)), &modes, 5);

        let input = ramp(FRAME * CH);
        let mut output = vec![0.0; input.len()];
        p.on_tick(&input, &mut output);

        assert_eq!(output, input);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(rx.poll().unwrap().samples(), &input[..]);
    }

    #[test]
    fn enabled_suppression_runs_engine() {
        let engine = HalvingEngine::new(FRAME);
        let modes = ModeController::new();
        let (mut p, _rx, stats) = processor_with(Some(Arc::new(engine)), &modes, 5);
        modes.set_mode("school").unwrap();

        let input = vec![0.5; FRAME * CH];
        let mut output = vec![0.0; input.len()];
        p.on_tick(&input, &mut output);

        assert!(output.iter().all(|s| (s - 0.25).abs() < 1e-6));
        assert_eq!(stats.snapshot().frames_suppressed, 1);
    }

    #[test]
    fn toggling_returns_to_exact_pass_through() {
        let engine = HalvingEngine::new(FRAME);
        let live = engine.live.clone();
        let modes = ModeController::new();
        let (mut p, _rx, _) = processor_with(Some(Arc::new(engine)), &modes, 5);
        let input = ramp(FRAME * CH);
        let mut output = vec![0.0; input.len()];

        modes.set_mode("transport").unwrap();
        p.on_tick(&input, &mut output);
        assert_eq!(live.load(Ordering::SeqCst), CH);

        // SCHOOL <-> TRANSPORT keeps the states warm
        modes.set_mode("school").unwrap();
        p.on_tick(&input, &mut output);
        assert_eq!(p.transform().activations(), 1);

        modes.set_mode("normal").unwrap();
        p.on_tick(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn oversized_block_is_split_and_tail_passed_through() {
        let engine = HalvingEngine::new(FRAME);
        let calls = engine.calls.clone();
        let modes = ModeController::new();
        modes.set_mode("school").unwrap();
        let (mut p, _rx, _) = processor_with(Some(Arc::new(engine)), &modes, 5);

        let tail = 100 * CH;
        let input = vec![0.5; 2 * FRAME * CH + tail];
        let mut output = vec![0.0; input.len()];
        p.on_tick(&input, &mut output);

        // two aligned chunks, one call per channel each
        assert_eq!(calls.load(Ordering::SeqCst), 2 * CH);
        let split = 2 * FRAME * CH;
        assert!(output[..split].iter().all(|s| (s - 0.25).abs() < 1e-6));
        assert!(output[split..].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn engine_unavailable_is_identity_for_every_frame() {
        let modes = ModeController::new();
        modes.set_mode("transport").unwrap();
        let (mut p, _rx, stats) = processor_with(None, &modes, 5);
        for k in 0..20 {
            let input: Vec<f32> = ramp(FRAME * CH).iter().map(|s| s * (k as f32 / 20.0)).collect();
            let mut output = vec![1.0; input.len()];
            p.on_tick(&input, &mut output);
            assert_eq!(output, input);
        }
        assert_eq!(stats.snapshot().frames_suppressed, 0);
    }

    #[test]
    fn engine_fault_passes_frame_and_counts() {
        let mut engine = HalvingEngine::new(FRAME);
        engine.fail = true;
        let modes = ModeController::new();
        modes.set_mode("school").unwrap();
        let (mut p, _rx, stats) = processor_with(Some(Arc::new(engine)), &modes, 5);

        let input = ramp(FRAME * CH);
        let mut output = vec![0.0; input.len()];
        p.on_tick(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(stats.snapshot().transform_faults, 1);
    }

    #[test]
    fn activation_failure_is_counted_once_per_enable() {
        let mut engine = HalvingEngine::new(FRAME);
        engine.fail_create = true;
        let modes = ModeController::new();
        modes.set_mode("school").unwrap();
        let (mut p, _rx, stats) = processor_with(Some(Arc::new(engine)), &modes, 5);

        let input = ramp(FRAME * CH);
        let mut output = vec![0.0; input.len()];
        p.on_tick(&input, &mut output);
        p.on_tick(&input, &mut output);
        assert_eq!(output, input);
        assert_eq!(stats.snapshot().activation_failures, 1);

        modes.set_mode("normal").unwrap();
        p.on_tick(&input, &mut output);
        modes.set_mode("transport").unwrap();
        p.on_tick(&input, &mut output);
        assert_eq!(stats.snapshot().activation_failures, 2);
    }

    #[test]
    fn full_delivery_queue_never_blocks_or_grows() {
        let modes = ModeController::new();
        let (mut p, rx, _) = processor_with(None, &modes, 5);
        let input = ramp(FRAME * CH);
        let mut output = vec![0.0; input.len()];
        for _ in 0..100 {
            p.on_tick(&input, &mut output);
            assert!(rx.len() <= 5);
        }
        assert_eq!(rx.len(), 5);
        assert_eq!(rx.dropped(), 95);
    }

    // ---- start/stop against a scripted backend ----

    struct ScriptedBackend {
        blocks: Mutex<VecDeque<Vec<f32>>>,
        played: Arc<Mutex<Vec<Vec<f32>>>>,
        opened: AtomicUsize,
        fail_open: bool,
        fail_when_empty: bool,
    }

    struct ScriptedStream {
        blocks: VecDeque<Vec<f32>>,
        played: Arc<Mutex<Vec<Vec<f32>>>>,
        channels: usize,
        fail_when_empty: bool,
    }

    impl AudioBackend for ScriptedBackend {
        fn open(&self, params: &StreamParams) -> Result<Box<dyn DuplexStream>> {
            if self.fail_open {
                anyhow::bail!("no such device");
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let blocks = std::mem::take(&mut *self.blocks.lock().unwrap());
            Ok(Box::new(ScriptedStream {
                blocks,
                played: self.played.clone(),
                channels: params.channels as usize,
                fail_when_empty: self.fail_when_empty,
            }))
        }
    }

    impl DuplexStream for ScriptedStream {
        fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
            match self.blocks.pop_front() {
                Some(block) => {
                    buf[..block.len()].copy_from_slice(&block);
                    Ok(block.len() / self.channels)
                }
                None if self.fail_when_empty => anyhow::bail!("device unplugged"),
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Ok(0)
                }
            }
        }

        fn write(&mut self, buf: &[f32]) -> Result<()> {
            self.played.lock().unwrap().push(buf.to_vec());
            Ok(())
        }
    }

    fn params() -> StreamParams {
        StreamParams {
            capture_device: "test".into(),
            playback_device: "test".into(),
            sample_rate: 48000,
            channels: CH as u32,
            frame_size: FRAME,
        }
    }

    fn scripted(blocks: usize, fail_open: bool) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend {
            blocks: Mutex::new((0..blocks).map(|_| ramp(FRAME * CH)).collect()),
            played: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
            fail_open,
            fail_when_empty: false,
        })
    }

    fn unplugged_after(blocks: usize) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend {
            blocks: Mutex::new((0..blocks).map(|_| ramp(FRAME * CH)).collect()),
            played: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
            fail_open: false,
            fail_when_empty: true,
        })
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn start_is_idempotent_and_stop_releases() {
        let backend = scripted(8, false);
        let modes = ModeController::new();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(backend.clone(), params(), modes.handle(), None, tx);

        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert_eq!(backend.opened.load(Ordering::SeqCst), 1);
        assert!(pipeline.is_running());

        wait_for(|| backend.played.lock().unwrap().len() == 8);
        pipeline.stop();
        pipeline.stop();
        assert!(!pipeline.is_running());

        let played = backend.played.lock().unwrap();
        assert_eq!(played.len(), 8);
        assert!(played.iter().all(|b| *b == ramp(FRAME * CH)));
    }

    #[test]
    fn stop_releases_engine_states() {
        let backend = scripted(4, false);
        let engine = HalvingEngine::new(FRAME);
        let live = engine.live.clone();
        let modes = ModeController::new();
        modes.set_mode("school").unwrap();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(
            backend.clone(),
            params(),
            modes.handle(),
            Some(Arc::new(engine)),
            tx,
        );

        pipeline.start().unwrap();
        wait_for(|| backend.played.lock().unwrap().len() == 4);
        assert_eq!(live.load(Ordering::SeqCst), CH);
        pipeline.stop();
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_waits_for_in_flight_frame() {
        let backend = scripted(1000, false);
        let mut engine = HalvingEngine::new(FRAME);
        engine.delay = Duration::from_millis(40);
        let live = engine.live.clone();
        let calls = engine.calls.clone();
        let modes = ModeController::new();
        modes.set_mode("transport").unwrap();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(
            backend.clone(),
            params(),
            modes.handle(),
            Some(Arc::new(engine)),
            tx,
        );

        pipeline.start().unwrap();
        // the engine is now inside `process` on the audio thread
        wait_for(|| calls.load(Ordering::SeqCst) >= 1);
        pipeline.stop();

        assert_eq!(live.load(Ordering::SeqCst), 0);
        let after_stop = calls.load(Ordering::SeqCst);
        let played = backend.played.lock().unwrap().len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        assert_eq!(backend.played.lock().unwrap().len(), played);
    }

    #[tokio::test]
    async fn stream_error_signals_failure() {
        let backend = unplugged_after(3);
        let modes = ModeController::new();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(backend.clone(), params(), modes.handle(), None, tx);

        pipeline.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), pipeline.failed())
            .await
            .expect("stream error should be signalled");
        assert!(!pipeline.is_running());
        assert_eq!(backend.played.lock().unwrap().len(), 3);
        pipeline.stop();
    }

    #[tokio::test]
    async fn plain_stop_is_not_a_failure() {
        let backend = scripted(2, false);
        let modes = ModeController::new();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(backend, params(), modes.handle(), None, tx);

        pipeline.start().unwrap();
        pipeline.stop();
        let waited = tokio::time::timeout(Duration::from_millis(50), pipeline.failed()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn open_failure_is_reported_and_restartable() {
        let backend = scripted(0, true);
        let modes = ModeController::new();
        let (tx, _rx) = delivery_queue(5);
        let pipeline = AudioPipeline::new(backend, params(), modes.handle(), None, tx);
        assert!(pipeline.start().is_err());
        assert!(!pipeline.is_running());
        pipeline.stop();
    }

    #[test]
    fn latency_average() {
        let prev = StatsSnapshot::default();
        let now = StatsSnapshot {
            ticks: 4,
            busy_nanos: 8_000_000,
            ..Default::default()
        };
        assert!((now.avg_latency_ms(&prev) - 2.0).abs() < 1e-9);
        assert_eq!(prev.avg_latency_ms(&prev), 0.0);
    }
}
