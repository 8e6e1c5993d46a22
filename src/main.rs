mod audio;
mod battery;
mod config;
mod control;
mod controller;
mod gain;
mod mode;
mod notify_bridge;
mod protocol;
mod remote_link;

use audio::{AlsaBackend, AudioPipeline, StreamParams, delivery_queue, load_engine, report_stats};
use battery::BatteryMonitor;
use config::Config;
use control::ControlPlane;
use controller::CoreController;
use gain::AmixerBackend;
use mode::ModeController;
use notify_bridge::NotificationBridge;
use remote_link::{RemoteEvent, RemoteLink};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(|e| anyhow::anyhow!(e))?;
    log::info!("{} v{} starting", config.app_name, config.app_version);

    // 混音器安全初始化，再按默认模式设置音量和均衡器
    let mixer = Arc::new(AmixerBackend::new(config.mixer_card));
    mixer.init_safe_config().await;

    let modes = Arc::new(ModeController::new());
    let control = Arc::new(ControlPlane::new(modes.clone(), mixer));
    let initial = control.current();
    control.realize(&initial).await;

    // 降噪引擎与通知队列
    let engine = load_engine(config.suppression_engine, &config.suppression_search_paths);
    let (frame_tx, frame_rx) = delivery_queue(config.queue_capacity);

    // 启动音频线程，设备打不开直接退出
    let params = StreamParams {
        capture_device: config.capture_device.to_string(),
        playback_device: config.playback_device.to_string(),
        sample_rate: config.sample_rate,
        channels: config.channels,
        frame_size: config.frame_size,
    };
    let pipeline = Arc::new(AudioPipeline::new(
        Arc::new(AlsaBackend),
        params,
        modes.handle(),
        engine,
        frame_tx,
    ));
    if let Err(e) = pipeline.start() {
        log::error!("Audio pipeline failed to start: {:#}", e);
        return Err(e);
    }

    // 远程控制通道
    let (tx_remote_event, mut rx_remote_event) = mpsc::channel::<RemoteEvent>(100);
    let remote_link = Arc::new(RemoteLink::new(&config, tx_remote_event).await?);
    let remote_link_clone = remote_link.clone();
    tokio::spawn(async move {
        if let Err(e) = remote_link_clone.run().await {
            log::error!("RemoteLink error: {}", e);
        }
    });

    let bridge = Arc::new(NotificationBridge::new(
        frame_rx.clone(),
        remote_link.clone(),
        Duration::from_millis(config.notify_interval_ms),
    ));

    let battery = Arc::new(BatteryMonitor::new(config.battery_capacity_path));
    let battery_task = tokio::spawn(battery.clone().run(
        remote_link.clone(),
        Duration::from_secs(config.battery_poll_secs),
    ));

    let frame_budget =
        Duration::from_secs_f64(config.frame_size as f64 / config.sample_rate as f64);
    let stats_task = tokio::spawn(report_stats(
        pipeline.stats(),
        frame_rx,
        Duration::from_secs(config.stats_report_secs),
        frame_budget,
    ));

    let controller = CoreController::new(
        control,
        bridge.clone(),
        battery,
        pipeline.clone(),
        remote_link,
    );
    log::info!(
        "Tearis ready: mode {}, engine {}",
        initial.mode,
        if pipeline.has_engine() { "on" } else { "pass-through" }
    );

    let mut stream_lost = false;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            _ = pipeline.failed() => {
                log::error!("Audio stream lost, shutting down...");
                stream_lost = true;
                break;
            }

            Some(event) = rx_remote_event.recv() => {
                controller.handle_remote_event(event).await;
            }

            else => break,
        }
    }

    // 先停通知，再停音频线程
    bridge.shutdown();
    battery_task.abort();
    stats_task.abort();
    pipeline.stop();
    log::info!("Shutdown complete");
    if stream_lost {
        anyhow::bail!("audio stream stopped unexpectedly");
    }
    Ok(())
}
