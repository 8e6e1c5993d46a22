use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    suppression: Suppression,
    delivery: Delivery,
    remote: Remote,
    mixer: Mixer,
    battery: Battery,
    stats: Stats,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    channels: u32,
    frame_size: usize,
}

#[derive(Deserialize)]
struct Suppression {
    engine: String,
    search_paths: Vec<String>,
}

#[derive(Deserialize)]
struct Delivery {
    queue_capacity: usize,
    notify_interval_ms: u64,
}

#[derive(Deserialize)]
struct Remote {
    local_ip: String,
    local_port: u16,
    remote_ip: String,
    remote_port: u16,
    buffer_size: usize,
}

#[derive(Deserialize)]
struct Mixer {
    card: String,
}

#[derive(Deserialize)]
struct Battery {
    capacity_path: String,
    poll_secs: u64,
}

#[derive(Deserialize)]
struct Stats {
    report_secs: u64,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=AUDIO_PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=AUDIO_FRAME_SIZE={}", config.audio.frame_size);

    // 降噪引擎，搜索路径以 ':' 拼接
    println!("cargo:rustc-env=SUPPRESSION_ENGINE={}", config.suppression.engine);
    println!(
        "cargo:rustc-env=SUPPRESSION_SEARCH_PATHS={}",
        config.suppression.search_paths.join(":")
    );

    println!("cargo:rustc-env=DELIVERY_QUEUE_CAPACITY={}", config.delivery.queue_capacity);
    println!("cargo:rustc-env=DELIVERY_NOTIFY_INTERVAL_MS={}", config.delivery.notify_interval_ms);

    // 远程控制通道 (BLE 外设进程)
    println!("cargo:rustc-env=REMOTE_LOCAL_IP={}", config.remote.local_ip);
    println!("cargo:rustc-env=REMOTE_LOCAL_PORT={}", config.remote.local_port);
    println!("cargo:rustc-env=REMOTE_REMOTE_IP={}", config.remote.remote_ip);
    println!("cargo:rustc-env=REMOTE_REMOTE_PORT={}", config.remote.remote_port);
    println!("cargo:rustc-env=REMOTE_BUFFER_SIZE={}", config.remote.buffer_size);

    println!("cargo:rustc-env=MIXER_CARD={}", config.mixer.card);

    println!("cargo:rustc-env=BATTERY_CAPACITY_PATH={}", config.battery.capacity_path);
    println!("cargo:rustc-env=BATTERY_POLL_SECS={}", config.battery.poll_secs);

    println!("cargo:rustc-env=STATS_REPORT_SECS={}", config.stats.report_secs);
}
