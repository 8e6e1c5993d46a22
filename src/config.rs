#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 音频配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub sample_rate: u32,
    pub channels: u32,
    pub frame_size: usize,

    // 降噪引擎配置
    pub suppression_engine: &'static str,
    pub suppression_search_paths: Vec<String>,

    // 通知队列配置
    pub queue_capacity: usize,
    pub notify_interval_ms: u64,

    // 远程控制通道配置
    pub remote_local_ip: &'static str,
    pub remote_local_port: u16,
    pub remote_remote_ip: &'static str,
    pub remote_remote_port: u16,
    pub remote_buffer_size: usize,

    pub mixer_card: &'static str,

    pub battery_capacity_path: &'static str,
    pub battery_poll_secs: u64,

    pub stats_report_secs: u64,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            capture_device: env!("AUDIO_CAPTURE_DEVICE"),
            playback_device: env!("AUDIO_PLAYBACK_DEVICE"),
            sample_rate: env!("AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse AUDIO_SAMPLE_RATE")?,
            channels: env!("AUDIO_CHANNELS").parse()
                .map_err(|_| "Failed to parse AUDIO_CHANNELS")?,
            frame_size: env!("AUDIO_FRAME_SIZE").parse()
                .map_err(|_| "Failed to parse AUDIO_FRAME_SIZE")?,

            suppression_engine: env!("SUPPRESSION_ENGINE"),
            suppression_search_paths: split_search_paths(env!("SUPPRESSION_SEARCH_PATHS")),

            queue_capacity: env!("DELIVERY_QUEUE_CAPACITY").parse()
                .map_err(|_| "Failed to parse DELIVERY_QUEUE_CAPACITY")?,
            notify_interval_ms: parse_period(
                env!("DELIVERY_NOTIFY_INTERVAL_MS"),
                "Failed to parse DELIVERY_NOTIFY_INTERVAL_MS (must be > 0)",
            )?,

            remote_local_ip: env!("REMOTE_LOCAL_IP"),
            remote_local_port: env!("REMOTE_LOCAL_PORT").parse()
                .map_err(|_| "Failed to parse REMOTE_LOCAL_PORT")?,
            remote_remote_ip: env!("REMOTE_REMOTE_IP"),
            remote_remote_port: env!("REMOTE_REMOTE_PORT").parse()
                .map_err(|_| "Failed to parse REMOTE_REMOTE_PORT")?,
            remote_buffer_size: env!("REMOTE_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse REMOTE_BUFFER_SIZE")?,

            mixer_card: env!("MIXER_CARD"),

            battery_capacity_path: env!("BATTERY_CAPACITY_PATH"),
            battery_poll_secs: parse_period(
                env!("BATTERY_POLL_SECS"),
                "Failed to parse BATTERY_POLL_SECS (must be > 0)",
            )?,

            stats_report_secs: parse_period(
                env!("STATS_REPORT_SECS"),
                "Failed to parse STATS_REPORT_SECS (must be > 0)",
            )?,
        })
    }
}

/// Timer periods. tokio intervals panic on zero.
fn parse_period(raw: &str, err: &'static str) -> Result<u64, &'static str> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(err),
    }
}

/// Split the ':'-joined search path list and expand a leading `~`.
fn split_search_paths(joined: &str) -> Vec<String> {
    joined
        .split(':')
        .filter(|p| !p.is_empty())
        .map(expand_home)
        .collect()
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}
