#[derive(Debug, Clone)]
pub struct Config {
    // 应用标识
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 网络配置
    pub ws_url: &'static str,

    // 音频设备配置
    pub capture_device: &'static str,
    pub playback_device: &'static str,
    pub playback_period: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            ws_url: env!("WS_URL"),

            capture_device: env!("CAPTURE_DEVICE"),
            playback_device: env!("PLAYBACK_DEVICE"),
            playback_period: env!("PLAYBACK_PERIOD")
                .parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD")?,
        })
    }
}
