use hlscast_av::{EncoderSettings, HardwareProfile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub encoder: EncoderSettings,

    #[serde(default)]
    pub hardware: HardwareProfile,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to serve on (0 = pick a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ports tried when the configured one is taken (port, port+1, ...)
    #[serde(default = "default_bind_attempts")]
    pub bind_attempts: u32,

    /// Host name or address put in stream URLs instead of the detected LAN address
    #[serde(default)]
    pub advertise_host: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_bind_attempts() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bind_attempts: default_bind_attempts(),
            advertise_host: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Parent directory for session working directories (default: system temp)
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// How long a freshly spawned encoder must survive to count as launched
    #[serde(default = "default_launch_probe_ms")]
    pub launch_probe_ms: u64,

    /// Overall budget for the encoder to produce its first segment
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Wait after SIGTERM before force-killing the encoder
    #[serde(default = "default_grace_timeout_secs")]
    pub grace_timeout_secs: u64,

    /// Poll interval while waiting for the first segment
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retention loop period
    #[serde(default = "default_retention_interval_ms")]
    pub retention_interval_ms: u64,

    /// Encoder backends tried per start (initial + degrade-and-retry)
    #[serde(default = "default_encoder_attempts")]
    pub encoder_attempts: u32,

    /// Encoder output lines kept in memory
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,

    /// Directory for encoder log files (disabled when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Encoder log file size before rotation
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,

    /// Directory for failure bundles (disabled when unset)
    #[serde(default)]
    pub failure_log_dir: Option<PathBuf>,
}

fn default_launch_probe_ms() -> u64 {
    500
}

fn default_startup_timeout_secs() -> u64 {
    60
}

fn default_grace_timeout_secs() -> u64 {
    3
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_retention_interval_ms() -> u64 {
    2000
}

fn default_encoder_attempts() -> u32 {
    2
}

fn default_log_lines() -> usize {
    500
}

fn default_log_max_bytes() -> u64 {
    1024 * 1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_root: None,
            launch_probe_ms: default_launch_probe_ms(),
            startup_timeout_secs: default_startup_timeout_secs(),
            grace_timeout_secs: default_grace_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retention_interval_ms: default_retention_interval_ms(),
            encoder_attempts: default_encoder_attempts(),
            log_lines: default_log_lines(),
            log_dir: None,
            log_max_bytes: default_log_max_bytes(),
            failure_log_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn launch_probe(&self) -> Duration {
        Duration::from_millis(self.launch_probe_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_millis(self.retention_interval_ms)
    }
}
