//! Global configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_webrtc_port() -> u16 {
    8211
}

fn default_rest_port() -> u16 {
    3009
}

fn default_true() -> bool {
    true
}

fn default_binary() -> PathBuf {
    PathBuf::from("/workspace/isaac-sim-5.0/_build/linux-x86_64/release/omni.isaac.sim")
}

fn default_livestream() -> String {
    "webrtc".into()
}

fn default_udp_port() -> u16 {
    49100
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/workspace/isaac-sim-5.0")
}

fn default_lab_root() -> PathBuf {
    PathBuf::from("/workspace/isaac-lab-2.2")
}

fn default_discovery_pattern() -> Option<String> {
    Some("isaac-sim".into())
}

fn default_settle_millis() -> u64 {
    2000
}

fn default_restart_pause_millis() -> u64 {
    1000
}

fn default_stop_grace_seconds() -> u64 {
    5
}

fn default_stream_path() -> String {
    "/streaming/webrtc".into()
}

fn default_client_path() -> String {
    "/streaming/webrtc-client".into()
}

fn default_stream_format() -> String {
    "webrtc".into()
}

/// Launch settings for the simulator process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SimulationConfig {
    /// Simulator executable.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Arguments appended after the generated launch flags.
    pub extra_args: Vec<String>,
    /// Run without a local window (`--headless`).
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Stream/display mode passed through `--livestream`.
    #[serde(default = "default_livestream")]
    pub livestream: String,
    /// Streaming port override; inherits [`GlobalConfig::webrtc_port`] when absent.
    pub webrtc_port: Option<u16>,
    /// Control port override; inherits [`GlobalConfig::rest_port`] when absent.
    pub rest_port: Option<u16>,
    /// UDP media port exported to the simulator environment.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Simulator installation root, exported as `ISAAC_SIM_PATH`.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,
    /// Companion lab root, exported as `ISAAC_LAB_PATH`.
    #[serde(default = "default_lab_root")]
    pub lab_root: PathBuf,
    /// `pgrep -f` pattern used to adopt an already-running instance.
    /// `None` or an empty string disables discovery.
    #[serde(default = "default_discovery_pattern")]
    pub discovery_pattern: Option<String>,
    /// Delay between launch and the single liveness probe.
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
    /// Pause between stop and start during a restart.
    #[serde(default = "default_restart_pause_millis")]
    pub restart_pause_millis: u64,
    /// Time allowed for a graceful exit before the process is killed.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
    /// Extra environment variables; these override the generated ones.
    pub env: BTreeMap<String, String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            extra_args: Vec::new(),
            headless: true,
            livestream: default_livestream(),
            webrtc_port: None,
            rest_port: None,
            udp_port: default_udp_port(),
            install_root: default_install_root(),
            lab_root: default_lab_root(),
            discovery_pattern: default_discovery_pattern(),
            settle_millis: default_settle_millis(),
            restart_pause_millis: default_restart_pause_millis(),
            stop_grace_seconds: default_stop_grace_seconds(),
            env: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Settle interval before the post-launch liveness probe.
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }

    /// Pause inserted between stop and start on restart.
    #[must_use]
    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_millis)
    }

    /// Grace period granted to a terminating process.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

/// Data-plane settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct StreamingConfig {
    /// WebSocket path of the streaming endpoint.
    #[serde(default = "default_stream_path")]
    pub path: String,
    /// HTTP path of the browser streaming client.
    #[serde(default = "default_client_path")]
    pub client_path: String,
    /// `format` announced in the `start_streaming` message.
    #[serde(default = "default_stream_format")]
    pub format: String,
    /// Report a failed `start_streaming` send as `false` instead of success.
    pub strict_start: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            client_path: default_client_path(),
            format: default_stream_format(),
            strict_start: false,
        }
    }
}

/// Control-plane settings.
///
/// Both timeouts default to 0, which means the request is allowed to
/// block for as long as the remote end takes.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ControlConfig {
    /// Whole-request timeout; 0 means no timeout.
    pub request_timeout_seconds: u64,
    /// TCP connect timeout; 0 means no timeout.
    pub connect_timeout_seconds: u64,
}

impl ControlConfig {
    /// Request timeout, if one is configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }

    /// Connect timeout, if one is configured.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_seconds > 0).then(|| Duration::from_secs(self.connect_timeout_seconds))
    }
}

/// Global configuration parsed from `simbridge.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Host running the simulator's control and streaming endpoints.
    #[serde(default = "default_host")]
    pub host: String,
    /// Streaming (WebSocket) port.
    #[serde(default = "default_webrtc_port")]
    pub webrtc_port: u16,
    /// Control-plane (HTTP) port.
    #[serde(default = "default_rest_port")]
    pub rest_port: u16,
    /// Simulator process launch settings.
    pub simulation: SimulationConfig,
    /// Streaming session settings.
    pub streaming: StreamingConfig,
    /// Control session settings.
    pub control: ControlConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            webrtc_port: default_webrtc_port(),
            rest_port: default_rest_port(),
            simulation: SimulationConfig::default(),
            streaming: StreamingConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Streaming port the simulator is launched with.
    #[must_use]
    pub fn launch_webrtc_port(&self) -> u16 {
        self.simulation.webrtc_port.unwrap_or(self.webrtc_port)
    }

    /// Control port the simulator is launched with.
    #[must_use]
    pub fn launch_rest_port(&self) -> u16 {
        self.simulation.rest_port.unwrap_or(self.rest_port)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        let ports = [
            ("webrtc_port", Some(self.webrtc_port)),
            ("rest_port", Some(self.rest_port)),
            ("simulation.webrtc_port", self.simulation.webrtc_port),
            ("simulation.rest_port", self.simulation.rest_port),
            ("simulation.udp_port", Some(self.simulation.udp_port)),
        ];
        for (name, port) in ports {
            if port == Some(0) {
                return Err(AppError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.simulation.livestream.trim().is_empty() {
            return Err(AppError::Config(
                "simulation.livestream must not be empty".into(),
            ));
        }

        if !self.streaming.path.starts_with('/') {
            return Err(AppError::Config(
                "streaming.path must start with '/'".into(),
            ));
        }

        Ok(())
    }
}
