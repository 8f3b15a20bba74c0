//! Unit tests for configuration parsing, defaults and validation.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use simbridge::config::GlobalConfig;

const FULL_CONFIG: &str = r#"
host = "10.0.0.5"
webrtc_port = 9000
rest_port = 4000

[simulation]
binary = "/opt/sim/bin/sim"
extra_args = ["--no-window", "--verbose"]
headless = false
livestream = "native"
udp_port = 49200
install_root = "/opt/sim"
lab_root = "/opt/lab"
discovery_pattern = "sim-kit"
settle_millis = 500
restart_pause_millis = 250
stop_grace_seconds = 9

[simulation.env]
CUDA_VISIBLE_DEVICES = "1"

[streaming]
path = "/ws"
client_path = "/client"
format = "h264"
strict_start = true

[control]
request_timeout_seconds = 30
connect_timeout_seconds = 3
"#;

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(FULL_CONFIG).expect("valid config");

    assert_eq!(config.host, "10.0.0.5");
    assert_eq!(config.webrtc_port, 9000);
    assert_eq!(config.rest_port, 4000);
    assert_eq!(config.simulation.binary, PathBuf::from("/opt/sim/bin/sim"));
    assert_eq!(config.simulation.extra_args, vec!["--no-window", "--verbose"]);
    assert!(!config.simulation.headless);
    assert_eq!(config.simulation.livestream, "native");
    assert_eq!(config.simulation.udp_port, 49200);
    assert_eq!(config.simulation.discovery_pattern.as_deref(), Some("sim-kit"));
    assert_eq!(config.simulation.settle_interval(), Duration::from_millis(500));
    assert_eq!(config.simulation.restart_pause(), Duration::from_millis(250));
    assert_eq!(config.simulation.stop_grace(), Duration::from_secs(9));
    assert_eq!(
        config.simulation.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str),
        Some("1")
    );
    assert_eq!(config.streaming.path, "/ws");
    assert_eq!(config.streaming.client_path, "/client");
    assert_eq!(config.streaming.format, "h264");
    assert!(config.streaming.strict_start);
    assert_eq!(config.control.request_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.control.connect_timeout(), Some(Duration::from_secs(3)));
}

#[test]
fn defaults_match_documented_values() {
    let config = GlobalConfig::default();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.webrtc_port, 8211);
    assert_eq!(config.rest_port, 3009);
    assert!(config.simulation.headless);
    assert_eq!(config.simulation.livestream, "webrtc");
    assert_eq!(config.simulation.udp_port, 49100);
    assert_eq!(config.simulation.settle_interval(), Duration::from_secs(2));
    assert_eq!(config.simulation.stop_grace(), Duration::from_secs(5));
    assert_eq!(config.streaming.path, "/streaming/webrtc");
    assert_eq!(config.streaming.format, "webrtc");
    assert!(!config.streaming.strict_start);
    assert_eq!(config.control.request_timeout(), None);
    assert_eq!(config.control.connect_timeout(), None);
}

#[test]
fn launch_ports_inherit_top_level_ports() {
    let config = GlobalConfig::from_toml_str("webrtc_port = 9000\nrest_port = 4000\n")
        .expect("valid config");
    assert_eq!(config.launch_webrtc_port(), 9000);
    assert_eq!(config.launch_rest_port(), 4000);

    let config = GlobalConfig::from_toml_str(
        "webrtc_port = 9000\n[simulation]\nwebrtc_port = 9100\nrest_port = 4100\n",
    )
    .expect("valid config");
    assert_eq!(config.launch_webrtc_port(), 9100);
    assert_eq!(config.launch_rest_port(), 4100);
}

#[test]
fn rejects_zero_port() {
    let err = GlobalConfig::from_toml_str("rest_port = 0").expect_err("zero port");
    assert_eq!(err.to_string(), "config: rest_port must be greater than zero");

    let err = GlobalConfig::from_toml_str("[simulation]\nwebrtc_port = 0").expect_err("zero port");
    assert!(err.to_string().contains("simulation.webrtc_port"));
}

#[test]
fn rejects_empty_host_and_livestream() {
    let err = GlobalConfig::from_toml_str("host = \"  \"").expect_err("empty host");
    assert!(err.to_string().contains("host must not be empty"));

    let err = GlobalConfig::from_toml_str("[simulation]\nlivestream = \"\"").expect_err("empty mode");
    assert!(err.to_string().contains("livestream"));
}

#[test]
fn rejects_relative_stream_path() {
    let err = GlobalConfig::from_toml_str("[streaming]\npath = \"ws\"").expect_err("relative path");
    assert!(err.to_string().contains("streaming.path"));
}

#[test]
fn invalid_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("host = [").expect_err("invalid toml");
    assert!(err.to_string().starts_with("config: invalid config:"));

    let err = GlobalConfig::from_toml_str("webrtc_port = \"high\"").expect_err("wrong type");
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"host = \"sim.local\"\n").expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.host, "sim.local");
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file");
    assert!(err.to_string().starts_with("config: failed to read config"));
}
