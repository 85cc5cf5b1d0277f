//! Loading configuration files from disk.

use hlscast::config::{load_config, load_config_or_default, Config};
use hlscast_av::EncoderBackend;
use tempfile::tempdir;

#[test]
fn load_config_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hlscast.toml");
    std::fs::write(
        &path,
        r#"
[server]
host = "127.0.0.1"
port = 9000

[encoder]
target_height = 720
audio_bitrate = "128k"

[hardware]
backends = ["vaapi", "software"]
vaapi_device = "/dev/dri/renderD129"

[session]
work_root = "/var/tmp/hlscast"
grace_timeout_secs = 5
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.encoder.target_height, 720);
    assert_eq!(config.encoder.audio_bitrate, "128k");
    assert_eq!(
        config.hardware.backends,
        vec![EncoderBackend::Vaapi, EncoderBackend::Software]
    );
    assert_eq!(
        config.hardware.vaapi_device.as_deref(),
        Some("/dev/dri/renderD129")
    );
    assert_eq!(
        config.session.work_root.as_deref(),
        Some(std::path::Path::new("/var/tmp/hlscast"))
    );
    assert_eq!(config.session.grace_timeout().as_secs(), 5);
}

#[test]
fn tilde_paths_are_expanded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hlscast.toml");
    std::fs::write(&path, "[session]\nlog_dir = \"~/hlscast-logs\"\n").unwrap();

    let config = load_config(&path).unwrap();
    let log_dir = config.session.log_dir.unwrap();
    assert!(!log_dir.starts_with("~"));
    assert!(log_dir.ends_with("hlscast-logs"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}

#[test]
fn invalid_file_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[server\nport = \"eighty\"").unwrap();

    let err = load_config(&path).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Invalid config file"));
    assert!(message.contains("broken.toml"));
}

#[test]
fn explicit_path_takes_precedence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[server]\nport = 0\n").unwrap();

    let config = load_config_or_default(Some(&path)).unwrap();
    assert_eq!(config.server.port, 0);
}

#[test]
fn explicit_missing_path_does_not_fall_back() {
    let dir = tempdir().unwrap();
    assert!(load_config_or_default(Some(&dir.path().join("nope.toml"))).is_err());
}

#[test]
fn default_config_is_valid() {
    assert!(hlscast::config::validate_config(&Config::default()).is_ok());
}
