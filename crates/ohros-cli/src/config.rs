//! Bridge configuration – reads/writes `~/.ohros/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use ohros_kernel::RetryScheduler;
use ohros_middleware::BridgeTopics;
use ohros_runtime::{PollMode, PollingConfig, SourceSettings, StatsSink};

/// Failures while loading or saving the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Transport strategy for the read path, as spelled in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollModeSetting {
    #[default]
    Long,
    Short,
}

impl From<PollModeSetting> for PollMode {
    fn from(mode: PollModeSetting) -> Self {
        match mode {
            PollModeSetting::Long => PollMode::LongPoll,
            PollModeSetting::Short => PollMode::ShortPoll,
        }
    }
}

/// Persisted bridge configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_openhab_host")]
    pub openhab_host: String,

    #[serde(default = "default_openhab_port")]
    pub openhab_port: u16,

    /// Basic-Auth user; empty disables authentication.
    #[serde(default)]
    pub username: String,

    /// Basic-Auth password. Wiped from memory when the config is dropped.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Group item whose members are bridged.
    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default)]
    pub poll_mode: PollModeSetting,

    #[serde(default = "default_short_poll_interval_ms")]
    pub short_poll_interval_ms: u64,

    /// Upper bound for a single HTTP request (long-polls included).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_ceiling_ms")]
    pub retry_ceiling_ms: u64,

    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// When set, stats snapshots are also written to this item's state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_item: Option<String>,

    /// Port of the rosbridge WebSocket endpoint.
    #[serde(default = "default_rosbridge_port")]
    pub rosbridge_port: u16,

    #[serde(default = "default_update_topic")]
    pub update_topic: String,

    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    #[serde(default = "default_set_topic")]
    pub set_topic: String,

    #[serde(default = "default_stats_topic")]
    pub stats_topic: String,
}

impl Drop for Config {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("openhab_host", &self.openhab_host)
            .field("openhab_port", &self.openhab_port)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("group", &self.group)
            .field("poll_mode", &self.poll_mode)
            .field("retry_initial_ms", &self.retry_initial_ms)
            .field("retry_ceiling_ms", &self.retry_ceiling_ms)
            .field("stats_interval_secs", &self.stats_interval_secs)
            .field("stats_item", &self.stats_item)
            .field("rosbridge_port", &self.rosbridge_port)
            .finish_non_exhaustive()
    }
}

fn default_openhab_host() -> String {
    "localhost".to_string()
}
fn default_openhab_port() -> u16 {
    8080
}
fn default_group() -> String {
    "ROS".to_string()
}
fn default_short_poll_interval_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_retry_initial_ms() -> u64 {
    125
}
fn default_retry_ceiling_ms() -> u64 {
    257_000
}
fn default_stats_interval_secs() -> u64 {
    60
}
fn default_rosbridge_port() -> u16 {
    9090
}
fn default_update_topic() -> String {
    BridgeTopics::default().update
}
fn default_command_topic() -> String {
    BridgeTopics::default().command
}
fn default_set_topic() -> String {
    BridgeTopics::default().set
}
fn default_stats_topic() -> String {
    BridgeTopics::default().stats
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openhab_host: default_openhab_host(),
            openhab_port: default_openhab_port(),
            username: String::new(),
            password: String::new(),
            group: default_group(),
            poll_mode: PollModeSetting::default(),
            short_poll_interval_ms: default_short_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_ceiling_ms: default_retry_ceiling_ms(),
            stats_interval_secs: default_stats_interval_secs(),
            stats_item: None,
            rosbridge_port: default_rosbridge_port(),
            update_topic: default_update_topic(),
            command_topic: default_command_topic(),
            set_topic: default_set_topic(),
            stats_topic: default_stats_topic(),
        }
    }
}

impl Config {
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            host: self.openhab_host.clone(),
            port: self.openhab_port,
            username: self.username.clone(),
            password: Zeroizing::new(self.password.clone()),
            mode: self.poll_mode.into(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            group: self.group.clone(),
            mode: self.poll_mode.into(),
            short_poll_interval: Duration::from_millis(self.short_poll_interval_ms),
            retry: RetryScheduler::new(
                Duration::from_millis(self.retry_initial_ms),
                Duration::from_millis(self.retry_ceiling_ms),
            ),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn stats_sink(&self) -> StatsSink {
        match &self.stats_item {
            Some(item) if !item.is_empty() => StatsSink::SourceItem(item.clone()),
            _ => StatsSink::Log,
        }
    }

    pub fn bridge_topics(&self) -> BridgeTopics {
        BridgeTopics {
            update: self.update_topic.clone(),
            command: self.command_topic.clone(),
            set: self.set_topic.clone(),
            stats: self.stats_topic.clone(),
        }
    }
}

/// Return the path to `~/.ohros/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".ohros").join("config.toml")
}

/// Load the config from `path`, then apply environment overrides.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `OHROS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OHROS_OPENHAB_HOST` | `openhab_host` |
/// | `OHROS_OPENHAB_PORT` | `openhab_port` |
/// | `OHROS_USERNAME` | `username` |
/// | `OHROS_PASSWORD` | `password` |
/// | `OHROS_GROUP` | `group` |
/// | `OHROS_POLL_MODE` | `poll_mode` (`long` / `short`) |
/// | `OHROS_ROSBRIDGE_PORT` | `rosbridge_port` |
///
/// Unparseable numeric or mode values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("OHROS_OPENHAB_HOST") {
        cfg.openhab_host = v;
    }
    if let Ok(v) = std::env::var("OHROS_OPENHAB_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.openhab_port = port;
    }
    if let Ok(v) = std::env::var("OHROS_USERNAME") {
        cfg.username = v;
    }
    if let Ok(v) = std::env::var("OHROS_PASSWORD") {
        cfg.password.zeroize();
        cfg.password = v;
    }
    if let Ok(v) = std::env::var("OHROS_GROUP") {
        cfg.group = v;
    }
    if let Ok(v) = std::env::var("OHROS_POLL_MODE") {
        match v.as_str() {
            "long" => cfg.poll_mode = PollModeSetting::Long,
            "short" => cfg.poll_mode = PollModeSetting::Short,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("OHROS_ROSBRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.rosbridge_port = port;
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
///
/// The file holds credentials, so on Unix it is created `0600` inside a
/// `0700` directory.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let cfg = Config::default();
        let polling = cfg.polling_config();
        assert_eq!(polling.retry.current_delay(), Duration::from_millis(125));
        assert_eq!(polling.retry.ceiling(), Duration::from_secs(257));
        assert_eq!(polling.group, "ROS");
        assert_eq!(polling.mode, PollMode::LongPoll);
        assert_eq!(cfg.stats_interval(), Duration::from_secs(60));
        assert_eq!(cfg.stats_sink(), StatsSink::Log);
        assert_eq!(cfg.bridge_topics(), BridgeTopics::default());
    }

    #[test]
    fn debug_redacts_password() {
        let mut cfg = Config::default();
        cfg.password = "hunter2".to_string();
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn debug_shows_not_set_for_empty_password() {
        let debug_str = format!("{:?}", Config::default());
        assert!(debug_str.contains("<not set>"));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            openhab_host = "openhab.lan"
            group = "Robot"
            poll_mode = "short"
            stats_item = "Bridge_Stats"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.openhab_host, "openhab.lan");
        assert_eq!(cfg.openhab_port, 8080);
        assert_eq!(cfg.group, "Robot");
        assert_eq!(cfg.poll_mode, PollModeSetting::Short);
        assert_eq!(cfg.source_settings().mode, PollMode::ShortPoll);
        assert_eq!(cfg.stats_sink(), StatsSink::SourceItem("Bridge_Stats".into()));
    }

    #[test]
    fn zero_retry_initial_still_backs_off() {
        let cfg: Config = toml::from_str("retry_initial_ms = 0").unwrap();
        let mut retry = cfg.polling_config().retry;
        assert!(retry.current_delay() > Duration::ZERO);
        let first = retry.current_delay();
        retry.on_failure();
        assert_eq!(retry.current_delay(), first * 2);
    }

    #[test]
    fn unknown_poll_mode_is_parse_error() {
        let result: Result<Config, _> = toml::from_str(r#"poll_mode = "websocket""#);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let parent = path.parent().expect("parent");
        let dir_mode = fs::metadata(parent).expect("dir metadata").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.retry_ceiling_ms = 10_000;
        cfg.stats_item = Some("Bridge_Stats".to_string());
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.retry_ceiling_ms, 10_000);
        assert_eq!(loaded.stats_item.as_deref(), Some("Bridge_Stats"));
        assert_eq!(loaded.stats_interval_secs, 60);
    }

    #[test]
    fn config_path_points_to_ohros_dir() {
        let p = config_path_for_home("/home/robot");
        assert!(p.to_string_lossy().contains(".ohros"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "openhab_port = \"not a number\"").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    // All env-var assertions live in one test so they cannot race each other.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: no other test writes OHROS_* variables, and tests that load a
        // file only assert fields these variables do not touch.
        unsafe {
            std::env::set_var("OHROS_OPENHAB_HOST", "10.0.0.5");
            std::env::set_var("OHROS_OPENHAB_PORT", "not-a-port");
            std::env::set_var("OHROS_GROUP", "Robot");
            std::env::set_var("OHROS_POLL_MODE", "short");
            std::env::set_var("OHROS_ROSBRIDGE_PORT", "9191");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.openhab_host, "10.0.0.5");
        assert_eq!(cfg.openhab_port, 8080, "invalid port must be ignored");
        assert_eq!(cfg.group, "Robot");
        assert_eq!(cfg.poll_mode, PollModeSetting::Short);
        assert_eq!(cfg.rosbridge_port, 9191);
        unsafe {
            for var in [
                "OHROS_OPENHAB_HOST",
                "OHROS_OPENHAB_PORT",
                "OHROS_GROUP",
                "OHROS_POLL_MODE",
                "OHROS_ROSBRIDGE_PORT",
            ] {
                std::env::remove_var(var);
            }
        }
    }
}
