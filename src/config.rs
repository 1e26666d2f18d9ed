use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::speech::SpeechParams;

pub const DEFAULT_SERVER_URL: &str = "http://192.168.1.68:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DETECT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_GUARD_RELEASE_MS: u64 = 2_000;
const DEFAULT_CAPTURE_QUALITY: f32 = 0.7;

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    server_url: Option<String>,
    poll_interval_ms: Option<u64>,
    speech_enabled: Option<bool>,
    auto_detect_enabled: Option<bool>,
    probe_timeout_ms: Option<u64>,
    detect_timeout_ms: Option<u64>,
    guard_release_delay_ms: Option<u64>,
    capture: Option<CaptureConfigFile>,
    speech: Option<SpeechConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    quality: Option<f32>,
    skip_processing: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    rate: Option<f32>,
    pitch: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub speech_enabled: bool,
    pub auto_detect_enabled: bool,
    pub probe_timeout: Duration,
    pub detect_timeout: Duration,
    /// How long the in-flight guard stays held after an attempt settles.
    pub guard_release_delay: Duration,
    pub capture: CaptureSettings,
    pub speech: SpeechParams,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSettings {
    /// JPEG quality in 0.0..=1.0.
    pub quality: f32,
    pub skip_processing: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_CAPTURE_QUALITY,
            skip_processing: true,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            speech_enabled: true,
            auto_detect_enabled: true,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            detect_timeout: Duration::from_millis(DEFAULT_DETECT_TIMEOUT_MS),
            guard_release_delay: Duration::from_millis(DEFAULT_GUARD_RELEASE_MS),
            capture: CaptureSettings::default(),
            speech: SpeechParams::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, then the JSON file named by `ANNOUNCER_CONFIG`, then
    /// `ANNOUNCER_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ANNOUNCER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let defaults = Self::default();
        let capture = file.capture.unwrap_or_default();
        let speech = file.speech.unwrap_or_default();
        Self {
            server_url: file.server_url.unwrap_or(defaults.server_url),
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            speech_enabled: file.speech_enabled.unwrap_or(defaults.speech_enabled),
            auto_detect_enabled: file
                .auto_detect_enabled
                .unwrap_or(defaults.auto_detect_enabled),
            probe_timeout: file
                .probe_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_timeout),
            detect_timeout: file
                .detect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.detect_timeout),
            guard_release_delay: file
                .guard_release_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.guard_release_delay),
            capture: CaptureSettings {
                quality: capture.quality.unwrap_or(defaults.capture.quality),
                skip_processing: capture
                    .skip_processing
                    .unwrap_or(defaults.capture.skip_processing),
            },
            speech: SpeechParams {
                rate: speech.rate.unwrap_or(defaults.speech.rate),
                pitch: speech.pitch.unwrap_or(defaults.speech.pitch),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ANNOUNCER_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        if let Some(ms) = env_millis("ANNOUNCER_POLL_INTERVAL_MS")? {
            self.poll_interval = ms;
        }
        if let Some(ms) = env_millis("ANNOUNCER_PROBE_TIMEOUT_MS")? {
            self.probe_timeout = ms;
        }
        if let Some(ms) = env_millis("ANNOUNCER_DETECT_TIMEOUT_MS")? {
            self.detect_timeout = ms;
        }
        if let Ok(value) = std::env::var("ANNOUNCER_SPEECH") {
            self.speech_enabled = parse_bool("ANNOUNCER_SPEECH", &value)?;
        }
        if let Ok(value) = std::env::var("ANNOUNCER_AUTO_DETECT") {
            self.auto_detect_enabled = parse_bool("ANNOUNCER_AUTO_DETECT", &value)?;
        }
        Ok(())
    }

    /// Check invariants and normalize the server URL (no trailing slash).
    pub fn validate(&mut self) -> Result<()> {
        self.server_url = normalize_server_url(&self.server_url)?;
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.probe_timeout.is_zero() || self.detect_timeout.is_zero() {
            return Err(anyhow!("request timeouts must be greater than zero"));
        }
        if self.guard_release_delay.is_zero() {
            return Err(anyhow!("guard release delay must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.capture.quality) {
            return Err(anyhow!(
                "capture quality must be within 0.0..=1.0 (got {})",
                self.capture.quality
            ));
        }
        if self.speech.rate <= 0.0 || self.speech.pitch <= 0.0 {
            return Err(anyhow!("speech rate and pitch must be positive"));
        }
        Ok(())
    }
}

/// Validate an http(s) server URL and strip trailing slashes.
pub fn normalize_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| anyhow!("invalid server url '{}': {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported server url scheme '{}'; expected http or https",
                other
            ))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(anyhow!("server url '{}' has no host", raw));
    }
    Ok(trimmed.to_string())
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        _ => Ok(None),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean (got '{}')", key, other)),
    }
}

/// Configuration shared between the settings surface and the session.
///
/// The session reads a fresh snapshot on every poll, so edits apply to the
/// next tick.
#[derive(Clone, Debug)]
pub struct SharedConfig {
    inner: Arc<RwLock<ClientConfig>>,
}

impl SharedConfig {
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cfg)),
        }
    }

    pub fn snapshot(&self) -> ClientConfig {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply an edit; it is rejected (and nothing changes) if the result
    /// fails validation.
    pub fn update(&self, edit: impl FnOnce(&mut ClientConfig)) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow!("config lock poisoned"))?;
        let mut next = guard.clone();
        edit(&mut next);
        next.validate()?;
        *guard = next;
        Ok(())
    }

    pub fn set_server_url(&self, url: &str) -> Result<()> {
        self.update(|cfg| cfg.server_url = url.to_string())
    }

    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        self.update(|cfg| cfg.poll_interval = interval)
    }

    pub fn set_speech_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|cfg| cfg.speech_enabled = enabled)
    }

    pub fn set_auto_detect_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|cfg| cfg.auto_detect_enabled = enabled)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_client_settings() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.server_url, "http://192.168.1.68:8000");
        assert_eq!(cfg.poll_interval, Duration::from_millis(5_000));
        assert!(cfg.speech_enabled);
        assert!(cfg.auto_detect_enabled);
        assert_eq!(cfg.probe_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.detect_timeout, Duration::from_millis(15_000));
        assert_eq!(cfg.guard_release_delay, Duration::from_millis(2_000));
        assert!((cfg.capture.quality - 0.7).abs() < f32::EPSILON);
        assert!(cfg.capture.skip_processing);
    }

    #[test]
    fn server_url_is_normalized() {
        assert_eq!(
            normalize_server_url(" http://10.0.0.5:8000/ ").unwrap(),
            "http://10.0.0.5:8000"
        );
        assert!(normalize_server_url("ftp://10.0.0.5").is_err());
        assert!(normalize_server_url("not a url").is_err());
    }

    #[test]
    fn validate_rejects_zero_interval_and_bad_quality() {
        let mut cfg = ClientConfig {
            poll_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::default();
        cfg.capture.quality = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_guard_release_delay() {
        let mut cfg = ClientConfig {
            guard_release_delay: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(cfg.validate().is_err());

        let shared = SharedConfig::default();
        assert!(shared.update(|cfg| cfg.guard_release_delay = Duration::ZERO).is_err());
        assert_eq!(shared.snapshot().guard_release_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn shared_config_rejects_invalid_edit_without_change() {
        let shared = SharedConfig::default();
        assert!(shared.set_server_url("nonsense").is_err());
        assert_eq!(shared.snapshot().server_url, DEFAULT_SERVER_URL);

        shared.set_server_url("http://127.0.0.1:9000/").unwrap();
        assert_eq!(shared.snapshot().server_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "Yes").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }
}
