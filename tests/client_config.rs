use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use object_announcer::config::ClientConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ANNOUNCER_CONFIG",
        "ANNOUNCER_SERVER_URL",
        "ANNOUNCER_POLL_INTERVAL_MS",
        "ANNOUNCER_PROBE_TIMEOUT_MS",
        "ANNOUNCER_DETECT_TIMEOUT_MS",
        "ANNOUNCER_SPEECH",
        "ANNOUNCER_AUTO_DETECT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg, ClientConfig::default());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "server_url": "http://10.0.0.7:8000/",
        "poll_interval_ms": 8000,
        "speech_enabled": false,
        "detect_timeout_ms": 20000,
        "guard_release_delay_ms": 3000,
        "capture": { "quality": 0.5, "skip_processing": false },
        "speech": { "rate": 1.25 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ANNOUNCER_CONFIG", file.path());
    std::env::set_var("ANNOUNCER_POLL_INTERVAL_MS", "3000");
    std::env::set_var("ANNOUNCER_AUTO_DETECT", "off");

    let cfg = ClientConfig::load().expect("load config");

    assert_eq!(cfg.server_url, "http://10.0.0.7:8000");
    assert_eq!(cfg.poll_interval, Duration::from_millis(3000));
    assert!(!cfg.speech_enabled);
    assert!(!cfg.auto_detect_enabled);
    assert_eq!(cfg.probe_timeout, Duration::from_millis(5000));
    assert_eq!(cfg.detect_timeout, Duration::from_millis(20000));
    assert_eq!(cfg.guard_release_delay, Duration::from_millis(3000));
    assert!((cfg.capture.quality - 0.5).abs() < f32::EPSILON);
    assert!(!cfg.capture.skip_processing);
    assert!((cfg.speech.rate - 1.25).abs() < f32::EPSILON);
    assert!((cfg.speech.pitch - 1.0).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("ANNOUNCER_POLL_INTERVAL_MS", "soon");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("ANNOUNCER_POLL_INTERVAL_MS", "0");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("ANNOUNCER_SERVER_URL", "ftp://10.0.0.7");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("ANNOUNCER_SPEECH", "loud");
    assert!(ClientConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("ANNOUNCER_CONFIG", dir.path().join("missing.json"));
    assert!(ClientConfig::load().is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var("ANNOUNCER_CONFIG", file.path());
    assert!(ClientConfig::load().is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "guard_release_delay_ms": 0 }"#)
        .expect("write config");
    std::env::set_var("ANNOUNCER_CONFIG", file.path());
    assert!(ClientConfig::load().is_err());

    clear_env();
}
