//! Connectivity tracking for the detection server.
//!
//! Health only changes through an explicit probe of `GET <server>/test/`.
//! Detection failures never demote it: one flaky upload must not switch
//! polling off. Probes run on start, on permission grant, when the server
//! URL changes and on explicit refresh.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::transport::{endpoint, HttpClient};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HealthState {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl HealthState {
    pub fn is_online(self) -> bool {
        self == HealthState::Online
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Online => "online",
            HealthState::Offline => "offline",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthTransition {
    pub previous: HealthState,
    pub current: HealthState,
}

impl HealthTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

pub struct ServerHealthMonitor {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
    state: HealthState,
    probes: u64,
}

impl ServerHealthMonitor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self::with_timeout(client, DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            state: HealthState::Unknown,
            probes: 0,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Probe `server_url` without touching the tracked state.
    ///
    /// Any 2xx answer is `Online`; timeouts, connection failures and other
    /// statuses are `Offline`.
    pub fn probe(&self, server_url: &str) -> HealthState {
        let url = endpoint(server_url, "test");
        match self.client.get(&url, self.timeout) {
            Ok(response) if response.is_success() => HealthState::Online,
            Ok(response) => {
                log::warn!("server probe {} answered status {}", url, response.status);
                HealthState::Offline
            }
            Err(err) => {
                log::warn!("server connection failed: {}", err);
                HealthState::Offline
            }
        }
    }

    /// Probe and record the result.
    pub fn refresh(&mut self, server_url: &str) -> HealthTransition {
        let previous = self.state;
        let current = self.probe(server_url);
        self.state = current;
        self.probes += 1;
        let transition = HealthTransition { previous, current };
        if transition.changed() {
            log::info!("server {} is {} (was {})", server_url, current, previous);
        }
        transition
    }

    /// Forget the last result, e.g. while a new server URL awaits its probe.
    pub fn reset(&mut self) {
        self.state = HealthState::Unknown;
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn probe_count(&self) -> u64 {
        self.probes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, RequestBody};
    use crate::DetectError;
    use std::sync::Mutex;

    struct Scripted {
        answers: Mutex<Vec<Result<HttpResponse, DetectError>>>,
        urls: Mutex<Vec<(String, Duration)>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<HttpResponse, DetectError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpClient for Scripted {
        fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, DetectError> {
            self.urls.lock().unwrap().push((url.to_string(), timeout));
            self.answers.lock().unwrap().remove(0)
        }

        fn post(
            &self,
            _url: &str,
            _body: RequestBody,
            _timeout: Duration,
        ) -> Result<HttpResponse, DetectError> {
            panic!("health probes never post")
        }
    }

    #[test]
    fn probes_test_endpoint_with_timeout() {
        let client = Scripted::new(vec![Ok(HttpResponse::new(200))]);
        let monitor = ServerHealthMonitor::new(client.clone());
        assert_eq!(monitor.probe("http://10.0.0.2:8000/"), HealthState::Online);
        let urls = client.urls.lock().unwrap();
        assert_eq!(urls[0].0, "http://10.0.0.2:8000/test/");
        assert_eq!(urls[0].1, Duration::from_millis(5_000));
    }

    #[test]
    fn failures_and_bad_status_are_offline() {
        let client = Scripted::new(vec![
            Err(DetectError::Timeout("slow".into())),
            Err(DetectError::NetworkUnreachable("refused".into())),
            Ok(HttpResponse::new(503)),
        ]);
        let monitor = ServerHealthMonitor::new(client);
        for _ in 0..3 {
            assert_eq!(monitor.probe("http://server"), HealthState::Offline);
        }
    }

    #[test]
    fn refresh_tracks_transitions() {
        let client = Scripted::new(vec![
            Ok(HttpResponse::new(200)),
            Ok(HttpResponse::new(200)),
            Err(DetectError::Timeout("slow".into())),
        ]);
        let mut monitor = ServerHealthMonitor::new(client);
        assert_eq!(monitor.state(), HealthState::Unknown);

        let first = monitor.refresh("http://server");
        assert_eq!(first.previous, HealthState::Unknown);
        assert_eq!(first.current, HealthState::Online);
        assert!(first.changed());

        assert!(!monitor.refresh("http://server").changed());

        let third = monitor.refresh("http://server");
        assert_eq!(third.current, HealthState::Offline);
        assert_eq!(monitor.state(), HealthState::Offline);
        assert_eq!(monitor.probe_count(), 3);
    }
}
