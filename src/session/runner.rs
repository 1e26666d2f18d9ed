use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{DetectionSession, PollOutcome, SessionStatus};
use crate::capture::CaptureSource;
use crate::detect::DetectionResultStore;

/// How often the runner thread polls the session.
pub const DEFAULT_POLL_GRANULARITY: Duration = Duration::from_millis(50);

enum Command {
    Refresh,
    DetectNow,
    GrantCameraPermission,
    AttachCapture(CaptureSource),
    TestVoice,
}

/// Drives a [`DetectionSession`] on its own thread.
pub struct SessionRunner {
    session: DetectionSession,
    granularity: Duration,
}

impl SessionRunner {
    pub fn new(session: DetectionSession) -> Self {
        Self {
            session,
            granularity: DEFAULT_POLL_GRANULARITY,
        }
    }

    pub fn with_granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn spawn(self) -> Result<RunnerHandle> {
        let store = self.session.store();
        let shutdown = self.session.cancel_token();
        let status = Arc::new(Mutex::new(self.session.status()));
        let (commands, inbox) = mpsc::channel();

        let status_thread = status.clone();
        let granularity = self.granularity;
        let session = self.session;
        let join = std::thread::Builder::new()
            .name("detection-session".to_string())
            .spawn(move || run_session(session, inbox, status_thread, granularity))
            .map_err(|e| anyhow!("failed to start session thread: {}", e))?;

        Ok(RunnerHandle {
            store,
            status,
            commands,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_session(
    mut session: DetectionSession,
    inbox: Receiver<Command>,
    status: Arc<Mutex<SessionStatus>>,
    granularity: Duration,
) {
    session.start();
    publish(&status, &session);
    loop {
        if !drain_commands(&mut session, &inbox) {
            log::debug!("session handle dropped");
            break;
        }
        if session.poll() == PollOutcome::TornDown {
            break;
        }
        publish(&status, &session);
        std::thread::sleep(granularity);
    }
    session.teardown();
    publish(&status, &session);
    log::info!("detection session stopped");
}

/// Run queued commands. Returns false once every handle is gone.
fn drain_commands(session: &mut DetectionSession, inbox: &Receiver<Command>) -> bool {
    loop {
        let command = match inbox.try_recv() {
            Ok(command) => command,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        };
        match command {
            Command::Refresh => {
                session.refresh_health();
            }
            Command::DetectNow => {
                let outcome = session.attempt_detection();
                log::debug!("manual detection: {:?}", outcome);
            }
            Command::GrantCameraPermission => {
                session.grant_camera_permission();
            }
            Command::AttachCapture(capture) => session.attach_capture(capture),
            Command::TestVoice => session.test_voice(),
        }
    }
}

fn publish(status: &Mutex<SessionStatus>, session: &DetectionSession) {
    let mut slot = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = session.status();
}

pub struct RunnerHandle {
    store: DetectionResultStore,
    status: Arc<Mutex<SessionStatus>>,
    commands: Sender<Command>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Latest detection results, shared with the session thread.
    pub fn store(&self) -> DetectionResultStore {
        self.store.clone()
    }

    pub fn status(&self) -> SessionStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-probe the server (e.g. after it was restarted).
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Run one attempt outside the poll cadence. Still subject to the guard.
    pub fn detect_now(&self) -> Result<()> {
        self.send(Command::DetectNow)
    }

    pub fn grant_camera_permission(&self) -> Result<()> {
        self.send(Command::GrantCameraPermission)
    }

    pub fn attach_capture(&self, capture: CaptureSource) -> Result<()> {
        self.send(Command::AttachCapture(capture))
    }

    pub fn test_voice(&self) -> Result<()> {
        self.send(Command::TestVoice)
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
            && self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Tear the session down and wait for its thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("detection session thread panicked"))?;
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("detection session is no longer running"))
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, SharedConfig};
    use crate::health::HealthState;
    use crate::session::{SessionCollaborators, SessionPhase};
    use crate::speech::MemorySpeech;
    use crate::transport::{HttpClient, HttpResponse, RequestBody};
    use crate::DetectError;
    use std::time::Instant;

    struct AlwaysUp;

    impl HttpClient for AlwaysUp {
        fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, DetectError> {
            Ok(HttpResponse::new(200))
        }

        fn post(
            &self,
            _url: &str,
            _body: RequestBody,
            _timeout: Duration,
        ) -> Result<HttpResponse, DetectError> {
            Ok(HttpResponse::new(200).with_header("x-detected-objects", r#"{"dog": 2}"#))
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn runner_probes_then_detects_on_request() {
        let speech = MemorySpeech::new();
        let config = SharedConfig::new(ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            auto_detect_enabled: false,
            ..ClientConfig::default()
        });
        let collaborators = SessionCollaborators::new(Arc::new(AlwaysUp), Box::new(speech.clone()))
            .with_capture(CaptureSource::device(crate::capture::FileCamera::new(
                "/nonexistent/object-announcer.jpg",
            )));
        let session = DetectionSession::new(config, collaborators);
        let handle = SessionRunner::new(session)
            .with_granularity(Duration::from_millis(5))
            .spawn()
            .unwrap();

        assert!(wait_for(|| handle.status().health == HealthState::Online));
        assert_eq!(handle.status().phase, SessionPhase::Idle);

        // The file camera fails, so nothing is uploaded or spoken.
        handle.detect_now().unwrap();
        assert!(wait_for(|| handle.status().stats.failures == 1));
        assert!(speech.calls().is_empty());

        handle.test_voice().unwrap();
        assert!(wait_for(|| !speech.calls().is_empty()));
        assert_eq!(
            speech.utterances(),
            vec!["Voice feedback is working correctly"]
        );

        handle.stop().unwrap();
    }

    #[test]
    fn commands_fail_after_stop() {
        let session = DetectionSession::new(
            SharedConfig::default(),
            SessionCollaborators::new(Arc::new(AlwaysUp), Box::new(MemorySpeech::new())),
        );
        let handle = SessionRunner::new(session).spawn().unwrap();
        let shutdown = handle.shutdown.clone();
        let commands = handle.commands.clone();
        handle.stop().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
        assert!(commands.send(Command::Refresh).is_err());
    }
}
