//! Detection session: the capture → upload → decode → announce loop.
//!
//! # State machine
//!
//! ```text
//!            health Online (+ auto-detect)
//!   Idle ─────────────────────────────────▶ Polling
//!    ▲   ◀─────────────────────────────────   │  ▲
//!    │     health Offline / URL change /      │  │ guard released
//!    │     auto-detect off / teardown    tick │  │ (settle + 2 s)
//!    │                                        ▼  │
//!    └──────── guard released, no timer ──── InFlight
//! ```
//!
//! The poll timer keeps a fixed cadence. A tick that finds the in-flight
//! guard held is dropped, never queued. The guard is released by deadline
//! (a fixed delay after the attempt settles), not when the attempt returns.
//!
//! Failures of capture, upload or decoding are absorbed here and surface
//! only as speech and an empty or unchanged result mapping.

mod clock;
mod runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::CaptureSource;
use crate::config::{ClientConfig, SharedConfig};
use crate::detect::{
    DetectionMapping, DetectionResultStore, HeaderParser, DETECTED_OBJECTS_HEADER,
};
use crate::health::{HealthState, ServerHealthMonitor};
use crate::speech::{
    SpeechAnnouncer, SpeechSink, ERROR_DETECTING_OBJECTS, ERROR_PROCESSING_RESULTS,
    NO_OBJECTS_DETECTED,
};
use crate::transport::{endpoint, HttpClient, HttpResponse, MultipartForm};
use crate::DetectError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{RunnerHandle, SessionRunner, DEFAULT_POLL_GRANULARITY};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Polling,
    InFlight,
}

/// Why `attempt_detection` did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    GuardHeld,
    ServerNotOnline,
    NoCapture,
    PermissionDenied,
    TornDown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Header decoded (possibly to an empty mapping).
    Detected(DetectionMapping),
    /// Response carried no detection header.
    NoHeader,
    /// Header present but undecodable; an empty mapping was stored.
    MalformedHeader,
    /// No native capture: the placeholder mapping was used.
    Placeholder(DetectionMapping),
    /// Upload failed or timed out; the store is unchanged.
    RequestFailed(DetectError),
    /// Camera failed; nothing was uploaded.
    CaptureFailed(DetectError),
    /// Session was torn down while the request ran; result dropped.
    Discarded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Skipped(SkipReason),
    Completed(DetectionOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    TornDown,
    /// No poll timer armed.
    Idle,
    NotDue,
    /// Timer fired while the guard was held.
    TickDropped,
    Attempted(AttemptOutcome),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub attempts: u64,
    pub uploads: u64,
    pub failures: u64,
    pub ticks_dropped: u64,
    /// Health probes sent to the server.
    pub probes: u64,
}

/// Snapshot for presenters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub health: HealthState,
    pub guard_held: bool,
    pub stats: SessionStats,
}

/// External collaborators injected into a session.
pub struct SessionCollaborators {
    pub http: Arc<dyn HttpClient>,
    pub speech: Box<dyn SpeechSink>,
    pub capture: Option<CaptureSource>,
    pub clock: Arc<dyn Clock>,
}

impl SessionCollaborators {
    pub fn new(http: Arc<dyn HttpClient>, speech: Box<dyn SpeechSink>) -> Self {
        Self {
            http,
            speech,
            capture: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_capture(mut self, capture: CaptureSource) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Default)]
struct InFlightGuard {
    held: bool,
    release_at: Option<Instant>,
}

impl InFlightGuard {
    fn is_held(&self) -> bool {
        self.held
    }

    fn acquire(&mut self) {
        self.held = true;
        self.release_at = None;
    }

    fn release_at(&mut self, deadline: Instant) {
        self.release_at = Some(deadline);
    }

    /// Clears the guard once its deadline passed. A guard whose attempt
    /// has not settled yet has no deadline and stays held.
    fn release_if_due(&mut self, now: Instant) -> bool {
        match self.release_at {
            Some(deadline) if self.held && now >= deadline => {
                self.held = false;
                self.release_at = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
struct PollTimer {
    interval: Duration,
    next_tick: Instant,
}

impl PollTimer {
    fn new(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_tick: now + interval,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        now >= self.next_tick
    }

    /// Move past `now` on the fixed cadence. Returns how many ticks were
    /// missed in addition to the one firing now.
    fn advance(&mut self, now: Instant) -> u64 {
        let behind = now.saturating_duration_since(self.next_tick);
        let missed = behind.as_nanos() / self.interval.as_nanos().max(1);
        let periods = u32::try_from(missed + 1).unwrap_or(u32::MAX);
        self.next_tick += self.interval * periods;
        missed as u64
    }
}

enum Settled {
    Placeholder,
    Response(HttpResponse),
    RequestError(DetectError),
    CaptureError(DetectError),
}

pub struct DetectionSession {
    config: SharedConfig,
    http: Arc<dyn HttpClient>,
    monitor: ServerHealthMonitor,
    announcer: SpeechAnnouncer,
    parser: HeaderParser,
    store: DetectionResultStore,
    capture: Option<CaptureSource>,
    clock: Arc<dyn Clock>,
    phase: SessionPhase,
    timer: Option<PollTimer>,
    guard: InFlightGuard,
    probed_url: Option<String>,
    permission_denied: bool,
    torn_down: Arc<AtomicBool>,
    stats: SessionStats,
}

impl DetectionSession {
    pub fn new(config: SharedConfig, collaborators: SessionCollaborators) -> Self {
        let cfg = config.snapshot();
        let monitor =
            ServerHealthMonitor::with_timeout(collaborators.http.clone(), cfg.probe_timeout);
        let mut announcer = SpeechAnnouncer::new(collaborators.speech).with_params(cfg.speech);
        announcer.set_enabled(cfg.speech_enabled);
        Self {
            config,
            http: collaborators.http,
            monitor,
            announcer,
            parser: HeaderParser::new(),
            store: DetectionResultStore::new(),
            capture: collaborators.capture,
            clock: collaborators.clock,
            phase: SessionPhase::Idle,
            timer: None,
            guard: InFlightGuard::default(),
            probed_url: None,
            permission_denied: false,
            torn_down: Arc::new(AtomicBool::new(false)),
            stats: SessionStats::default(),
        }
    }

    /// Initial probe. Polling starts if the server answers.
    pub fn start(&mut self) -> HealthState {
        log::info!("detection session starting");
        self.refresh_health()
    }

    /// Probe the configured server now and apply the result.
    pub fn refresh_health(&mut self) -> HealthState {
        if self.is_torn_down() {
            return self.monitor.state();
        }
        let cfg = self.config.snapshot();
        self.monitor.set_timeout(cfg.probe_timeout);
        let transition = self.monitor.refresh(&cfg.server_url);
        self.probed_url = Some(cfg.server_url.clone());
        self.on_health(transition.current, &cfg);
        transition.current
    }

    /// One scheduler step: release a due guard, follow configuration
    /// edits, and fire the poll timer if it is due.
    pub fn poll(&mut self) -> PollOutcome {
        if self.is_torn_down() {
            return PollOutcome::TornDown;
        }
        self.release_guard_if_due();
        let cfg = self.config.snapshot();
        self.follow_config(&cfg);

        let now = self.clock.now();
        let Some(timer) = self.timer.as_mut() else {
            return PollOutcome::Idle;
        };
        if !timer.is_due(now) {
            return PollOutcome::NotDue;
        }
        let missed = timer.advance(now);
        if missed > 0 {
            log::debug!("{} poll tick(s) missed while busy", missed);
            self.stats.ticks_dropped += missed;
        }
        self.tick()
    }

    /// Timer tick: start an attempt unless the guard is held.
    pub fn tick(&mut self) -> PollOutcome {
        if self.is_torn_down() {
            return PollOutcome::TornDown;
        }
        self.release_guard_if_due();
        if self.guard.is_held() {
            log::debug!("detection tick dropped: previous attempt still guarded");
            self.stats.ticks_dropped += 1;
            return PollOutcome::TickDropped;
        }
        PollOutcome::Attempted(self.attempt_detection())
    }

    /// Run one detection attempt. Never fails; see [`DetectionOutcome`].
    pub fn attempt_detection(&mut self) -> AttemptOutcome {
        self.release_guard_if_due();
        if self.is_torn_down() {
            return AttemptOutcome::Skipped(SkipReason::TornDown);
        }
        if self.guard.is_held() {
            return AttemptOutcome::Skipped(SkipReason::GuardHeld);
        }
        if !self.monitor.state().is_online() {
            return AttemptOutcome::Skipped(SkipReason::ServerNotOnline);
        }
        if self.capture.is_none() {
            return AttemptOutcome::Skipped(SkipReason::NoCapture);
        }
        if self.permission_denied {
            return AttemptOutcome::Skipped(SkipReason::PermissionDenied);
        }

        self.guard.acquire();
        self.phase = SessionPhase::InFlight;
        self.stats.attempts += 1;

        let cfg = self.config.snapshot();
        self.announcer.set_enabled(cfg.speech_enabled);
        self.announcer.set_params(cfg.speech);

        let settled = self.run_attempt(&cfg);
        let outcome = if self.is_torn_down() {
            log::debug!("discarding detection result: session torn down");
            DetectionOutcome::Discarded
        } else {
            self.apply(settled)
        };

        self.guard.release_at(self.clock.now() + cfg.guard_release_delay);
        AttemptOutcome::Completed(outcome)
    }

    /// Clear a camera `PermissionDenied` block and re-probe the server.
    pub fn grant_camera_permission(&mut self) -> HealthState {
        if self.permission_denied {
            log::info!("camera permission granted");
        }
        self.permission_denied = false;
        self.refresh_health()
    }

    pub fn attach_capture(&mut self, capture: CaptureSource) {
        log::info!("capture source attached: {}", capture.describe());
        self.capture = Some(capture);
    }

    pub fn detach_capture(&mut self) -> Option<CaptureSource> {
        self.capture.take()
    }

    /// Speak the voice-feedback test phrase (when speech is enabled).
    pub fn test_voice(&mut self) {
        let cfg = self.config.snapshot();
        self.announcer.set_enabled(cfg.speech_enabled);
        self.announcer.set_params(cfg.speech);
        if !self.announcer.is_enabled() {
            log::info!("voice test skipped: speech is disabled");
            return;
        }
        self.announcer.test_voice();
    }

    /// Leave the session: disarm the timer and drop the capture source.
    /// A request already on the wire finishes but its result is discarded.
    pub fn teardown(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.disarm_timer("session torn down");
        self.capture = None;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Flag shared with other threads; setting it tears the session down.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.torn_down.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn health(&self) -> HealthState {
        self.monitor.state()
    }

    pub fn store(&self) -> DetectionResultStore {
        self.store.clone()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn is_guard_held(&self) -> bool {
        self.guard.is_held()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.timer.as_ref().map(|timer| timer.next_tick)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            probes: self.monitor.probe_count(),
            ..self.stats
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            health: self.monitor.state(),
            guard_held: self.guard.is_held(),
            stats: self.stats(),
        }
    }

    fn on_health(&mut self, state: HealthState, cfg: &ClientConfig) {
        match state {
            HealthState::Online if cfg.auto_detect_enabled => self.arm_timer(cfg.poll_interval),
            HealthState::Online => self.disarm_timer("auto-detect disabled"),
            HealthState::Offline | HealthState::Unknown => self.disarm_timer("server not online"),
        }
    }

    fn follow_config(&mut self, cfg: &ClientConfig) {
        self.announcer.set_enabled(cfg.speech_enabled);
        self.announcer.set_params(cfg.speech);

        if let Some(probed) = self.probed_url.as_deref() {
            if probed != cfg.server_url {
                log::info!("server url changed to {}", cfg.server_url);
                self.disarm_timer("server url changed");
                self.monitor.reset();
                self.refresh_health();
                return;
            }
        }

        if !cfg.auto_detect_enabled {
            self.disarm_timer("auto-detect disabled");
            return;
        }
        let interval_changed = self
            .timer
            .as_ref()
            .is_some_and(|timer| timer.interval != cfg.poll_interval);
        if interval_changed {
            self.timer = None;
            self.arm_timer(cfg.poll_interval);
        } else if self.timer.is_none() && self.monitor.state().is_online() {
            self.arm_timer(cfg.poll_interval);
        }
    }

    fn arm_timer(&mut self, interval: Duration) {
        if self.timer.is_some() {
            return;
        }
        self.timer = Some(PollTimer::new(self.clock.now(), interval));
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Polling;
        }
        log::info!("polling every {} ms", interval.as_millis());
    }

    fn disarm_timer(&mut self, reason: &str) {
        if self.timer.take().is_some() {
            log::info!("polling stopped: {}", reason);
        }
        if self.phase == SessionPhase::Polling {
            self.phase = SessionPhase::Idle;
        }
    }

    fn release_guard_if_due(&mut self) {
        if self.guard.release_if_due(self.clock.now()) {
            self.phase = if self.timer.is_some() {
                SessionPhase::Polling
            } else {
                SessionPhase::Idle
            };
        }
    }

    fn run_attempt(&mut self, cfg: &ClientConfig) -> Settled {
        let image = match self.capture.as_mut() {
            Some(CaptureSource::Placeholder) => return Settled::Placeholder,
            Some(CaptureSource::Device(camera)) => match camera.capture(cfg.capture.into()) {
                Ok(image) => {
                    log::debug!(
                        "captured {} bytes from {}",
                        image.len(),
                        image.uri.as_deref().unwrap_or(camera.name())
                    );
                    image
                }
                Err(err) => return Settled::CaptureError(err),
            },
            None => {
                return Settled::CaptureError(DetectError::CaptureFailed(
                    "no capture source attached".to_string(),
                ))
            }
        };
        self.stats.uploads += 1;
        match upload_photo(self.http.as_ref(), cfg, image.bytes) {
            Ok(response) => Settled::Response(response),
            Err(err) => Settled::RequestError(err),
        }
    }

    fn apply(&mut self, settled: Settled) -> DetectionOutcome {
        match settled {
            Settled::Placeholder => {
                let objects = DetectionMapping::placeholder();
                log::info!("no native capture: using placeholder detection");
                self.store.set(objects.clone());
                self.announcer.announce(&objects);
                DetectionOutcome::Placeholder(objects)
            }
            Settled::Response(response) => {
                let header = response
                    .header(DETECTED_OBJECTS_HEADER)
                    .map(str::trim)
                    .filter(|value| !value.is_empty());
                let Some(raw) = header else {
                    log::info!("no objects detected in response header");
                    self.store.set(DetectionMapping::new());
                    self.announcer.say(NO_OBJECTS_DETECTED);
                    return DetectionOutcome::NoHeader;
                };
                match self.parser.decode(raw) {
                    Ok(decoded) => {
                        log::info!(
                            "detected {} object(s): {}",
                            decoded.mapping.total(),
                            serde_json::to_string(&decoded.mapping).unwrap_or_default()
                        );
                        self.store.set(decoded.mapping.clone());
                        self.announcer.announce(&decoded.mapping);
                        DetectionOutcome::Detected(decoded.mapping)
                    }
                    Err(err) => {
                        log::warn!("error parsing detected objects: {}", err);
                        self.store.set(DetectionMapping::new());
                        self.announcer.say(ERROR_PROCESSING_RESULTS);
                        DetectionOutcome::MalformedHeader
                    }
                }
            }
            Settled::RequestError(err) => {
                self.stats.failures += 1;
                log::warn!("detection error: {}", err);
                self.announcer.say(ERROR_DETECTING_OBJECTS);
                DetectionOutcome::RequestFailed(err)
            }
            Settled::CaptureError(err) => {
                self.stats.failures += 1;
                if matches!(err, DetectError::PermissionDenied(_)) {
                    self.permission_denied = true;
                    log::warn!("camera access denied, capture paused until granted: {}", err);
                } else {
                    log::warn!("capture failed: {}", err);
                }
                DetectionOutcome::CaptureFailed(err)
            }
        }
    }
}

/// POST the photo to `<server>/detect/` as `file` + `tts` multipart fields.
///
/// Non-2xx answers are reported as `NetworkUnreachable`.
pub fn upload_photo(
    http: &dyn HttpClient,
    cfg: &ClientConfig,
    jpeg: Vec<u8>,
) -> Result<HttpResponse, DetectError> {
    let url = endpoint(&cfg.server_url, "detect");
    let tts = if cfg.speech_enabled { "true" } else { "false" };
    let body = MultipartForm::new()
        .file("file", "photo.jpg", "image/jpeg", jpeg)
        .text("tts", tts)
        .into_body();
    log::debug!("sending request to {}", url);
    let response = http.post(&url, body, cfg.detect_timeout)?;
    if !response.is_success() {
        return Err(DetectError::NetworkUnreachable(format!(
            "{} answered status {}",
            url, response.status
        )));
    }
    Ok(response)
}
