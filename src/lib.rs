//! Object Announcer
//!
//! Client side of a remote object-detection service: a camera frame is
//! captured, uploaded to the detection endpoint, the `x-detected-objects`
//! response header is decoded into a label → count mapping, the mapping is
//! stored for presentation and read out through text-to-speech.
//!
//! # Architecture
//!
//! The detection itself happens on the remote server. This crate owns the
//! coordination around it:
//!
//! 1. **Health gating**: detection only polls while the server answers `/test/`.
//! 2. **At most one upload in flight**: a guard is held until a fixed delay
//!    after each attempt settles, so slow networks cannot stack uploads.
//! 3. **Tolerant decoding**: the header is often a Python dict literal, not JSON.
//! 4. **Failures are absorbed**: no network or parse error stops the poll timer.
//!
//! # Module Structure
//!
//! - `detect`: `DetectionMapping`, header decoding, the shared result store
//! - `health`: server health probes and tracked `HealthState`
//! - `session`: the polling state machine, clock and runner thread
//! - `speech`: announcement phrasing and speech sinks
//! - `capture`: camera collaborators (file, HTTP snapshot, placeholder)
//! - `transport`: HTTP collaborator trait, multipart encoding, ureq client

pub mod capture;
pub mod config;
pub mod detect;
pub mod health;
pub mod session;
pub mod speech;
pub mod transport;

pub use capture::{Camera, CaptureOptions, CaptureSource, FileCamera, ImageHandle, SnapshotCamera};
pub use config::{ClientConfig, SharedConfig};
pub use detect::{DecodedHeader, DetectionMapping, DetectionResultStore, HeaderParser};
pub use health::{HealthState, HealthTransition, ServerHealthMonitor};
pub use session::{
    AttemptOutcome, Clock, DetectionOutcome, DetectionSession, ManualClock, PollOutcome,
    RunnerHandle, SessionCollaborators, SessionPhase, SessionRunner, SessionStats, SessionStatus,
    SkipReason, SystemClock,
};
pub use speech::{
    CommandSpeech, LogSpeech, MemorySpeech, SpeechAnnouncer, SpeechParams, SpeechSink,
};
#[cfg(feature = "http-ureq")]
pub use transport::UreqClient;
pub use transport::{HttpClient, HttpResponse, MultipartForm, RequestBody};

// -------------------- Errors --------------------

/// Failure taxonomy for the detection path.
///
/// None of these are fatal to the polling loop: the session converts them
/// into spoken status messages and an unchanged or empty result mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectError {
    /// Camera access refused. Capture stays blocked until permission is granted again.
    PermissionDenied(String),
    /// Probe or detect request could not reach the server, or it answered non-2xx.
    NetworkUnreachable(String),
    /// Request exceeded its deadline. Handled like `NetworkUnreachable`.
    Timeout(String),
    /// Header present but no decoding strategy accepted it.
    MalformedHeader(String),
    /// Camera produced no usable image for a reason other than permissions.
    CaptureFailed(String),
}

impl DetectError {
    pub fn code(&self) -> &'static str {
        match self {
            DetectError::PermissionDenied(_) => "PERMISSION_DENIED",
            DetectError::NetworkUnreachable(_) => "NETWORK_UNREACHABLE",
            DetectError::Timeout(_) => "TIMEOUT",
            DetectError::MalformedHeader(_) => "MALFORMED_HEADER",
            DetectError::CaptureFailed(_) => "CAPTURE_FAILED",
        }
    }

    fn message(&self) -> &str {
        match self {
            DetectError::PermissionDenied(m)
            | DetectError::NetworkUnreachable(m)
            | DetectError::Timeout(m)
            | DetectError::MalformedHeader(m)
            | DetectError::CaptureFailed(m) => m,
        }
    }
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for DetectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DetectError::Timeout("detect".into()).code(), "TIMEOUT");
        assert_eq!(DetectError::CaptureFailed("camera".into()).code(), "CAPTURE_FAILED");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = DetectError::MalformedHeader("garbage".into());
        assert_eq!(err.to_string(), "MALFORMED_HEADER: garbage");
    }
}
