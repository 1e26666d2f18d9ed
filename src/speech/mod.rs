//! Text-to-speech collaborators.
//!
//! `SpeechSink::speak` is fire-and-forget: implementations must return
//! without waiting for the utterance to finish.

mod announcer;

use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

pub use announcer::{
    compose_announcement, SpeechAnnouncer, ERROR_DETECTING_OBJECTS, ERROR_PROCESSING_RESULTS,
    NO_OBJECTS_DETECTED, VOICE_TEST_PHRASE,
};

/// Relative speaking rate and pitch (1.0 = engine default).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeechParams {
    pub rate: f32,
    pub pitch: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str, params: SpeechParams);
}

/// Writes utterances to the log instead of an audio device.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSpeech;

impl SpeechSink for LogSpeech {
    fn speak(&self, text: &str, params: SpeechParams) {
        log::info!(
            "speak (rate={:.1}, pitch={:.1}): {}",
            params.rate,
            params.pitch,
            text
        );
    }
}

const ESPEAK_BASE_WPM: f32 = 175.0;
const ESPEAK_BASE_PITCH: f32 = 50.0;

/// Speaks through an external TTS program, one child process per utterance.
#[derive(Clone, Debug)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    espeak_flags: bool,
}

impl CommandSpeech {
    /// Run `program [args..] <text>`; rate and pitch are not forwarded.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            espeak_flags: false,
        }
    }

    /// `espeak -s <wpm> -p <pitch> <text>`.
    pub fn espeak() -> Self {
        Self {
            program: "espeak".to_string(),
            args: Vec::new(),
            espeak_flags: true,
        }
    }

    fn command_args(&self, text: &str, params: SpeechParams) -> Vec<String> {
        let mut args = self.args.clone();
        if self.espeak_flags {
            let wpm = (ESPEAK_BASE_WPM * params.rate).round().clamp(80.0, 450.0);
            let pitch = (ESPEAK_BASE_PITCH * params.pitch).round().clamp(0.0, 99.0);
            args.push("-s".to_string());
            args.push(format!("{}", wpm as u32));
            args.push("-p".to_string());
            args.push(format!("{}", pitch as u32));
        }
        args.push(text.to_string());
        args
    }
}

impl SpeechSink for CommandSpeech {
    fn speak(&self, text: &str, params: SpeechParams) {
        let spawned = Command::new(&self.program)
            .args(self.command_args(text, params))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                // Reap in the background so speak() returns immediately.
                std::thread::spawn(move || {
                    if let Err(err) = child.wait() {
                        log::warn!("speech process wait failed: {}", err);
                    }
                });
            }
            Err(err) => log::warn!("failed to start speech program '{}': {}", self.program, err),
        }
    }
}

/// Records utterances in memory. Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct MemorySpeech {
    calls: Arc<Mutex<Vec<(String, SpeechParams)>>>,
}

impl MemorySpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, SpeechParams)> {
        self.lock().clone()
    }

    pub fn utterances(&self) -> Vec<String> {
        self.lock().iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, SpeechParams)>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpeechSink for MemorySpeech {
    fn speak(&self, text: &str, params: SpeechParams) {
        self.lock().push((text.to_string(), params));
    }
}
