use super::{SpeechParams, SpeechSink};
use crate::detect::DetectionMapping;

pub const NO_OBJECTS_DETECTED: &str = "No objects detected";
pub const ERROR_PROCESSING_RESULTS: &str = "Error processing detection results";
pub const ERROR_DETECTING_OBJECTS: &str = "Error detecting objects";
pub const VOICE_TEST_PHRASE: &str = "Voice feedback is working correctly";

/// Sentence read out for a mapping: `Detected: 1 person, 2 chairs`.
pub fn compose_announcement(objects: &DetectionMapping) -> String {
    if objects.is_empty() {
        return NO_OBJECTS_DETECTED.to_string();
    }
    let items: Vec<String> = objects
        .iter()
        .map(|(label, count)| {
            let plural = if count > 1 { "s" } else { "" };
            format!("{} {}{}", count, label, plural)
        })
        .collect();
    format!("Detected: {}", items.join(", "))
}

/// Turns detection results and status messages into speech requests.
///
/// While disabled no call reaches the sink at all.
pub struct SpeechAnnouncer {
    sink: Box<dyn SpeechSink>,
    params: SpeechParams,
    enabled: bool,
}

impl SpeechAnnouncer {
    pub fn new(sink: Box<dyn SpeechSink>) -> Self {
        Self {
            sink,
            params: SpeechParams::default(),
            enabled: true,
        }
    }

    pub fn with_params(mut self, params: SpeechParams) -> Self {
        self.params = params;
        self
    }

    pub fn set_params(&mut self, params: SpeechParams) {
        self.params = params;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn announce(&self, objects: &DetectionMapping) {
        if !self.enabled {
            return;
        }
        self.sink.speak(&compose_announcement(objects), self.params);
    }

    /// Speak a fixed status message.
    pub fn say(&self, message: &str) {
        if !self.enabled {
            return;
        }
        self.sink.speak(message, self.params);
    }

    pub fn test_voice(&self) {
        self.say(VOICE_TEST_PHRASE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::MemorySpeech;

    #[test]
    fn empty_mapping_reads_no_objects() {
        assert_eq!(
            compose_announcement(&DetectionMapping::new()),
            "No objects detected"
        );
    }

    #[test]
    fn counts_above_one_are_pluralized_in_order() {
        let objects: DetectionMapping = [("person", 1), ("chair", 2)].into_iter().collect();
        assert_eq!(compose_announcement(&objects), "Detected: 1 person, 2 chairs");
    }

    #[test]
    fn announce_uses_fixed_params() {
        let speech = MemorySpeech::new();
        let announcer = SpeechAnnouncer::new(Box::new(speech.clone()));
        announcer.announce(&[("laptop", 1)].into_iter().collect());

        let calls = speech.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "Detected: 1 laptop");
        assert_eq!(calls[0].1, SpeechParams { rate: 1.0, pitch: 1.0 });
    }

    #[test]
    fn disabled_announcer_never_reaches_the_sink() {
        let speech = MemorySpeech::new();
        let mut announcer = SpeechAnnouncer::new(Box::new(speech.clone()));
        announcer.set_enabled(false);
        announcer.announce(&DetectionMapping::new());
        announcer.say(ERROR_DETECTING_OBJECTS);
        announcer.test_voice();
        assert!(speech.utterances().is_empty());
    }
}
