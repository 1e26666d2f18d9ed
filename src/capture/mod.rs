//! Camera collaborators.
//!
//! The session asks a `CaptureSource` for one JPEG per detection attempt:
//! - `FileCamera`: a still image on local disk (re-encoded at the requested quality)
//! - `SnapshotCamera`: a JPEG snapshot endpoint over HTTP (IP cameras, ESP32-CAM)
//! - `CaptureSource::Placeholder`: no native capture; a fixed mapping stands in
//!
//! Captured images are handed straight to the upload and never written to disk.

mod file;
mod snapshot;

use crate::config::CaptureSettings;
use crate::DetectError;

pub use file::FileCamera;
pub use snapshot::SnapshotCamera;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureOptions {
    /// JPEG quality in 0.0..=1.0.
    pub quality: f32,
    /// Hand the camera's bytes through untouched.
    pub skip_processing: bool,
}

impl From<CaptureSettings> for CaptureOptions {
    fn from(settings: CaptureSettings) -> Self {
        Self {
            quality: settings.quality,
            skip_processing: settings.skip_processing,
        }
    }
}

/// One captured JPEG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageHandle {
    pub bytes: Vec<u8>,
    /// Where the image came from, for logging.
    pub uri: Option<String>,
}

impl ImageHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, uri: None }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait Camera: Send {
    fn name(&self) -> &str;

    /// Capture one frame. `PermissionDenied` means access was refused and
    /// retrying is pointless until the user grants it again.
    fn capture(&mut self, options: CaptureOptions) -> Result<ImageHandle, DetectError>;
}

/// What the session captures from.
pub enum CaptureSource {
    Device(Box<dyn Camera>),
    /// No native capture on this platform: detection yields
    /// [`DetectionMapping::placeholder`](crate::DetectionMapping::placeholder)
    /// without a network call.
    Placeholder,
}

impl CaptureSource {
    pub fn device(camera: impl Camera + 'static) -> Self {
        CaptureSource::Device(Box::new(camera))
    }

    pub fn describe(&self) -> &str {
        match self {
            CaptureSource::Device(camera) => camera.name(),
            CaptureSource::Placeholder => "placeholder",
        }
    }
}

/// JPEG quality scale used by encoders (1..=100).
pub(crate) fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_to_encoder_scale() {
        assert_eq!(jpeg_quality(0.7), 70);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn options_follow_settings() {
        let options = CaptureOptions::from(CaptureSettings::default());
        assert!(options.skip_processing);
        assert!((options.quality - 0.7).abs() < f32::EPSILON);
    }
}
