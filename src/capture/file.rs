use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;

use super::{jpeg_quality, Camera, CaptureOptions, ImageHandle};
use crate::DetectError;

/// Captures by reading a JPEG from local disk.
///
/// Useful on hosts where another process keeps the file current (e.g. a
/// `fswebcam` cron job) and for demos without a camera.
pub struct FileCamera {
    path: PathBuf,
    name: String,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }
}

impl Camera for FileCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self, options: CaptureOptions) -> Result<ImageHandle, DetectError> {
        let bytes = std::fs::read(&self.path).map_err(|err| match err.kind() {
            std::io::ErrorKind::PermissionDenied => DetectError::PermissionDenied(format!(
                "no access to {}: {}",
                self.path.display(),
                err
            )),
            _ => DetectError::CaptureFailed(format!(
                "failed to read {}: {}",
                self.path.display(),
                err
            )),
        })?;
        if bytes.is_empty() {
            return Err(DetectError::CaptureFailed(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        let bytes = if options.skip_processing {
            bytes
        } else {
            reencode_jpeg(&bytes, options.quality)?
        };
        Ok(ImageHandle::new(bytes).with_uri(self.path.display().to_string()))
    }
}

fn reencode_jpeg(bytes: &[u8], quality: f32) -> Result<Vec<u8>, DetectError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| DetectError::CaptureFailed(format!("decode image: {}", e)))?;
    let rgb = decoded.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality))
        .encode_image(&rgb)
        .map_err(|e| DetectError::CaptureFailed(format!("encode jpeg: {}", e)))?;
    Ok(out.into_inner())
}
