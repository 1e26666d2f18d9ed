use std::sync::Arc;
use std::time::Duration;

use super::{Camera, CaptureOptions, ImageHandle};
use crate::transport::HttpClient;
use crate::DetectError;

const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Captures by fetching a JPEG snapshot over HTTP (`/capture` on ESP32-CAM,
/// `/snapshot.jpg` on most IP cameras).
///
/// The camera's bytes are forwarded as-is; quality is up to the device.
pub struct SnapshotCamera {
    url: String,
    client: Arc<dyn HttpClient>,
    timeout: Duration,
    name: String,
}

impl SnapshotCamera {
    pub fn new(url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        let url = url.into();
        let name = format!("snapshot:{}", url);
        Self {
            url,
            client,
            timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            name,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Camera for SnapshotCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self, _options: CaptureOptions) -> Result<ImageHandle, DetectError> {
        let response = self.client.get(&self.url, self.timeout).map_err(|err| {
            DetectError::CaptureFailed(format!("snapshot from {}: {}", self.url, err))
        })?;
        match response.status {
            401 | 403 => {
                return Err(DetectError::PermissionDenied(format!(
                    "snapshot endpoint {} refused access (status {})",
                    self.url, response.status
                )))
            }
            _ if !response.is_success() => {
                return Err(DetectError::CaptureFailed(format!(
                    "snapshot endpoint {} answered status {}",
                    self.url, response.status
                )))
            }
            _ => {}
        }
        if response.body.is_empty() {
            return Err(DetectError::CaptureFailed(format!(
                "empty snapshot from {}",
                self.url
            )));
        }
        Ok(ImageHandle::new(response.body).with_uri(self.url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, RequestBody};

    struct Fixed(Result<HttpResponse, DetectError>);

    impl HttpClient for Fixed {
        fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, DetectError> {
            self.0.clone()
        }

        fn post(
            &self,
            _url: &str,
            _body: RequestBody,
            _timeout: Duration,
        ) -> Result<HttpResponse, DetectError> {
            unreachable!()
        }
    }

    fn capture_with(answer: Result<HttpResponse, DetectError>) -> Result<ImageHandle, DetectError> {
        let mut camera = SnapshotCamera::new("http://cam/capture", Arc::new(Fixed(answer)));
        camera.capture(CaptureOptions {
            quality: 0.7,
            skip_processing: true,
        })
    }

    #[test]
    fn returns_body_of_successful_snapshot() {
        let mut response = HttpResponse::new(200);
        response.body = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let image = capture_with(Ok(response)).unwrap();
        assert_eq!(image.len(), 4);
        assert_eq!(image.uri.as_deref(), Some("http://cam/capture"));
    }

    #[test]
    fn forbidden_is_permission_denied() {
        let err = capture_with(Ok(HttpResponse::new(403))).unwrap_err();
        assert!(matches!(err, DetectError::PermissionDenied(_)));
    }

    #[test]
    fn unreachable_camera_is_capture_failure() {
        let err = capture_with(Err(DetectError::Timeout("slow".into()))).unwrap_err();
        assert!(matches!(err, DetectError::CaptureFailed(_)));
        let err = capture_with(Ok(HttpResponse::new(200))).unwrap_err();
        assert!(matches!(err, DetectError::CaptureFailed(_)));
    }
}
