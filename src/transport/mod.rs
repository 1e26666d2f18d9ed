//! HTTP collaborator for the detection service.
//!
//! The session and the health monitor only talk to the server through the
//! `HttpClient` trait, so tests can substitute scripted responses. The
//! blocking `ureq` implementation is behind the `http-ureq` feature.
//!
//! Clients return `Ok` for any HTTP status; deciding what a non-2xx answer
//! means is left to the caller. `Err` is reserved for requests that never
//! produced a response (connection failure, timeout).

mod multipart;
#[cfg(feature = "http-ureq")]
mod ureq_client;

use std::time::Duration;

use crate::DetectError;

pub use multipart::MultipartForm;
#[cfg(feature = "http-ureq")]
pub use ureq_client::UreqClient;

/// Largest response body kept in memory (annotated JPEG from `/detect/`).
pub const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

/// Encoded request payload with its content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, DetectError>;

    fn post(
        &self,
        url: &str,
        body: RequestBody,
        timeout: Duration,
    ) -> Result<HttpResponse, DetectError>;
}

/// Join a server base URL and an endpoint path, always with a trailing slash
/// (`http://host:8000` + `detect` → `http://host:8000/detect/`).
pub fn endpoint(server_url: &str, path: &str) -> String {
    format!(
        "{}/{}/",
        server_url.trim().trim_end_matches('/'),
        path.trim_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalizes_slashes() {
        assert_eq!(
            endpoint("http://192.168.1.68:8000", "test"),
            "http://192.168.1.68:8000/test/"
        );
        assert_eq!(
            endpoint("http://localhost:8000/", "/detect/"),
            "http://localhost:8000/detect/"
        );
    }

    #[test]
    fn header_lookup_ignores_case() {
        let response = HttpResponse::new(200).with_header("X-Detected-Objects", "{'cup': 1}");
        assert_eq!(response.header("x-detected-objects"), Some("{'cup': 1}"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(HttpResponse::new(204).is_success());
        assert!(!HttpResponse::new(301).is_success());
        assert!(!HttpResponse::new(500).is_success());
    }
}
