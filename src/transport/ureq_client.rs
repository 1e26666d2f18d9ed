use std::io::Read;
use std::time::Duration;

use super::{HttpClient, HttpResponse, RequestBody, MAX_BODY_BYTES};
use crate::DetectError;

/// Blocking HTTP client backed by a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, DetectError> {
        let result = self
            .agent
            .get(url)
            .timeout(timeout)
            .set("Accept", "application/json")
            .call();
        into_response(url, result)
    }

    fn post(
        &self,
        url: &str,
        body: RequestBody,
        timeout: Duration,
    ) -> Result<HttpResponse, DetectError> {
        let result = self
            .agent
            .post(url)
            .timeout(timeout)
            .set("Content-Type", &body.content_type)
            .set("Accept", "application/json, image/jpeg")
            .send_bytes(&body.bytes);
        into_response(url, result)
    }
}

fn into_response(
    url: &str,
    result: Result<ureq::Response, ureq::Error>,
) -> Result<HttpResponse, DetectError> {
    match result {
        Ok(response) => read_response(url, response),
        // ureq reports 4xx/5xx as errors; callers judge status themselves.
        Err(ureq::Error::Status(_, response)) => read_response(url, response),
        Err(ureq::Error::Transport(transport)) => Err(map_transport(url, &transport)),
    }
}

fn read_response(url: &str, response: ureq::Response) -> Result<HttpResponse, DetectError> {
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, value))
        })
        .collect();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut body)
        .map_err(|err| map_io(url, &err))?;
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn map_transport(url: &str, transport: &ureq::Transport) -> DetectError {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .map(|io| is_timeout(io.kind()))
        .unwrap_or(false);
    let message = transport.to_string();
    if io_timeout || message.contains("timed out") {
        DetectError::Timeout(format!("request to {} timed out", url))
    } else {
        DetectError::NetworkUnreachable(format!("request to {} failed: {}", url, message))
    }
}

fn map_io(url: &str, err: &std::io::Error) -> DetectError {
    if is_timeout(err.kind()) {
        DetectError::Timeout(format!("reading response from {} timed out", url))
    } else {
        DetectError::NetworkUnreachable(format!("reading response from {} failed: {}", url, err))
    }
}

fn is_timeout(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}
