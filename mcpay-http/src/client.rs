//! Shared JSON-over-HTTP plumbing for the collaborator clients.
//!
//! [`JsonClient`] wraps a `reqwest` client with the headers and timeout every
//! outbound call carries, and maps transport, status and decoding failures to
//! [`ClientError`] with a human-readable `context` (e.g. `"POST /sign"`).

use http::HeaderMap;
use reqwest::{Client, Response};
use std::fmt::Display;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Span;

use crate::error::ClientError;

/// A `reqwest` client with per-request headers and timeout.
#[derive(Clone, Debug, Default)]
pub struct JsonClient {
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl JsonClient {
    /// Creates a client with no extra headers and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns any custom headers configured on the client.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sends `payload` as a JSON `POST` and returns the response if its
    /// status is a success.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the request cannot be sent, and
    /// [`ClientError::HttpStatus`] (with the body) on a non-2xx status.
    pub async fn send_json<T>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
        extra_headers: &[(&'static str, &'static str)],
    ) -> Result<Response, ClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        for (key, value) in extra_headers {
            req = req.header(*key, *value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| ClientError::Http { context, source: e })?;

        if http_response.status().is_success() {
            return Ok(http_response);
        }
        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| ClientError::ResponseBodyRead { context, source: e })?;
        Err(ClientError::HttpStatus {
            context,
            status,
            body,
        })
    }

    /// Sends `payload` as a JSON `POST` and decodes a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails, the status is not 2xx,
    /// or the response is not valid JSON for `R`.
    pub async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, ClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let result = match self.send_json(url, context, payload, &[]).await {
            Ok(response) => response
                .json::<R>()
                .await
                .map_err(|e| ClientError::JsonDeserialization { context, source: e }),
            Err(error) => Err(error),
        };
        record_result_on_span(&result);
        result
    }
}

/// Parses a collaborator endpoint URL.
///
/// # Errors
///
/// Returns [`ClientError::UrlParse`] if `value` is not an absolute URL.
pub fn parse_endpoint(value: &str, context: &'static str) -> Result<Url, ClientError> {
    Url::parse(value.trim()).map_err(|e| ClientError::UrlParse { context, source: e })
}

/// Resolves `path` against a base URL, treating the base as a directory.
///
/// # Errors
///
/// Returns [`ClientError::UrlParse`] if the joined URL is invalid.
pub fn join_endpoint(
    base: &Url,
    path: &str,
    context: &'static str,
) -> Result<Url, ClientError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    base.join(path)
        .map_err(|e| ClientError::UrlParse { context, source: e })
}

/// Records the outcome of a request on the current tracing span.
#[cfg(feature = "telemetry")]
pub(crate) fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to collaborator failed");
        }
    }
}

/// Records the outcome of a request on the current tracing span.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
pub(crate) fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_join_endpoint_keeps_base_path() {
        let base = Url::parse("https://proofs.example/api").unwrap();
        let url = join_endpoint(&base, "prove", "test").unwrap();
        assert_eq!(url.as_str(), "https://proofs.example/api/prove");

        let base = Url::parse("https://proofs.example/api/").unwrap();
        let url = join_endpoint(&base, "prove", "test").unwrap();
        assert_eq!(url.as_str(), "https://proofs.example/api/prove");
    }

    #[tokio::test]
    async fn test_post_json_sends_headers_and_decodes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("x-api-key", "secret"))
            .and(body_json(json!({ "ping": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pong": 1 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let client = JsonClient::new()
            .with_headers(headers)
            .with_timeout(Duration::from_secs(5));
        let url = Url::parse(&format!("{}/echo", mock_server.uri())).unwrap();

        let response: serde_json::Value = client
            .post_json(&url, "POST /echo", &json!({ "ping": 1 }))
            .await
            .unwrap();
        assert_eq!(response, json!({ "pong": 1 }));
    }

    #[tokio::test]
    async fn test_post_json_reports_status_and_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&mock_server.uri()).unwrap();
        let err = JsonClient::new()
            .post_json::<_, serde_json::Value>(&url, "POST /", &json!({}))
            .await
            .unwrap_err();
        match err {
            ClientError::HttpStatus { status, body, .. } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
