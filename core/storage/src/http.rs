//! HTTP transport used by every provider.
//!
//! Providers build [`HttpRequest`] values and hand them to an
//! [`HttpTransport`]. Production code uses [`ReqwestTransport`]; tests swap
//! in a recording stub so no network is touched.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use imagehost_common::{Error, Result};

/// User agent sent with every request. GitHub rejects requests without one.
const USER_AGENT: &str = concat!("ImageHost/", env!("CARGO_PKG_VERSION"));

/// Characters left as-is inside a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Transport-level failure: no HTTP response was received.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// HTTP methods the backends need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add an `Authorization: Bearer` header.
    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token))
    }

    /// Set a raw body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::Serialization(format!("Failed to encode request body: {}", e)))?;
        Ok(self
            .header(header::CONTENT_TYPE.as_str(), "application/json")
            .body(body))
    }

    /// First value of a header, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response, fully buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends requests on behalf of providers.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer the whole response.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default client settings.
    ///
    /// No timeout is configured; requests rely on the client's defaults.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() || request.method != Method::Get {
            builder = builder.body(request.body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(format!("request to {} failed: {}", request.url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Percent-encode each segment of a `/`-separated path, dropping empty ones.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// `{"error": {"message": "..."}}`, used by Google and Microsoft APIs.
#[derive(Debug, Deserialize)]
struct NestedErrorBody {
    error: NestedError,
}

#[derive(Debug, Deserialize)]
struct NestedError {
    #[serde(default)]
    message: Option<String>,
}

/// Extract `error.message` from a response body, if present.
pub(crate) fn nested_error_message(response: &HttpResponse) -> Option<String> {
    response
        .json::<NestedErrorBody>()
        .ok()
        .and_then(|body| body.error.message)
        .filter(|m| !m.trim().is_empty())
}

/// Generic message for a failed status when the body says nothing useful.
pub(crate) fn generic_status_message(status: u16) -> String {
    let reason = match status {
        400 => "bad request",
        401 => "access token is invalid or expired",
        403 => "access token lacks the required permission",
        404 => "target folder or path not found",
        409 => "conflicting file or path",
        413 => "file too large for this backend",
        422 => "request could not be processed",
        429 => "rate limited, try again later",
        500..=599 => "server error",
        _ => "unexpected response",
    };
    format!("{} (HTTP {})", reason, status)
}

/// Map a non-2xx status to the error category it belongs to.
pub(crate) fn status_error(provider: &str, status: u16, message: String) -> Error {
    let provider = provider.to_string();
    match status {
        401 => Error::Authentication { provider, message },
        403 => Error::PermissionDenied { provider, message },
        404 => Error::NotFound { provider, message },
        422 => Error::Conflict { provider, message },
        _ => Error::Upload { provider, message },
    }
}

/// Map a transport failure to a provider-labelled network error.
pub(crate) fn network_error(provider: &str, err: TransportError) -> Error {
    Error::Network {
        provider: provider.to_string(),
        message: err.0,
    }
}
