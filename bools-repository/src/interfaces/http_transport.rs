//! HTTP transport trait definition.
//!
//! The store clients never talk to the network directly. They build
//! [`HttpRequest`] values and hand them to an injected [`HttpTransport`],
//! which lets tests script responses and lets callers swap the HTTP stack.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::StoreError;

/// Content type for JSON request bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for InfluxDB line protocol bodies.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// HTTP methods used by the store clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A fully built request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Create a request with no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            content_type: None,
            timeout: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Create a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Create a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Create a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Attach a JSON body.
    pub fn json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.content_type = Some(CONTENT_TYPE_JSON);
        self
    }

    /// Attach a plain text body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.content_type = Some(CONTENT_TYPE_TEXT);
        self
    }

    /// Bound the request by a timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response as seen by the store clients: the status and the raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstract interface for sending HTTP requests.
///
/// Implementations must be `Send + Sync` so a client can be shared across
/// tasks. A request that never gets an answer (refused connection, timeout)
/// must surface as `StoreError::ConnectionError`; any answer, whatever its
/// status, is returned as `Ok(HttpResponse)` and judged by the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and wait for its response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::post("http://localhost:9200/_bulk")
            .json_body("{}")
            .timeout(Duration::from_secs(5));

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(request.content_type, Some(CONTENT_TYPE_JSON));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_response_is_success() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(201, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
