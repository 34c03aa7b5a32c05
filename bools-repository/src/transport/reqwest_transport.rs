//! `reqwest` backed transport.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::errors::StoreError;
use crate::interfaces::{HttpRequest, HttpResponse, HttpTransport, Method};

/// Options for building the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Accept self-signed or otherwise invalid TLS certificates.
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }
}

/// Transport sending requests with a shared `reqwest::Client`.
///
/// Credentials embedded in the request URL are sent as basic auth.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with default options.
    pub fn new() -> Result<Self, StoreError> {
        Self::with_options(TransportOptions::default())
    }

    /// Build a transport with custom options.
    pub fn with_options(options: TransportOptions) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| StoreError::connection(e.to_string()))?;

        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, StoreError> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);

        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        debug!(method = %request.method, status = status, "Request completed");
        Ok(HttpResponse { status, body })
    }
}
