//! HTTP transport abstraction.
//!
//! Everything above this layer talks to an [`HttpTransport`], so the token
//! handling can be exercised against a scripted transport in tests and
//! against reqwest in production.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use http::Method;

#[cfg(test)]
pub mod mock;

/// A fully resolved outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Value of the Authorization header, if any
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.as_str())
    }
}

/// Response data as seen by the client
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
        }
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Body as a JSON value, falling back to a JSON string for non-JSON bodies
    /// and `None` for empty ones
    pub fn json_value(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        Some(
            serde_json::from_str(&self.body)
                .unwrap_or_else(|_| serde_json::Value::String(self.body.clone())),
        )
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// Trait for performing one network exchange, allowing for mocking
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return whatever the server answered.
    /// Errors mean no response was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Implementation of HttpTransport using reqwest
pub struct ReqwestTransport {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new ReqwestTransport
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport whose requests time out after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method, &request.url);

        // Add headers
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // Send request
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse::new(status, body))
    }
}
