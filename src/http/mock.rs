//! Scripted transport for unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;

use super::{HttpRequest, HttpResponse, HttpTransport};

/// A configured answer, optionally restricted to one bearer token
#[derive(Clone)]
struct MockRoute {
    url: String,
    bearer: Option<String>,
    response: Option<HttpResponse>,
}

/// A mock transport that returns predefined responses and records requests.
///
/// Routes registered with a bearer token only match requests carrying that
/// token and take precedence over token-less routes. Routes can be held
/// behind a gate so several requests are in flight at the same time.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Configured routes, newest last
    routes: Arc<Mutex<Vec<MockRoute>>>,
    /// Record of requests made
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    /// Gates keyed by URL
    gates: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock response for a URL
    pub fn mock_response(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.add_route(url.into(), None, Some(HttpResponse::new(status, body)));
    }

    /// Register a response for a URL that only applies to `Bearer <token>`
    pub fn mock_response_for_token(
        &self,
        url: impl Into<String>,
        token: &str,
        status: u16,
        body: impl Into<String>,
    ) {
        self.add_route(
            url.into(),
            Some(format!("Bearer {}", token)),
            Some(HttpResponse::new(status, body)),
        );
    }

    /// Register a JSON response
    pub fn mock_json<T: serde::Serialize>(
        &self,
        url: impl Into<String>,
        status: u16,
        data: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(data)?;
        self.add_route(url.into(), None, Some(HttpResponse::new(status, body)));
        Ok(())
    }

    /// Mock a successful JSON response (status 200)
    pub fn mock_success_json<T: serde::Serialize>(
        &self,
        url: impl Into<String>,
        data: &T,
    ) -> Result<()> {
        self.mock_json(url, 200, data)
    }

    /// Mock an error response
    pub fn mock_error(&self, url: impl Into<String>, status: u16, message: impl Into<String>) {
        self.mock_response(url, status, message);
    }

    /// Make requests to `url` fail as if the connection dropped
    pub fn mock_transport_failure(&self, url: impl Into<String>) {
        self.add_route(url.into(), None, None);
    }

    /// Hold every request to `url` until [`MockTransport::release`] is called
    pub fn hold(&self, url: impl Into<String>) {
        self.gates
            .lock()
            .unwrap()
            .insert(url.into(), Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held requests to `url` through
    pub fn release(&self, url: &str, count: usize) {
        if let Some(gate) = self.gates.lock().unwrap().get(url) {
            gate.add_permits(count);
        }
    }

    /// Get the list of recorded requests
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests for one URL
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.get_requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }

    /// Number of requests made to one URL
    pub fn count(&self, url: &str) -> usize {
        self.requests_to(url).len()
    }

    /// Wait until at least `count` requests to `url` have arrived
    pub async fn wait_for(&self, url: &str, count: usize) {
        while self.count(url) < count {
            tokio::task::yield_now().await;
        }
    }

    fn add_route(&self, url: String, bearer: Option<String>, response: Option<HttpResponse>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| !(r.url == url && r.bearer == bearer));
        routes.push(MockRoute {
            url,
            bearer,
            response,
        });
    }

    /// Record a request
    fn record_request(&self, request: &HttpRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }

    /// Get mock response for a request
    fn get_response_for(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let routes = self.routes.lock().unwrap();
        let auth = request.authorization();

        let route = routes
            .iter()
            .find(|r| r.url == request.url && r.bearer.is_some() && r.bearer.as_deref() == auth)
            .or_else(|| {
                routes
                    .iter()
                    .find(|r| r.url == request.url && r.bearer.is_none())
            })
            .ok_or_else(|| anyhow!("No mock response configured for URL: {}", request.url))?;

        route
            .response
            .clone()
            .ok_or_else(|| anyhow!("connection reset while requesting {}", request.url))
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        // Record the request
        self.record_request(&request);

        let gate = self.gates.lock().unwrap().get(&request.url).cloned();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }

        // Return the configured response
        self.get_response_for(&request)
    }
}
