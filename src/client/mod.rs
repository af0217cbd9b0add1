//! Request dispatch: the bare client, the refresh coordinator and the
//! token-aware client built on top of both.

pub mod authenticated;
pub mod refresh;
pub mod unauthenticated;

use std::collections::HashMap;
use std::fmt;

use http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiResult;

pub use authenticated::AuthenticatedClient;
pub use refresh::RefreshCoordinator;
pub use unauthenticated::ApiClient;

/// Method, JSON body and extra headers of one call
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub method: Method,
    pub data: Option<Value>,
    pub headers: HashMap<String, String>,
}

impl RequestParams {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            data: None,
            headers: HashMap::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Attach a JSON body
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize `data` as the JSON body
    pub fn with_json<T: Serialize>(self, data: &T) -> ApiResult<Self> {
        Ok(self.with_data(serde_json::to_value(data)?))
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Parameters of an authenticated call
#[derive(Debug, Clone)]
pub struct AuthParams {
    pub request: RequestParams,
    /// Set only when the call is itself the refresh or logout exchange: the
    /// refresh token is sent in the body and a 401 never triggers a refresh
    pub inject_refresh: bool,
}

impl AuthParams {
    pub fn new(request: RequestParams) -> Self {
        Self {
            request,
            inject_refresh: false,
        }
    }

    pub fn inject_refresh(mut self) -> Self {
        self.inject_refresh = true;
        self
    }
}

impl From<RequestParams> for AuthParams {
    fn from(request: RequestParams) -> Self {
        Self::new(request)
    }
}

/// Which dispatch of a request this is. There is no state after `Retry`,
/// so a request can be sent at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

impl Attempt {
    /// The attempt that follows this one, if another is allowed
    pub fn next(self) -> Option<Attempt> {
        match self {
            Attempt::First => Some(Attempt::Retry),
            Attempt::Retry => None,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::First => write!(f, "first"),
            Attempt::Retry => write!(f, "retry"),
        }
    }
}

/// Runs a closure exactly once when dropped, on every exit path including
/// cancellation of the enclosing future
pub struct OnFinish<F: FnOnce()> {
    finalizer: Option<F>,
}

impl<F: FnOnce()> OnFinish<F> {
    pub fn new(finalizer: F) -> Self {
        Self {
            finalizer: Some(finalizer),
        }
    }
}

impl<F: FnOnce()> Drop for OnFinish<F> {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer();
        }
    }
}
