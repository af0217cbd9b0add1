use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{OnFinish, RequestParams};
use crate::config::join_url;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

/// Issues exactly one request per call and knows nothing about tokens
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Perform one network exchange.
    ///
    /// Any non-2xx status or transport failure becomes an [`ApiError`].
    pub async fn call(&self, path: &str, params: RequestParams) -> ApiResult<HttpResponse> {
        let url = self.url(path);
        let method = params.method.clone();

        let mut request = HttpRequest::new(params.method, &url)
            .with_header("Accept", "application/json");
        for (key, value) in params.headers {
            request = request.with_header(key, value);
        }
        if let Some(data) = params.data {
            request = request
                .with_header("Content-Type", "application/json")
                .with_body(data.to_string());
        }

        debug!(%method, path = %path, "Sending request");

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(%method, path = %path, error = %e, "Request failed without a response");
            ApiError::transport(e.to_string())
        })?;

        if response.is_success() {
            debug!(%method, path = %path, status = response.status(), "Request succeeded");
            Ok(response)
        } else {
            debug!(%method, path = %path, status = response.status(), "Request rejected");
            Err(ApiError::from_status(response.status(), response.json_value()))
        }
    }

    /// [`ApiClient::call`] with a finalizer that runs once the exchange is over
    pub async fn call_with_finally<F>(
        &self,
        path: &str,
        params: RequestParams,
        finally: F,
    ) -> ApiResult<HttpResponse>
    where
        F: FnOnce(),
    {
        let _finish = OnFinish::new(finally);
        self.call(path, params).await
    }

    /// [`ApiClient::call`] decoding the body as JSON
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: RequestParams,
    ) -> ApiResult<T> {
        let response = self.call(path, params).await?;
        decode_body(&response)
    }
}

/// Decode a 2xx body; an empty body decodes from JSON `null`
pub(crate) fn decode_body<T: DeserializeOwned>(response: &HttpResponse) -> ApiResult<T> {
    let value = response.json_value().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        ApiError::decode(format!(
            "unexpected body for status {}: {}",
            response.status(),
            e
        ))
    })
}
