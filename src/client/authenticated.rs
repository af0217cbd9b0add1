use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::unauthenticated::decode_body;
use crate::client::{ApiClient, Attempt, AuthParams, OnFinish, RefreshCoordinator, RequestParams};
use crate::error::{ApiError, ApiResult};
use crate::http::HttpResponse;
use crate::session::{Session, TokenStore};

/// Token-aware client.
///
/// Attaches the bearer token from the [`TokenStore`], and on a 401 asks the
/// [`RefreshCoordinator`] for a new token and re-sends the original request
/// once.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: ApiClient,
    store: TokenStore,
    refresher: RefreshCoordinator,
}

impl AuthenticatedClient {
    pub fn new(client: ApiClient, store: TokenStore, refresher: RefreshCoordinator) -> Self {
        Self {
            client,
            store,
            refresher,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Perform an authenticated call.
    ///
    /// Without an access token (and outside the refresh/logout exchange) this
    /// fails with [`ApiError::Unauthenticated`] before touching the network.
    pub async fn call(
        &self,
        path: &str,
        params: impl Into<AuthParams>,
    ) -> ApiResult<HttpResponse> {
        let params = params.into();
        let session = self.store.get();

        let access = match (session.access.clone(), params.inject_refresh) {
            (None, false) => {
                debug!(path = %path, "No access token, not sending request");
                return Err(ApiError::Unauthenticated);
            }
            (access, _) => access,
        };

        let request = authorize(&params, access.as_deref(), &session)?;
        match self.dispatch(path, request, Attempt::First).await {
            Err(ApiError::AuthorizationExpired { .. }) if !params.inject_refresh => {
                info!(path = %path, "Access token rejected, refreshing");
                let fresh = self.refresher.refresh(access.as_deref()).await?;
                self.retry(path, &params, &fresh).await
            }
            outcome => outcome,
        }
    }

    /// [`AuthenticatedClient::call`] with a finalizer that runs exactly once
    /// after the whole sequence, retry included
    pub async fn call_with_finally<F>(
        &self,
        path: &str,
        params: impl Into<AuthParams>,
        finally: F,
    ) -> ApiResult<HttpResponse>
    where
        F: FnOnce(),
    {
        let _finish = OnFinish::new(finally);
        self.call(path, params).await
    }

    /// [`AuthenticatedClient::call`] decoding the body as JSON
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: impl Into<AuthParams>,
    ) -> ApiResult<T> {
        let response = self.call(path, params).await?;
        decode_body(&response)
    }

    /// Re-send the original request with the refreshed token. A second 401
    /// is final: the session is cleared and the caller sees `SessionExpired`.
    async fn retry(
        &self,
        path: &str,
        params: &AuthParams,
        fresh: &str,
    ) -> ApiResult<HttpResponse> {
        let Some(attempt) = Attempt::First.next() else {
            return Err(ApiError::SessionExpired);
        };

        let request = authorize(params, Some(fresh), &self.store.get())?;
        match self.dispatch(path, request, attempt).await {
            Err(ApiError::AuthorizationExpired { .. }) => {
                warn!(path = %path, "Refreshed token rejected, ending session");
                let still_current = |s: &Session| s.access.as_deref() == Some(fresh);
                if let Err(e) = self.store.clear_if(still_current).await {
                    warn!(error = %e, "Failed to remove stored session");
                }
                Err(ApiError::SessionExpired)
            }
            outcome => outcome,
        }
    }

    async fn dispatch(
        &self,
        path: &str,
        request: RequestParams,
        attempt: Attempt,
    ) -> ApiResult<HttpResponse> {
        debug!(path = %path, %attempt, "Dispatching authenticated request");
        self.client.call(path, request).await
    }
}

/// Build the outgoing request: bearer header from `access`, and for the
/// refresh/logout exchange the refresh token merged into the JSON body
fn authorize(
    params: &AuthParams,
    access: Option<&str>,
    session: &Session,
) -> ApiResult<RequestParams> {
    let mut request = params.request.clone();

    if let Some(access) = access {
        request
            .headers
            .insert("Authorization".to_string(), format!("Bearer {}", access));
    }

    if params.inject_refresh {
        let refresh = session.refresh.clone().ok_or(ApiError::Unauthenticated)?;
        let mut data = match request.data.take() {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => serde_json::Map::new(),
            Some(other) => {
                return Err(ApiError::Config(format!(
                    "refresh token can only be merged into a JSON object body, got {}",
                    other
                )))
            }
        };
        data.insert("refresh".to_string(), Value::String(refresh));
        request.data = Some(Value::Object(data));
    }

    Ok(request)
}
