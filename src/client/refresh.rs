use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{ApiClient, RequestParams};
use crate::error::{ApiError, ApiResult};
use crate::session::{Session, SessionPhase, TokenStore};

/// Body returned by the refresh endpoint
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the server rotates refresh tokens
    #[serde(default)]
    refresh: Option<String>,
}

type RefreshFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

/// The outstanding exchange, tagged so a finished exchange only clears its
/// own marker
struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

/// Performs the refresh exchange, collapsing concurrent demands into a
/// single in-flight request whose outcome every waiter receives
#[derive(Clone)]
pub struct RefreshCoordinator {
    client: ApiClient,
    store: TokenStore,
    refresh_path: String,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    generation: Arc<AtomicU64>,
    /// Number of network exchanges started so far
    exchanges: Arc<AtomicUsize>,
}

impl RefreshCoordinator {
    pub fn new(client: ApiClient, store: TokenStore, refresh_path: impl Into<String>) -> Self {
        Self {
            client,
            store,
            refresh_path: refresh_path.into(),
            in_flight: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            exchanges: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Obtain a new access token.
    ///
    /// `stale_access` is the token the caller saw rejected. If the store
    /// already holds a different one, another caller has refreshed in the
    /// meantime and that token is returned without a network exchange. If an
    /// exchange is outstanding, the caller waits on it instead of starting
    /// another one.
    ///
    /// On failure the session is cleared and every waiter gets
    /// [`ApiError::SessionExpired`].
    pub async fn refresh(&self, stale_access: Option<&str>) -> ApiResult<String> {
        let future = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "Joining outstanding refresh");
                    in_flight.future.clone()
                }
                None => {
                    if let (Some(stale), Some(current)) = (stale_access, self.store.get().access) {
                        if stale != current {
                            debug!("Access token already refreshed, reusing it");
                            return Ok(current);
                        }
                    }

                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.start_exchange(generation);
                    *slot = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    /// Whether an exchange is currently outstanding
    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    /// Number of refresh exchanges started since creation
    pub fn exchanges_started(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    fn start_exchange(&self, generation: u64) -> RefreshFuture {
        let client = self.client.clone();
        let store = self.store.clone();
        let path = self.refresh_path.clone();
        let slot = Arc::clone(&self.in_flight);
        let exchanges = Arc::clone(&self.exchanges);

        // Spawned so the exchange finishes even if every waiter is dropped
        let task = tokio::spawn({
            let store = store.clone();
            let slot = Arc::clone(&slot);
            async move {
                let outcome = exchange(&client, &store, &path, &exchanges).await;

                // Store is updated, now drop the marker before waiters resume
                release_slot(&slot, generation).await;
                outcome
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Refresh task did not complete");
                    release_slot(&slot, generation).await;
                    settle_if_refreshing(&store);
                    Err(ApiError::transport(format!("refresh task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Drop the in-flight marker if it still belongs to `generation`
async fn release_slot(slot: &Mutex<Option<InFlight>>, generation: u64) {
    let mut slot = slot.lock().await;
    if slot.as_ref().map(|f| f.generation) == Some(generation) {
        *slot = None;
    }
}

async fn exchange(
    client: &ApiClient,
    store: &TokenStore,
    path: &str,
    exchanges: &AtomicUsize,
) -> ApiResult<String> {
    let session = store.get();
    let Some(refresh_token) = session.refresh else {
        if session.is_empty() {
            debug!("Session already ended, nothing to refresh");
        } else {
            warn!("No refresh token available, ending session");
            end_session(store, |s| s.refresh.is_none()).await;
        }
        return Err(ApiError::SessionExpired);
    };

    store.mark_phase(SessionPhase::Refreshing);
    exchanges.fetch_add(1, Ordering::SeqCst);
    info!("Refreshing access token");

    let params = RequestParams::post().with_data(json!({ "refresh": refresh_token }));
    match client.call_json::<RefreshResponse>(path, params).await {
        Ok(tokens) => {
            let refresh = tokens.refresh.unwrap_or_else(|| refresh_token.clone());
            match store
                .replace_if_refresh(&refresh_token, tokens.access.clone(), refresh)
                .await
            {
                Ok(true) => {
                    info!("Access token refreshed");
                    Ok(tokens.access)
                }
                Ok(false) => {
                    warn!("Session changed during refresh, discarding refreshed tokens");
                    settle_if_refreshing(store);
                    Err(ApiError::SessionExpired)
                }
                Err(e) => {
                    error!(error = %e, "Failed to store refreshed tokens");
                    store.settle_phase();
                    Err(e)
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, ending session");
            end_session(store, |s| s.refresh.as_deref() == Some(refresh_token.as_str())).await;
            Err(ApiError::SessionExpired)
        }
    }
}

/// Clear the session the refresh was made for, leaving a newer one alone
async fn end_session<F>(store: &TokenStore, still_current: F)
where
    F: FnOnce(&Session) -> bool,
{
    match store.clear_if(still_current).await {
        Ok(true) => {}
        Ok(false) => settle_if_refreshing(store),
        Err(e) => error!(error = %e, "Failed to remove stored session after refresh failure"),
    }
}

fn settle_if_refreshing(store: &TokenStore) {
    if store.phase() == SessionPhase::Refreshing {
        store.settle_phase();
    }
}
