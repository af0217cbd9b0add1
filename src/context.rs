use std::sync::Arc;

use tracing::info;

use crate::account::Accounts;
use crate::client::{ApiClient, AuthenticatedClient, RefreshCoordinator};
use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::posts::Posts;
use crate::session::{FileStorage, SessionStorage, SessionView, TokenStore};

/// Everything a caller needs, wired once and shared by reference
#[derive(Clone)]
pub struct ApiContext {
    pub config: ClientConfig,
    pub store: TokenStore,
    pub session: SessionView,
    pub client: ApiClient,
    pub auth: AuthenticatedClient,
    pub accounts: Accounts,
    pub posts: Posts,
}

impl ApiContext {
    /// Build the context over reqwest and the configured session file
    pub async fn from_config(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::with_timeout(config.request_timeout())
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {}", e)))?;
        let storage = FileStorage::new(config.session_file.clone());
        info!(
            base_url = %config.base_url,
            session_file = %config.session_file.display(),
            "Creating API context"
        );
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(storage)).await)
    }

    /// Build the context over any transport and storage
    pub async fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let store = TokenStore::hydrate(storage).await;
        let client = ApiClient::new(config.base_url.clone(), transport);
        let refresher = RefreshCoordinator::new(
            client.clone(),
            store.clone(),
            config.endpoints.refresh.clone(),
        );
        let auth = AuthenticatedClient::new(client.clone(), store.clone(), refresher);
        let accounts = Accounts::new(
            client.clone(),
            auth.clone(),
            store.clone(),
            config.endpoints.clone(),
        );
        let posts = Posts::new(
            auth.clone(),
            config.endpoints.posts.clone(),
            config.endpoints.public_posts.clone(),
        );

        Self {
            session: SessionView::new(store.clone()),
            config,
            store,
            client,
            auth,
            accounts,
            posts,
        }
    }
}
