//! Account endpoints: login, registration, identity and logout.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, AuthParams, AuthenticatedClient, RequestParams};
use crate::config::Endpoints;
use crate::error::{ApiError, ApiResult};
use crate::session::{SessionPhase, TokenStore, UserIdentity};

/// Username/password pair sent to the login endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Token pair returned by the login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Sign-up form
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Must repeat `password`; the server rejects mismatches
    pub password2: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// User created by the register endpoint
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegisteredUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// What [`Accounts::logout`] ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum LogoutOutcome {
    /// The server accepted the logout
    Revoked,
    /// No refresh token was held, nothing was sent
    LocalOnly,
    /// The server call failed; the local session was cleared anyway
    ServerFailed(ApiError),
}

#[derive(Clone)]
pub struct Accounts {
    client: ApiClient,
    auth: AuthenticatedClient,
    store: TokenStore,
    endpoints: Endpoints,
}

impl Accounts {
    pub fn new(
        client: ApiClient,
        auth: AuthenticatedClient,
        store: TokenStore,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            client,
            auth,
            store,
            endpoints,
        }
    }

    /// Exchange credentials for a token pair and start a new session.
    ///
    /// Bad credentials come back as a 401 from the login endpoint; that is
    /// surfaced as-is and never triggers a refresh.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<()> {
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };

        self.store.mark_phase(SessionPhase::Authenticating);
        let params = RequestParams::post().with_json(&credentials)?;
        let tokens = match self
            .client
            .call_json::<TokenPair>(&self.endpoints.login, params)
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(username = %username, error = %e, "Login failed");
                self.store.settle_phase();
                return Err(e);
            }
        };

        if let Err(e) = self.store.start(tokens.access, tokens.refresh).await {
            self.store.settle_phase();
            return Err(e);
        }
        info!(username = %username, "Logged in");
        Ok(())
    }

    /// Create an account. Field-level validation errors are returned
    /// untouched in [`ApiError::Validation`].
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisteredUser> {
        let params = RequestParams::post().with_json(request)?;
        let user = self
            .client
            .call_json::<RegisteredUser>(&self.endpoints.register, params)
            .await?;
        info!(username = %user.username, "Account registered");
        Ok(user)
    }

    /// Create an account and sign in with the same credentials
    pub async fn register_and_login(
        &self,
        request: &RegisterRequest,
    ) -> ApiResult<RegisteredUser> {
        let user = self.register(request).await?;
        if let Err(e) = self.login(&request.username, &request.password).await {
            warn!(username = %request.username, error = %e, "Login after sign-up failed");
            return Err(e);
        }
        Ok(user)
    }

    /// Fetch the identity of the current user and cache it.
    ///
    /// The identity is only cached if the login that requested it is still
    /// current when the response arrives. A refresh in between does not
    /// count as a new login.
    pub async fn fetch_user(&self) -> ApiResult<UserIdentity> {
        let generation = self.store.generation();
        let user: UserIdentity = self
            .auth
            .call_json(&self.endpoints.user, RequestParams::get())
            .await?;

        if !self.store.set_user_if_current(generation, user.clone()).await? {
            debug!(username = %user.username, "Identity not cached, session changed meanwhile");
        }
        Ok(user)
    }

    /// Fill in the cached identity when tokens are present without one,
    /// as after a cold start from a partially stored session
    pub async fn ensure_user(&self) -> ApiResult<Option<UserIdentity>> {
        let session = self.store.get();
        if session.access.is_none() {
            return Ok(None);
        }
        if let Some(user) = session.user {
            return Ok(Some(user));
        }
        debug!("Access token without cached identity, fetching it");
        self.fetch_user().await.map(Some)
    }

    /// End the session.
    ///
    /// Without a refresh token nothing is sent. Otherwise the logout endpoint
    /// is called once with the refresh token, and the local session is
    /// cleared whatever the server answers.
    pub async fn logout(&self) -> ApiResult<LogoutOutcome> {
        if self.store.get().refresh.is_none() {
            debug!("No refresh token held, clearing local session only");
            self.store.clear().await?;
            return Ok(LogoutOutcome::LocalOnly);
        }

        let params = AuthParams::new(RequestParams::post()).inject_refresh();
        let outcome = match self.auth.call(&self.endpoints.logout, params).await {
            Ok(_) => LogoutOutcome::Revoked,
            Err(e) => {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
                LogoutOutcome::ServerFailed(e)
            }
        };

        self.store.clear().await?;
        info!("Logged out");
        Ok(outcome)
    }
}
