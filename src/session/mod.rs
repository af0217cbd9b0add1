pub mod storage;
pub mod store;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use storage::{FileStorage, MemoryStorage, PersistedSession, SessionStorage};
pub use store::TokenStore;

/// Cached projection of the authenticated principal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Snapshot of the credential pair and cached identity.
///
/// `user` is only ever present together with `access`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Short-lived bearer credential
    pub access: Option<String>,
    /// Longer-lived credential used to mint new access tokens
    pub refresh: Option<String>,
    pub user: Option<UserIdentity>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && self.user.is_none()
    }

    pub fn has_access(&self) -> bool {
        self.access.is_some()
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No credentials; initial state and the state after logout or a failed refresh
    Anonymous,
    /// Login exchange in progress
    Authenticating,
    /// Credentials present
    Authenticated,
    /// A refresh exchange is outstanding
    Refreshing,
}

/// Read-only view over the token store for UI collaborators
#[derive(Clone)]
pub struct SessionView {
    store: TokenStore,
}

impl SessionView {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    /// Whether a user is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        self.store.get().has_access()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.store.get().user
    }

    pub fn phase(&self) -> SessionPhase {
        self.store.phase()
    }

    pub fn snapshot(&self) -> Session {
        self.store.get()
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }
}
