use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::ApiResult;
use crate::session::storage::{PersistedSession, SessionStorage};
use crate::session::{Session, SessionPhase, UserIdentity};

struct Inner {
    /// Latest snapshot, readable without waiting
    session: watch::Sender<Session>,
    phase: watch::Sender<SessionPhase>,
    /// Durable backend
    storage: Arc<dyn SessionStorage>,
    /// Serializes mutations so storage and memory never diverge
    write_lock: Mutex<()>,
    /// Bumped when a login starts a session or the session is cleared.
    /// A refresh keeps it.
    generation: AtomicU64,
}

/// Single owner of the access token, refresh token and cached identity.
///
/// Every mutation is written through to [`SessionStorage`] before it becomes
/// visible in memory. Cloning is cheap and all clones share the same state.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

impl TokenStore {
    /// Create an empty store over `storage`, ignoring anything already stored
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_session(storage, Session::default())
    }

    fn with_session(storage: Arc<dyn SessionStorage>, session: Session) -> Self {
        let phase = phase_for(&session);
        Self {
            inner: Arc::new(Inner {
                session: watch::Sender::new(session),
                phase: watch::Sender::new(phase),
                storage,
                write_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Create a store hydrated from whatever subset of the session is stored
    pub async fn hydrate(storage: Arc<dyn SessionStorage>) -> Self {
        let session = match storage.load().await {
            Ok(Some(record)) => record.into_session(),
            Ok(None) => Session::default(),
            Err(e) => {
                error!(error = %e, "Failed to load stored session, starting anonymous");
                Session::default()
            }
        };

        info!(
            has_access = session.access.is_some(),
            has_refresh = session.refresh.is_some(),
            has_user = session.user.is_some(),
            "Session hydrated"
        );
        Self::with_session(storage, session)
    }

    /// Current snapshot
    pub fn get(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Identifies the current login. Work started under one generation must
    /// not write into a later one.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Receiver for phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Update both tokens together.
    ///
    /// The cached identity survives a token replacement and is dropped when
    /// the access token goes away.
    pub async fn set(&self, access: Option<String>, refresh: Option<String>) -> ApiResult<()> {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.get();
        let user = if access.is_some() { current.user } else { None };
        self.commit(Session {
            access,
            refresh,
            user,
        })
        .await
    }

    /// Replace the whole session with a freshly issued credential pair,
    /// dropping any identity cached for a previous login
    pub async fn start(&self, access: String, refresh: String) -> ApiResult<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.commit(Session {
            access: Some(access),
            refresh: Some(refresh),
            user: None,
        })
        .await?;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Replace the token pair only if the refresh token is still `expected`.
    ///
    /// Returns `false` without touching anything when the session was
    /// cleared or replaced by another login in the meantime.
    pub async fn replace_if_refresh(
        &self,
        expected: &str,
        access: String,
        refresh: String,
    ) -> ApiResult<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.get();
        if current.refresh.as_deref() != Some(expected) {
            debug!("Discarding tokens refreshed for a superseded session");
            return Ok(false);
        }
        self.commit(Session {
            access: Some(access),
            refresh: Some(refresh),
            user: current.user,
        })
        .await?;
        Ok(true)
    }

    /// Update the cached identity.
    ///
    /// Returns `false` without touching anything when asked to cache an
    /// identity while no access token is present.
    pub async fn set_user(&self, identity: Option<UserIdentity>) -> ApiResult<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.get();
        if identity.is_some() && current.access.is_none() {
            debug!("Discarding identity for a cleared session");
            return Ok(false);
        }
        self.commit(Session {
            user: identity,
            ..current
        })
        .await?;
        Ok(true)
    }

    /// Cache `identity` only if the session of `generation` is still current
    /// and holds an access token
    pub async fn set_user_if_current(
        &self,
        generation: u64,
        identity: UserIdentity,
    ) -> ApiResult<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.get();
        if self.generation() != generation || current.access.is_none() {
            debug!("Discarding identity fetched for a superseded session");
            return Ok(false);
        }
        self.commit(Session {
            user: Some(identity),
            ..current
        })
        .await?;
        Ok(true)
    }

    /// Drop tokens and identity in one transition.
    ///
    /// Memory is cleared even if removing the stored record fails; the
    /// storage error is reported afterwards.
    pub async fn clear(&self) -> ApiResult<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.clear_locked().await
    }

    /// Clear only if `still_current` holds for the session at that moment.
    ///
    /// Returns whether the session was cleared. Nothing is cleared, and no
    /// change is published, when the session is already empty.
    pub async fn clear_if<F>(&self, still_current: F) -> ApiResult<bool>
    where
        F: FnOnce(&Session) -> bool,
    {
        let _guard = self.inner.write_lock.lock().await;
        let current = self.get();
        if current.is_empty() || !still_current(&current) {
            debug!("Session changed meanwhile, not clearing it");
            return Ok(false);
        }
        self.clear_locked().await?;
        Ok(true)
    }

    async fn clear_locked(&self) -> ApiResult<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.session.send_replace(Session::default());
        self.inner.phase.send_replace(SessionPhase::Anonymous);
        info!("Session cleared");

        if let Err(e) = self.inner.storage.remove().await {
            error!(error = %e, "Failed to remove stored session");
            return Err(e);
        }
        Ok(())
    }

    /// Record a transient phase (login or refresh in progress)
    pub(crate) fn mark_phase(&self, phase: SessionPhase) {
        debug!(?phase, "Session phase changed");
        self.inner.phase.send_replace(phase);
    }

    /// Return to the phase implied by the stored tokens
    pub(crate) fn settle_phase(&self) {
        let phase = phase_for(&self.get());
        self.mark_phase(phase);
    }

    async fn commit(&self, next: Session) -> ApiResult<()> {
        let result = if next.is_empty() {
            self.inner.storage.remove().await
        } else {
            self.inner
                .storage
                .save(&PersistedSession::from_session(&next))
                .await
        };

        if let Err(e) = result {
            warn!(error = %e, "Session change not persisted, keeping previous state");
            return Err(e);
        }

        self.inner.phase.send_replace(phase_for(&next));
        self.inner.session.send_replace(next);
        Ok(())
    }
}

fn phase_for(session: &Session) -> SessionPhase {
    if session.access.is_some() {
        SessionPhase::Authenticated
    } else {
        SessionPhase::Anonymous
    }
}
