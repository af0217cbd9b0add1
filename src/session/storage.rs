use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::session::{Session, UserIdentity};

/// Version of the persisted record layout
pub const SESSION_RECORD_VERSION: u32 = 1;

/// The durable form of a session: one record holding all three fields so a
/// reload can never observe a half-written session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedSession {
    pub version: u32,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<UserIdentity>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn from_session(session: &Session) -> Self {
        Self {
            version: SESSION_RECORD_VERSION,
            access: session.access.clone(),
            refresh: session.refresh.clone(),
            user: session.user.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Rebuild a session from whatever subset of fields was stored.
    /// A cached user without an access token is dropped.
    pub fn into_session(self) -> Session {
        let user = if self.access.is_some() { self.user } else { None };
        Session {
            access: self.access,
            refresh: self.refresh,
            user,
        }
    }
}

/// Durable client-local storage for the session record
#[async_trait::async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load the stored record, if any
    async fn load(&self) -> ApiResult<Option<PersistedSession>>;

    /// Replace the stored record
    async fn save(&self, record: &PersistedSession) -> ApiResult<()>;

    /// Remove the stored record
    async fn remove(&self) -> ApiResult<()>;
}

/// JSON file backend
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl SessionStorage for FileStorage {
    async fn load(&self) -> ApiResult<Option<PersistedSession>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = %self.path.display(), "No stored session");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).await.map_err(|e| {
            ApiError::storage(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(record) if record.version == SESSION_RECORD_VERSION => Ok(Some(record)),
            Ok(record) => {
                warn!(
                    path = %self.path.display(),
                    version = record.version,
                    "Ignoring session record with unknown version"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable session record"
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, record: &PersistedSession) -> ApiResult<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                ApiError::storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let raw = serde_json::to_string_pretty(record)
            .map_err(|e| ApiError::storage(format!("failed to serialize session: {}", e)))?;

        // Write then rename so readers see either the old or the new record
        let temp = self.temp_path();
        fs::write(&temp, raw).await.map_err(|e| {
            ApiError::storage(format!("failed to write {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).await.map_err(|e| {
            ApiError::storage(format!("failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    async fn remove(&self) -> ApiResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Stored session removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::storage(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-process backend. Clones share the same record, which lets tests
/// simulate a restart by building a second store over a clone.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    record: Arc<RwLock<Option<PersistedSession>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already stored
    pub fn with_record(record: PersistedSession) -> Self {
        Self {
            record: Arc::new(RwLock::new(Some(record))),
        }
    }

    /// Current stored record
    pub async fn snapshot(&self) -> Option<PersistedSession> {
        self.record.read().await.clone()
    }
}

#[async_trait::async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self) -> ApiResult<Option<PersistedSession>> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &PersistedSession) -> ApiResult<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn remove(&self) -> ApiResult<()> {
        *self.record.write().await = None;
        Ok(())
    }
}
