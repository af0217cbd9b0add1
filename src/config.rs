use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};

// Default configuration values
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_SESSION_FILE: &str = "postboard.session.json";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API server, without a trailing slash
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Where the session record is persisted
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Endpoint paths
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Paths of the endpoints the client talks to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub refresh: String,
    pub register: String,
    pub user: String,
    pub logout: String,
    pub posts: String,
    /// Feed of every non-hidden post
    pub public_posts: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/account/token/".to_string(),
            refresh: "/api/account/token/refresh/".to_string(),
            register: "/api/account/register/".to_string(),
            user: "/api/account/user/".to_string(),
            logout: "/api/account/logout/".to_string(),
            posts: "/api/post/".to_string(),
            public_posts: "/api/post/public".to_string(),
        }
    }
}

// Default functions
fn default_api_url() -> String {
    std::env::var("POSTBOARD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

fn default_session_file() -> PathBuf {
    std::env::var("POSTBOARD_SESSION_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE))
}

fn default_timeout() -> u64 {
    std::env::var("POSTBOARD_TIMEOUT_SECS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            session_file: default_session_file(),
            request_timeout_secs: default_timeout(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url`, everything else defaulted
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file, falling back to defaults when
    /// no path is given or the file does not exist
    pub async fn load(path: Option<&Path>) -> ApiResult<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path).await.map_err(|e| {
                    ApiError::Config(format!("failed to read {}: {}", path.display(), e))
                })?;
                let config: ClientConfig = serde_json::from_str(&raw).map_err(|e| {
                    ApiError::Config(format!("failed to parse {}: {}", path.display(), e))
                })?;
                debug!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                info!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> ApiResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ApiError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join the base URL and an endpoint path
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
