//! Session-aware client for the Postboard API.
//!
//! The access/refresh token pair lives in a [`TokenStore`]; the
//! [`AuthenticatedClient`] attaches the access token to every call and,
//! when the server answers 401, refreshes it through the
//! [`RefreshCoordinator`] (one exchange no matter how many calls are waiting)
//! before re-sending the original request once.

pub mod account;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod posts;
pub mod session;

// Re-export core components
pub use crate::account::{Accounts, LogoutOutcome, RegisterRequest, RegisteredUser};
pub use crate::client::{
    ApiClient, AuthParams, AuthenticatedClient, RefreshCoordinator, RequestParams,
};
pub use crate::config::{ClientConfig, Endpoints};
pub use crate::context::ApiContext;
pub use crate::error::{ApiError, ApiResult, ErrorKind};
pub use crate::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use crate::posts::{Post, PostInput, PostPage, Posts};
pub use crate::session::{
    FileStorage, MemoryStorage, Session, SessionPhase, SessionStorage, SessionView, TokenStore,
    UserIdentity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
