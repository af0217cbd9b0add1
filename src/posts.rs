//! Typed access to the post resource. Every call goes through
//! [`AuthenticatedClient`], so expired tokens are refreshed transparently.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{AuthenticatedClient, RequestParams};
use crate::config::join_url;
use crate::error::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: u64,
    /// Username of the author
    pub author: String,
    pub content: String,
    /// Hidden posts are only listed for their author
    pub hidden: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One page of a post listing
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostPage {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Post>,
}

/// Body for creating or replacing a post
#[derive(Debug, Clone, Serialize)]
pub struct PostInput {
    pub content: String,
    pub hidden: bool,
}

#[derive(Clone)]
pub struct Posts {
    auth: AuthenticatedClient,
    /// Collection path, e.g. `/api/post/`
    base_path: String,
    public_path: String,
}

impl Posts {
    pub fn new(
        auth: AuthenticatedClient,
        base_path: impl Into<String>,
        public_path: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            base_path: base_path.into(),
            public_path: public_path.into(),
        }
    }

    fn item_path(&self, id: u64) -> String {
        join_url(&self.base_path, &format!("{}/", id))
    }

    /// Posts visible to the current user, newest first
    pub async fn list(&self) -> ApiResult<PostPage> {
        self.auth.call_json(&self.base_path, RequestParams::get()).await
    }

    /// Non-hidden posts of every user
    pub async fn list_public(&self) -> ApiResult<PostPage> {
        self.auth
            .call_json(&self.public_path, RequestParams::get())
            .await
    }

    /// Posts written by one user
    pub async fn list_for_user(&self, user_id: u64) -> ApiResult<PostPage> {
        let path = join_url(&self.base_path, &format!("user/{}", user_id));
        self.auth.call_json(&path, RequestParams::get()).await
    }

    pub async fn get(&self, id: u64) -> ApiResult<Post> {
        self.auth
            .call_json(&self.item_path(id), RequestParams::get())
            .await
    }

    pub async fn create(&self, input: &PostInput) -> ApiResult<Post> {
        let params = RequestParams::post().with_json(input)?;
        let post: Post = self.auth.call_json(&self.base_path, params).await?;
        debug!(id = post.id, "Post created");
        Ok(post)
    }

    /// Replace content and visibility of a post
    pub async fn update(&self, id: u64, input: &PostInput) -> ApiResult<Post> {
        let params = RequestParams::put().with_json(input)?;
        self.auth.call_json(&self.item_path(id), params).await
    }

    pub async fn delete(&self, id: u64) -> ApiResult<()> {
        self.auth
            .call(&self.item_path(id), RequestParams::delete())
            .await?;
        debug!(id, "Post deleted");
        Ok(())
    }
}
