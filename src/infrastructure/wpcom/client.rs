use crate::domain::feed::{FeedKey, ItemId, LikeStatus, PostsApi, PostsQuery, RemotePost};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = "feedsync";

#[derive(Debug, Serialize, Deserialize)]
pub struct WpComPostsResponse {
    #[serde(default)]
    pub posts: Vec<WpComPost>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WpComPost {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "site_ID")]
    pub site_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    pub author: Option<WpComAuthor>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub i_like: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WpComAuthor {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WpComLikeResponse {
    #[serde(default)]
    pub success: bool,
    pub i_like: bool,
    pub like_count: i64,
}

impl From<WpComPost> for RemotePost {
    fn from(post: WpComPost) -> Self {
        Self {
            site_id: post.site_id,
            post_id: post.id,
            title: post.title,
            excerpt_html: post.excerpt,
            url: post.url,
            author: post.author.and_then(|a| a.name),
            published_at: post.date,
            like_count: post.like_count,
            i_like: post.i_like,
        }
    }
}

/// Client for the WordPress.com REST API reader and like endpoints.
pub struct WpComClient {
    base_url: String,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl WpComClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            http_client,
        })
    }

    /// Path of the posts endpoint for a feed
    pub fn posts_path(key: &FeedKey) -> String {
        match key {
            FeedKey::Discover => "read/tags/discover/posts".to_string(),
            FeedKey::Followed => "read/following".to_string(),
            FeedKey::Tag(slug) => format!("read/tags/{}/posts", urlencoding::encode(slug)),
            FeedKey::Site(site_id) => format!("read/sites/{}/posts", site_id),
        }
    }

    fn posts_url(&self, key: &FeedKey, query: &PostsQuery) -> String {
        let mut url = format!(
            "{}/{}?number={}",
            self.base_url,
            Self::posts_path(key),
            query.number
        );
        if let Some(after) = query.after {
            url.push_str("&after=");
            url.push_str(&urlencoding::encode(
                &after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::RemoteApi(format!(
                "{} failed with status {}: {}",
                what,
                status.as_u16(),
                error_text
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::RemoteApi(format!("Failed to parse {} response: {}", what, e)))
    }
}

fn send_error(what: &str, err: reqwest::Error) -> AppError {
    let message = format!("{} failed: {}", what, err);
    if err.is_connect() || err.is_timeout() {
        AppError::Unreachable(message)
    } else {
        AppError::RemoteApi(message)
    }
}

#[async_trait]
impl PostsApi for WpComClient {
    async fn fetch_posts(&self, key: &FeedKey, query: &PostsQuery) -> AppResult<Vec<RemotePost>> {
        let url = self.posts_url(key, query);
        tracing::debug!(feed = %key, url = %url, "Fetching posts");

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| send_error("Posts request", e))?;

        let body: WpComPostsResponse = Self::read_json(response, "Posts request").await?;
        Ok(body.posts.into_iter().map(RemotePost::from).collect())
    }

    async fn set_like(&self, id: ItemId, like: bool) -> AppResult<LikeStatus> {
        if self.access_token.is_none() {
            return Err(AppError::Unauthorized(
                "an access token is required to like posts".to_string(),
            ));
        }

        let action = if like { "new" } else { "mine/delete" };
        let url = format!(
            "{}/sites/{}/posts/{}/likes/{}",
            self.base_url, id.site_id, id.post_id, action
        );

        let response = self
            .authorized(self.http_client.post(&url))
            .send()
            .await
            .map_err(|e| send_error("Like request", e))?;

        let body: WpComLikeResponse = Self::read_json(response, "Like request").await?;
        Ok(LikeStatus {
            i_like: body.i_like,
            like_count: body.like_count,
        })
    }
}
