use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use super::fixtures::FakePost;

/// In-process stand-in for the WordPress.com REST API.
#[derive(Clone)]
pub struct FakeWpCom {
    pub base_url: String,
    state: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    posts: Mutex<HashMap<String, Vec<FakePost>>>,
    fail_posts: AtomicBool,
    fail_likes: AtomicBool,
    post_requests: AtomicUsize,
    like_requests: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct PostsParams {
    number: Option<usize>,
    after: Option<DateTime<Utc>>,
}

impl FakeWpCom {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());

        let app = Router::new()
            .route("/read/tags/:slug/posts", get(tag_posts))
            .route("/read/sites/:site_id/posts", get(site_posts))
            .route("/read/following", get(following_posts))
            .route("/sites/:site_id/posts/:post_id/likes/new", post(like))
            .route("/sites/:site_id/posts/:post_id/likes/mine/delete", post(unlike))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake API listener");
        let addr = listener.local_addr().expect("Failed to get fake API addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Sets the page returned for an endpoint path such as `read/tags/rust/posts`.
    pub fn set_posts(&self, path: &str, posts: Vec<FakePost>) {
        self.state.posts.lock().insert(path.to_string(), posts);
    }

    /// Puts a post in front of the page for `path`.
    pub fn publish(&self, path: &str, post: FakePost) {
        self.state
            .posts
            .lock()
            .entry(path.to_string())
            .or_default()
            .insert(0, post);
    }

    pub fn fail_posts(&self, fail: bool) {
        self.state.fail_posts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_likes(&self, fail: bool) {
        self.state.fail_likes.store(fail, Ordering::SeqCst);
    }

    pub fn post_requests(&self) -> usize {
        self.state.post_requests.load(Ordering::SeqCst)
    }

    pub fn like_requests(&self) -> usize {
        self.state.like_requests.load(Ordering::SeqCst)
    }
}

fn page(state: &FakeState, path: String, params: PostsParams) -> Response {
    state.post_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_posts.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "unavailable", "message": "Try again later" })),
        )
            .into_response();
    }

    let posts = state.posts.lock().get(&path).cloned().unwrap_or_default();
    let posts: Vec<_> = posts
        .into_iter()
        .filter(|p| params.after.map_or(true, |after| p.date > after))
        .take(params.number.unwrap_or(20))
        .map(|p| p.to_json())
        .collect();

    Json(json!({ "found": posts.len(), "posts": posts })).into_response()
}

async fn tag_posts(
    State(state): State<Arc<FakeState>>,
    Path(slug): Path<String>,
    Query(params): Query<PostsParams>,
) -> Response {
    page(&state, format!("read/tags/{}/posts", slug), params)
}

async fn site_posts(
    State(state): State<Arc<FakeState>>,
    Path(site_id): Path<i64>,
    Query(params): Query<PostsParams>,
) -> Response {
    page(&state, format!("read/sites/{}/posts", site_id), params)
}

async fn following_posts(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<PostsParams>,
) -> Response {
    page(&state, "read/following".to_string(), params)
}

async fn like(State(state): State<Arc<FakeState>>, Path(ids): Path<(i64, i64)>) -> Response {
    set_like(&state, ids, true)
}

async fn unlike(State(state): State<Arc<FakeState>>, Path(ids): Path<(i64, i64)>) -> Response {
    set_like(&state, ids, false)
}

fn set_like(state: &FakeState, (site_id, post_id): (i64, i64), liked: bool) -> Response {
    state.like_requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_likes.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "like_failed" })),
        )
            .into_response();
    }

    let mut like_count = 0;
    for post in state
        .posts
        .lock()
        .values_mut()
        .flatten()
        .filter(|p| p.site_id == site_id && p.id == post_id)
    {
        if post.i_like != liked {
            post.i_like = liked;
            post.like_count = (post.like_count + if liked { 1 } else { -1 }).max(0);
        }
        like_count = post.like_count;
    }

    Json(json!({ "success": true, "i_like": liked, "like_count": like_count })).into_response()
}
