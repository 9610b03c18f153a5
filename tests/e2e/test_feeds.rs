use crate::e2e::helpers;

use helpers::assertions::{assert_feed_response, communication_kinds, post_ids};
use helpers::fixtures::FakePost;
use helpers::{TestContext, DISCOVER_PATH};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_merge_feeds_in_configured_order(ctx: &TestContext) {
    let digest = ctx.wait_until_loaded().await.unwrap();

    assert_eq!(digest["feeds"], json!(["discover", "tag:rust"]));
    assert_eq!(post_ids(&digest), vec![2, 1, 3]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_a_single_feed(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx.client.get("/api/feeds/discover").await.unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_feed_response(body, "discover", "remote");
    assert_eq!(post_ids(body), vec![2, 1]);
    assert!(body.get("refreshed_at").is_some());
    assert_eq!(body["communications"], json!([]));

    let first = &body["items"][0]["payload"];
    assert_eq!(first["title"], "Post 2");
    assert_eq!(first["excerpt"], "Excerpt of post 2");
    assert_eq!(first["author"], "Test Author");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_accept_tag_keys_in_any_case(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx.client.get("/api/feeds/tag:Rust").await.unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(post_ids(response.body.as_ref().unwrap()), vec![3]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_malformed_feed_keys(ctx: &TestContext) {
    let response = ctx.client.get("/api/feeds/blog:1").await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("invalid feed key");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unconfigured_feeds(ctx: &TestContext) {
    let response = ctx.client.get("/api/feeds/site:99").await.unwrap();

    response
        .assert_status(StatusCode::NOT_FOUND)
        .assert_error_message("not configured");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fetch_new_posts_on_refresh(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();
    ctx.api.publish(DISCOVER_PATH, FakePost::new(10, 4).titled("Fresh <em>news</em>"));

    let response = ctx.client.post_empty("/api/feeds/discover/refresh").await.unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["outcome"], json!({ "outcome": "new_items", "detail": 1 }));
    assert_eq!(post_ids(&body["feed"]), vec![4, 2, 1]);
    assert_eq!(body["feed"]["items"][0]["payload"]["title"], "Fresh news");

    let digest = ctx
        .eventually("/api/feeds", |b| post_ids(b).len() == 4)
        .await
        .unwrap();
    assert_eq!(post_ids(&digest), vec![4, 2, 1, 3]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_unchanged_refresh(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx.client.post_empty("/api/feeds/tag:rust/refresh").await.unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["outcome"], json!({ "outcome": "unchanged" }));
    assert_eq!(post_ids(&body["feed"]), vec![3]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_keep_posts_and_report_failure_once(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();
    ctx.api.fail_posts(true);

    let response = ctx.client.post_empty("/api/feeds/discover/refresh").await.unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["outcome"]["outcome"], "failed");
    assert_eq!(post_ids(&body["feed"]), vec![2, 1]);

    let feed = ctx.client.get("/api/feeds/discover").await.unwrap();
    let feed = feed.body.as_ref().unwrap();
    assert_eq!(communication_kinds(feed), vec!["remote_request_failure"]);
    assert_eq!(post_ids(feed), vec![2, 1]);

    let again = ctx.client.get("/api/feeds/discover").await.unwrap();
    assert_eq!(communication_kinds(again.body.as_ref().unwrap()), Vec::<String>::new());
}
