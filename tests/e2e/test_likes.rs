use crate::e2e::helpers;

use helpers::assertions::communication_kinds;
use helpers::TestContext;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_like_a_post_and_store_server_counters(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx
        .client
        .post(
            "/api/feeds/discover/likes",
            &json!({ "site_id": 10, "post_id": 2, "like": true }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["outcome"], json!({ "outcome": "success" }));
    assert_eq!(body["item"]["payload"]["is_liked"], true);
    assert_eq!(body["item"]["payload"]["like_count"], 5);
    assert_eq!(ctx.api.like_requests(), 1);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_not_call_the_api_when_already_in_requested_state(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx
        .client
        .post(
            "/api/feeds/discover/likes",
            &json!({ "site_id": 10, "post_id": 1, "like": false }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(
        response.body.as_ref().unwrap()["outcome"],
        json!({ "outcome": "unchanged" })
    );
    assert_eq!(ctx.api.like_requests(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_revert_and_report_a_failed_like(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();
    ctx.api.fail_likes(true);

    let response = ctx
        .client
        .post(
            "/api/feeds/tag:rust/likes",
            &json!({ "site_id": 20, "post_id": 3, "like": true }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["outcome"]["outcome"], "failure");
    assert_eq!(body["item"]["payload"]["is_liked"], false);
    assert_eq!(body["item"]["payload"]["like_count"], 4);

    let feed = ctx.client.get("/api/feeds/tag:rust").await.unwrap();
    assert_eq!(
        communication_kinds(feed.body.as_ref().unwrap()),
        vec!["like_action_failure"]
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_posts_outside_the_feed(ctx: &TestContext) {
    ctx.wait_until_loaded().await.unwrap();

    let response = ctx
        .client
        .post(
            "/api/feeds/discover/likes",
            &json!({ "site_id": 20, "post_id": 3, "like": true }),
        )
        .await
        .unwrap();

    response
        .assert_status(StatusCode::NOT_FOUND)
        .assert_error_message("is not in feed discover");
}
