use serde_json::Value;

/// Post ids of the `items` array, in order.
pub fn post_ids(body: &Value) -> Vec<i64> {
    body.get("items")
        .and_then(|v| v.as_array())
        .expect("Missing items array")
        .iter()
        .map(|item| {
            item.pointer("/id/post_id")
                .and_then(|v| v.as_i64())
                .expect("Missing item id")
        })
        .collect()
}

pub fn assert_feed_response(feed: &Value, expected_key: &str, expected_origin: &str) {
    assert_eq!(feed.get("key").and_then(|v| v.as_str()), Some(expected_key));
    assert_eq!(
        feed.get("origin").and_then(|v| v.as_str()),
        Some(expected_origin)
    );
    assert!(feed.get("items").and_then(|v| v.as_array()).is_some());

    for item in feed["items"].as_array().into_iter().flatten() {
        let payload = item.get("payload").expect("Missing payload");
        assert!(payload.get("title").and_then(|v| v.as_str()).is_some());
        assert!(payload.get("url").and_then(|v| v.as_str()).is_some());
        assert!(payload.get("like_count").and_then(|v| v.as_i64()).is_some());
        assert!(payload.get("is_liked").and_then(|v| v.as_bool()).is_some());
    }
}

/// Communications of a feed detail response.
pub fn communication_kinds(feed: &Value) -> Vec<String> {
    feed.get("communications")
        .and_then(|v| v.as_array())
        .expect("Missing communications array")
        .iter()
        .filter_map(|c| c.get("kind").and_then(|k| k.as_str()).map(str::to_string))
        .collect()
}
