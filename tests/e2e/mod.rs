// End-to-end tests for the feedsync HTTP API.
//
// Each test gets its own application wired against an in-memory SQLite cache
// and its own fake WordPress.com API served by axum on a random port, so
// tests run in parallel without sharing state.

mod helpers;
mod test_feeds;
mod test_health;
mod test_likes;
