use serde::Serialize;

/// One-shot notification from a feed repository to its UI.
///
/// Sent on the communication channel, never folded into `FeedState`, so the
/// last good items stay on screen when something goes wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Communication {
    #[error("remote request failed: {0}")]
    RemoteRequestFailure(String),

    #[error("like action failed: {0}")]
    LikeActionFailure(String),
}

/// Failures raised by the repository handle itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedRepositoryError {
    #[error("feed repository for {0} has been stopped")]
    Stopped(String),
}
