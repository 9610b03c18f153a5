use std::sync::atomic::{AtomicBool, Ordering};

/// Wrapper for data exposed through a stream that must be consumed once.
///
/// Several subscribers may receive the same `Arc<Event<_>>`; only the first
/// call to [`Event::take`] gets the content.
#[derive(Debug)]
pub struct Event<T> {
    content: T,
    handled: AtomicBool,
}

impl<T> Event<T> {
    pub fn new(content: T) -> Self {
        Self {
            content,
            handled: AtomicBool::new(false),
        }
    }

    /// Returns the content unless someone already handled it.
    pub fn take(&self) -> Option<&T> {
        if self.handled.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(&self.content)
        }
    }

    /// Returns the content even if it was handled already.
    pub fn peek(&self) -> &T {
        &self.content
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }
}
