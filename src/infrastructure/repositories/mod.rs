pub mod memory_feed_store;
pub mod sqlite_feed_store;

pub use memory_feed_store::MemoryFeedStore;
pub use sqlite_feed_store::SqliteFeedStore;
