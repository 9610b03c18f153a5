pub mod digest;
pub mod feed;
pub mod refresh;
