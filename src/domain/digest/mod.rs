pub mod merger;

pub use merger::{merge_snapshots, AggregatingStateMerger, MergedState, PartialState};
