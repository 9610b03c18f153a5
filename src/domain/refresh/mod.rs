pub mod policy;
pub mod scheduler;

pub use policy::{
    Connectivity, ConnectivityMonitor, StalenessPolicy, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_MAX_AGE_MINUTES, DEFAULT_RETRY_AFTER_SECONDS,
};
pub use scheduler::{BackgroundRefresher, RefresherHandle};
