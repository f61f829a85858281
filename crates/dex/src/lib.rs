pub mod abi;
pub mod decoder;
pub mod metrics;
pub mod watcher;

pub use decoder::decode_raw_event;
pub use metrics::WatcherMetrics;
pub use watcher::{PairWatcher, PollOutcome, WatcherSettings, WatcherState};

#[cfg(any(test, feature = "testing"))]
pub use decoder::pair_created_log;
