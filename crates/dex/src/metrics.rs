use anyhow::Result;
use prometheus::{IntCounterVec, Opts, Registry};
use snipe_core::ChainId;

/// Per-chain watcher counters.
#[derive(Clone)]
pub struct WatcherMetrics {
    pairs_discovered: IntCounterVec,
    pairs_duplicate: IntCounterVec,
    malformed_logs: IntCounterVec,
    poll_errors: IntCounterVec,
}

impl WatcherMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let pairs_discovered = IntCounterVec::new(
            Opts::new("pairs_discovered_total", "New pairs emitted by watchers"),
            &["chain"],
        )?;
        let pairs_duplicate = IntCounterVec::new(
            Opts::new("pairs_duplicate_total", "Pair events discarded as already seen"),
            &["chain"],
        )?;
        let malformed_logs = IntCounterVec::new(
            Opts::new("pair_logs_malformed_total", "Pair events that failed to decode"),
            &["chain"],
        )?;
        let poll_errors = IntCounterVec::new(
            Opts::new("watcher_poll_errors_total", "Failed log polls"),
            &["chain"],
        )?;

        registry.register(Box::new(pairs_discovered.clone()))?;
        registry.register(Box::new(pairs_duplicate.clone()))?;
        registry.register(Box::new(malformed_logs.clone()))?;
        registry.register(Box::new(poll_errors.clone()))?;

        Ok(Self {
            pairs_discovered,
            pairs_duplicate,
            malformed_logs,
            poll_errors,
        })
    }

    pub fn record_poll(&self, chain: ChainId, outcome: &crate::PollOutcome) {
        let label = chain.to_string();
        self.pairs_discovered
            .with_label_values(&[label.as_str()])
            .inc_by(outcome.emitted.len() as u64);
        self.pairs_duplicate
            .with_label_values(&[label.as_str()])
            .inc_by(outcome.duplicates as u64);
        self.malformed_logs
            .with_label_values(&[label.as_str()])
            .inc_by(outcome.malformed as u64);
    }

    pub fn inc_poll_error(&self, chain: ChainId) {
        self.poll_errors
            .with_label_values(&[chain.to_string().as_str()])
            .inc();
    }
}
