use anyhow::anyhow;
use prometheus::{Registry, TextEncoder};

use crate::Result;

/// Namespace shared by every counter the sniper exports.
pub const METRICS_PREFIX: &str = "snipe";

/// Prefixed registry that the chain, watcher and loop metrics register into.
pub struct Metrics {
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some(METRICS_PREFIX.to_string()), None)
            .map_err(|err| anyhow!("metrics registry: {err}"))?;
        Ok(Self { registry })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of everything registered so far.
    pub fn gather(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntCounter;

    #[test]
    fn registered_counters_carry_the_prefix() {
        let metrics = Metrics::new().unwrap();
        let counter = IntCounter::new("pairs_seen_total", "pairs seen").unwrap();
        metrics.registry().register(Box::new(counter.clone())).unwrap();
        counter.inc_by(3);

        assert!(metrics.gather().contains("snipe_pairs_seen_total 3"));
    }
}
