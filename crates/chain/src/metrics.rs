use anyhow::Result;
use prometheus::{IntCounter, IntGauge, Opts, Registry};

#[derive(Clone)]
pub struct ChannelMetrics {
    queue_depth: IntGauge,
    dropped_total: IntCounter,
}

impl ChannelMetrics {
    pub fn new(registry: &Registry, name: &str) -> Result<Self> {
        let queue_depth = IntGauge::with_opts(Opts::new(
            format!("{name}_queue_depth"),
            "Items waiting in the channel",
        ))?;
        let dropped_total = IntCounter::with_opts(Opts::new(
            format!("{name}_dropped_total"),
            "Items rejected because the channel was full",
        ))?;

        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(dropped_total.clone()))?;

        Ok(Self {
            queue_depth,
            dropped_total,
        })
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    pub fn inc_dropped(&self) {
        self.dropped_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::ChannelMetrics;
    use crate::channel::tracked_channel;
    use prometheus::Registry;

    #[tokio::test]
    async fn depth_follows_channel() {
        let registry = Registry::new();
        let metrics = ChannelMetrics::new(&registry, "pair_events").unwrap();
        let (tx, mut rx) = tracked_channel(1, Some(metrics.clone()));

        tx.try_send(1u8).unwrap();
        assert!(tx.try_send(2u8).is_err());
        assert_eq!(metrics.queue_depth.get(), 1);
        assert_eq!(metrics.dropped_total.get(), 1);

        rx.recv().await.unwrap();
        assert_eq!(metrics.queue_depth.get(), 0);
    }
}
