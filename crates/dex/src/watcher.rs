use snipe_chain::{ChainGateway, ContractAbi, LogCursor, TrackedSender};
use snipe_core::config::{ChainConfig, WatcherConfig};
use snipe_core::dedupe::DedupeCache;
use snipe_core::types::ChainAddress;
use snipe_core::utils::now_ms;
use snipe_core::{ChainId, PairCreatedEvent, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::decode_raw_event;
use crate::metrics::WatcherMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    FetchingAbi,
    Subscribed,
    Polling,
    Backoff,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub factory: ChainAddress,
    pub event_name: String,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub seen_capacity: usize,
}

impl WatcherSettings {
    pub fn from_config(chain: &ChainConfig, cfg: &WatcherConfig) -> Result<Self> {
        Ok(Self {
            factory: ChainAddress::parse(chain.id, &chain.factory)?,
            event_name: chain.pair_event.clone(),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            error_backoff: Duration::from_millis(cfg.error_backoff_ms),
            seen_capacity: cfg.seen_pairs_capacity,
        })
    }
}

/// Result of one log poll.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub emitted: Vec<PairCreatedEvent>,
    pub duplicates: usize,
    pub malformed: usize,
}

/// Polls one factory for new pairs. Owns its cursor and seen-pairs set, so a
/// pair is emitted at most once per watcher instance.
pub struct PairWatcher {
    gateway: Arc<dyn ChainGateway>,
    settings: WatcherSettings,
    seen: DedupeCache<ChainAddress>,
    cursor: LogCursor,
    abi: Option<ContractAbi>,
    state: WatcherState,
    metrics: Option<WatcherMetrics>,
}

impl PairWatcher {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        settings: WatcherSettings,
        metrics: Option<WatcherMetrics>,
    ) -> Self {
        // ttl 0: entries leave only through capacity eviction
        let seen = DedupeCache::new(settings.seen_capacity, 0);
        Self {
            gateway,
            settings,
            seen,
            cursor: LogCursor::Start,
            abi: None,
            state: WatcherState::Idle,
            metrics,
        }
    }

    pub fn chain(&self) -> ChainId {
        self.gateway.chain()
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Resolves the factory ABI. On failure the watcher stays idle.
    pub async fn start(&mut self) -> Result<()> {
        self.state = WatcherState::FetchingAbi;
        match self.gateway.fetch_abi(&self.settings.factory).await {
            Ok(abi) => {
                self.abi = Some(abi);
                self.state = WatcherState::Subscribed;
                info!(
                    chain = %self.chain(),
                    factory = %self.settings.factory,
                    event = %self.settings.event_name,
                    "watcher subscribed"
                );
                Ok(())
            }
            Err(err) => {
                self.state = WatcherState::Backoff;
                Err(err)
            }
        }
    }

    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let chain = self.chain();
        let Some(abi) = self.abi.as_ref() else {
            return Err(anyhow::anyhow!("{chain} watcher polled before start").into());
        };
        let batch = self
            .gateway
            .read_new_logs(
                &self.settings.factory,
                abi,
                &self.settings.event_name,
                &self.cursor,
            )
            .await?;
        self.state = WatcherState::Polling;

        let mut outcome = PollOutcome::default();
        let discovered_at = now_ms();
        for raw in &batch.events {
            let event = match decode_raw_event(chain, raw, discovered_at) {
                Ok(event) => event,
                Err(err) => {
                    warn!(%chain, %err, "skipping malformed pair event");
                    outcome.malformed += 1;
                    continue;
                }
            };
            if !self.seen.check_and_update(event.pair, discovered_at) {
                debug!(%chain, pair = %event.pair, "duplicate pair ignored");
                outcome.duplicates += 1;
                continue;
            }
            info!(
                %chain,
                block = %event.block,
                token0 = %event.token0,
                token1 = %event.token1,
                pair = %event.pair,
                "new pair"
            );
            outcome.emitted.push(event);
        }
        self.cursor = batch.next;

        if let Some(metrics) = &self.metrics {
            metrics.record_poll(chain, &outcome);
        }
        Ok(outcome)
    }

    /// Runs until cancelled or until the receiving side goes away.
    pub async fn run(mut self, tx: TrackedSender<PairCreatedEvent>, cancel: CancellationToken) {
        let chain = self.chain();
        while let Err(err) = self.start().await {
            error!(
                %chain,
                %err,
                backoff_ms = self.settings.error_backoff.as_millis() as u64,
                "watcher not started, retrying"
            );
            if let Some(metrics) = &self.metrics {
                metrics.inc_poll_error(chain);
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.state = WatcherState::Stopped;
                    return;
                }
                _ = tokio::time::sleep(self.settings.error_backoff) => {}
            }
        }

        loop {
            let delay = match self.poll_once().await {
                Ok(outcome) => {
                    for event in outcome.emitted {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                self.state = WatcherState::Stopped;
                                return;
                            }
                            sent = tx.send(event) => {
                                if sent.is_err() {
                                    info!(%chain, "pair receiver closed, watcher exiting");
                                    self.state = WatcherState::Stopped;
                                    return;
                                }
                            }
                        }
                    }
                    self.settings.poll_interval
                }
                Err(err) => {
                    warn!(
                        %chain,
                        %err,
                        backoff_ms = self.settings.error_backoff.as_millis() as u64,
                        "watcher poll failed"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_poll_error(chain);
                    }
                    self.state = WatcherState::Backoff;
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.state = WatcherState::Stopped;
        info!(%chain, "watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::pair_created_log;
    use alloy::primitives::{address, Address};
    use prometheus::Registry;
    use snipe_chain::testing::FakeGateway;
    use snipe_chain::{tracked_channel, RawEvent};
    use std::sync::atomic::Ordering;

    const FACTORY: Address = address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73");

    fn settings() -> WatcherSettings {
        WatcherSettings {
            factory: ChainAddress::Evm(FACTORY),
            event_name: "PairCreated".to_string(),
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
            seen_capacity: 16,
        }
    }

    fn log(pair: u8, block: u64) -> RawEvent {
        let mut pair_bytes = [0u8; 20];
        pair_bytes[19] = pair;
        RawEvent::Evm(pair_created_log(
            FACTORY,
            address!("0x0000000000000000000000000000000000000aaa"),
            address!("0x0000000000000000000000000000000000000bbb"),
            Address::from(pair_bytes),
            block,
        ))
    }

    fn malformed() -> RawEvent {
        let mut raw = log(0xee, 1);
        if let RawEvent::Evm(log) = &mut raw {
            log.block_number = None;
        }
        raw
    }

    #[tokio::test]
    async fn repeated_pair_is_emitted_once() {
        let fake = Arc::new(FakeGateway::new(ChainId::Bsc));
        fake.push_logs(vec![log(1, 10), log(1, 10), log(2, 11)]);
        fake.push_logs(vec![log(2, 11), log(3, 12)]);
        let mut watcher = PairWatcher::new(fake.clone(), settings(), None);
        watcher.start().await.unwrap();

        let first = watcher.poll_once().await.unwrap();
        let second = watcher.poll_once().await.unwrap();

        assert_eq!(first.emitted.len(), 2);
        assert_eq!(first.duplicates, 1);
        assert_eq!(second.emitted.len(), 1);
        assert_eq!(second.duplicates, 1);
        assert_eq!(watcher.seen_len(), 3);
        assert_eq!(watcher.state(), WatcherState::Polling);
    }

    #[tokio::test]
    async fn malformed_event_is_skipped_and_cursor_advances() {
        let fake = Arc::new(FakeGateway::new(ChainId::Eth));
        fake.push_logs(vec![malformed(), log(5, 20)]);
        let mut watcher = PairWatcher::new(fake.clone(), settings(), None);
        watcher.start().await.unwrap();

        let outcome = watcher.poll_once().await.unwrap();

        assert_eq!(outcome.malformed, 1);
        assert_eq!(outcome.emitted.len(), 1);
        assert_eq!(watcher.cursor(), &LogCursor::Block(1));
        watcher.poll_once().await.unwrap();
        assert_eq!(
            fake.cursors_seen(),
            vec![LogCursor::Start, LogCursor::Block(1)]
        );
    }

    #[tokio::test]
    async fn poll_error_keeps_cursor() {
        let fake = Arc::new(FakeGateway::new(ChainId::Bsc));
        fake.push_log_error("connection reset");
        let mut watcher = PairWatcher::new(fake.clone(), settings(), None);
        watcher.start().await.unwrap();

        assert!(watcher.poll_once().await.is_err());
        assert_eq!(watcher.cursor(), &LogCursor::Start);
    }

    #[tokio::test(start_paused = true)]
    async fn abi_failure_retries_start_until_it_succeeds() {
        let fake = Arc::new(FakeGateway::new(ChainId::Eth));
        fake.fail_abi_times("NOTOK", 2);
        fake.push_logs(vec![log(9, 40)]);
        let (tx, mut rx) = tracked_channel(8, None);
        let cancel = CancellationToken::new();
        let watcher = PairWatcher::new(fake.clone(), settings(), None);
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn(watcher.run(tx, cancel.clone()));

        let event = rx.recv().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(fake.abi_calls.load(Ordering::SeqCst), 3);
        assert_eq!(event.chain, ChainId::Eth);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_start_backoff_stops_watcher() {
        let fake = Arc::new(FakeGateway::new(ChainId::Eth));
        fake.fail_abi("NOTOK");
        let (tx, _rx) = tracked_channel(8, None);
        let cancel = CancellationToken::new();
        let watcher = PairWatcher::new(fake.clone(), settings(), None);
        let handle = tokio::spawn(watcher.run(tx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(fake.abi_calls.load(Ordering::SeqCst), 3);
        assert_eq!(fake.log_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_backs_off_after_error_and_resumes() {
        let fake = Arc::new(FakeGateway::new(ChainId::Bsc));
        fake.push_log_error("timeout");
        fake.push_logs(vec![log(7, 30)]);
        let registry = Registry::new();
        let metrics = WatcherMetrics::new(&registry).unwrap();
        let (tx, mut rx) = tracked_channel(8, None);
        let cancel = CancellationToken::new();
        let watcher = PairWatcher::new(fake.clone(), settings(), Some(metrics));
        let started = tokio::time::Instant::now();
        let handle = tokio::spawn(watcher.run(tx, cancel.clone()));

        let event = rx.recv().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(10));
        let mut expected = [0u8; 20];
        expected[19] = 7;
        assert_eq!(event.pair, ChainAddress::Evm(Address::from(expected)));
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(fake.log_calls.load(Ordering::SeqCst), 2);
        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("watcher_poll_errors_total{chain=\"BSC\"} 1"));
        assert!(text.contains("pairs_discovered_total{chain=\"BSC\"} 1"));
    }
}
