use anyhow::anyhow;
use futures_util::FutureExt;
use snipe_chain::{build_gateway, tracked_channel, ChainGateway, TrackedReceiver};
use snipe_core::config::{AppConfig, Credentials};
use snipe_core::{PairCreatedEvent, Result};
use snipe_dex::{PairWatcher, WatcherSettings};
use snipe_executor::TradeExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::{spawn_metrics_server, BotMetrics};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy)]
struct LoopSettings {
    interval: Duration,
    cooldown: Duration,
    grace: Duration,
    channel_capacity: usize,
}

impl LoopSettings {
    fn from_config(cfg: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.sweep.interval_ms),
            cooldown: Duration::from_millis(cfg.sweep.cooldown_ms),
            grace: Duration::from_millis(cfg.sweep.shutdown_grace_ms),
            channel_capacity: cfg.watcher.channel_capacity,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pairs: usize,
    pub spawned: usize,
    pub skipped: usize,
    pub finished: usize,
}

/// One watcher task per chain feeding a channel drained by a periodic sweep.
pub struct SniperLoop {
    settings: LoopSettings,
    pipeline: Arc<Pipeline>,
    watchers: Vec<PairWatcher>,
    metrics: Option<Arc<BotMetrics>>,
}

impl SniperLoop {
    /// Builds and connects a gateway per enabled chain. A chain that fails to
    /// connect is skipped; no connected chain at all is an error.
    pub async fn connect(cfg: &AppConfig, creds: &Credentials) -> Result<Self> {
        let metrics = if cfg.observability.metrics_enabled {
            let metrics = Arc::new(BotMetrics::new()?);
            if let Err(err) = spawn_metrics_server(&cfg.observability.metrics_bind, metrics.clone())
            {
                warn!(?err, "metrics server failed to start");
            }
            Some(metrics)
        } else {
            None
        };

        let mut gateways: Vec<Arc<dyn ChainGateway>> = Vec::new();
        for chain in cfg.enabled_chains() {
            let gateway = match build_gateway(chain, creds, cfg).await {
                Ok(gateway) => gateway,
                Err(err) => {
                    error!(chain = %chain.id, %err, "gateway setup failed, chain skipped");
                    continue;
                }
            };
            match gateway.connect().await {
                Ok(handle) => info!(
                    chain = %handle.chain,
                    explorer_key = handle.has_explorer_key,
                    "connected"
                ),
                Err(err) => {
                    error!(chain = %chain.id, %err, "connection failed, chain skipped");
                    continue;
                }
            }
            gateways.push(gateway);
        }
        if gateways.is_empty() {
            return Err(anyhow!("no chain connected").into());
        }

        let executor = TradeExecutor::new(&cfg.executor, &creds.max_investment_amount)?;
        Self::from_gateways(cfg, gateways, executor, metrics)
    }

    /// Wires already connected gateways into watchers and the pipeline.
    pub fn from_gateways(
        cfg: &AppConfig,
        gateways: Vec<Arc<dyn ChainGateway>>,
        executor: TradeExecutor,
        metrics: Option<Arc<BotMetrics>>,
    ) -> Result<Self> {
        let mut watchers = Vec::new();
        for gateway in &gateways {
            let Some(chain_cfg) = cfg.chain(gateway.chain()) else {
                warn!(chain = %gateway.chain(), "no configuration for gateway, not watched");
                continue;
            };
            let settings = WatcherSettings::from_config(chain_cfg, &cfg.watcher)?;
            watchers.push(PairWatcher::new(
                gateway.clone(),
                settings,
                metrics.as_ref().map(|metrics| metrics.watcher.clone()),
            ));
        }
        let pipeline = Arc::new(Pipeline::new(cfg, gateways, executor, metrics.clone())?);
        Ok(Self {
            settings: LoopSettings::from_config(cfg),
            pipeline,
            watchers,
            metrics,
        })
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    /// Runs until `cancel` fires. Errors only once every watcher task is gone.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let SniperLoop {
            settings,
            pipeline,
            watchers,
            metrics,
        } = self;
        let (tx, mut rx) = tracked_channel(
            settings.channel_capacity,
            metrics.as_ref().map(|metrics| metrics.pairs.clone()),
        );
        let watch_cancel = cancel.child_token();
        let mut watcher_tasks = JoinSet::new();
        for watcher in watchers {
            watcher_tasks.spawn(watcher.run(tx.clone(), watch_cancel.clone()));
        }
        drop(tx);

        let trade_cancel = CancellationToken::new();
        let mut trades = JoinSet::new();
        info!(
            watchers = watcher_tasks.len(),
            interval_ms = settings.interval.as_millis() as u64,
            "sniper loop running"
        );

        let result: Result<()> = loop {
            while let Some(Some(_)) = watcher_tasks.join_next().now_or_never() {}
            if watcher_tasks.is_empty() {
                error!("all pair watchers stopped");
                break Err(anyhow!("all pair watchers stopped").into());
            }

            let delay = match sweep(&pipeline, &mut rx, &mut trades, &trade_cancel) {
                Ok(report) => {
                    if report.pairs > 0 || report.finished > 0 {
                        info!(
                            pairs = report.pairs,
                            spawned = report.spawned,
                            skipped = report.skipped,
                            finished = report.finished,
                            in_flight = trades.len(),
                            "sweep complete"
                        );
                    }
                    settings.interval
                }
                Err(err) => {
                    error!(%err, cooldown_ms = settings.cooldown.as_millis() as u64, "sweep failed");
                    if let Some(metrics) = &metrics {
                        metrics.sweep_errors_total.inc();
                    }
                    settings.cooldown
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        info!("shutting down");
        watch_cancel.cancel();
        drain_trades(&mut trades, settings.grace, &trade_cancel).await;
        while watcher_tasks.join_next().await.is_some() {}
        info!("sniper loop stopped");
        result
    }
}

/// One pass: reap finished candidate tasks, then turn every queued pair into
/// candidate tasks.
pub fn sweep(
    pipeline: &Arc<Pipeline>,
    rx: &mut TrackedReceiver<PairCreatedEvent>,
    trades: &mut JoinSet<()>,
    trade_cancel: &CancellationToken,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut panicked = 0usize;
    while let Some(Some(joined)) = trades.join_next().now_or_never() {
        report.finished += 1;
        if let Err(err) = joined {
            if err.is_panic() {
                panicked += 1;
            }
        }
    }
    if panicked > 0 {
        return Err(anyhow!("{panicked} candidate tasks panicked").into());
    }
    pipeline.prune();

    let events = rx.drain();
    report.pairs = events.len();
    for event in &events {
        for candidate in pipeline.ingest(event) {
            if !pipeline.admit(&candidate) {
                debug!(chain = %candidate.chain, token = %candidate.token, "candidate already handled");
                report.skipped += 1;
                continue;
            }
            report.spawned += 1;
            let pipeline = pipeline.clone();
            let cancel = trade_cancel.clone();
            trades.spawn(async move {
                let chain = candidate.chain;
                let token = candidate.token;
                let outcome = pipeline.process(candidate, &cancel).await;
                debug!(%chain, %token, ?outcome, "candidate processed");
            });
        }
    }
    Ok(report)
}

async fn drain_trades(
    trades: &mut JoinSet<()>,
    grace: Duration,
    trade_cancel: &CancellationToken,
) {
    if trades.is_empty() {
        return;
    }
    info!(
        in_flight = trades.len(),
        grace_ms = grace.as_millis() as u64,
        "waiting for in-flight purchases"
    );
    let finished = tokio::time::timeout(grace, async {
        while trades.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!(remaining = trades.len(), "grace period elapsed, aborting in-flight purchases");
        trade_cancel.cancel();
        trades.abort_all();
        while trades.join_next().await.is_some() {}
    }
}
