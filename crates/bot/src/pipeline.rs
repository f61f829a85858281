use snipe_chain::ChainGateway;
use snipe_core::config::AppConfig;
use snipe_core::types::ChainAddress;
use snipe_core::utils::now_ms;
use snipe_core::{CandidateToken, ChainId, KnownTokens, PairCreatedEvent, Result};
use snipe_executor::{PurchaseResult, TradeExecutor};
use snipe_gate::{GateVerdict, LiquidityGate};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::BotMetrics;
use crate::state::{CandidateKey, CandidateState, CandidateStore};

/// Where a single candidate ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Unclassified,
    NoGateway,
    GateFailed(GateVerdict),
    Purchase(PurchaseResult),
}

/// Classify, gate and buy, shared by every candidate task of the loop.
pub struct Pipeline {
    gateways: HashMap<ChainId, Arc<dyn ChainGateway>>,
    base_tokens: HashMap<ChainId, HashSet<ChainAddress>>,
    known: Mutex<KnownTokens>,
    store: Mutex<CandidateStore>,
    gate: LiquidityGate,
    executor: TradeExecutor,
    metrics: Option<Arc<BotMetrics>>,
}

impl Pipeline {
    pub fn new(
        cfg: &AppConfig,
        gateways: Vec<Arc<dyn ChainGateway>>,
        executor: TradeExecutor,
        metrics: Option<Arc<BotMetrics>>,
    ) -> Result<Self> {
        let mut base_tokens = HashMap::new();
        for chain in cfg.enabled_chains() {
            let tokens = chain
                .base_tokens
                .iter()
                .map(|raw| ChainAddress::parse(chain.id, raw))
                .collect::<Result<HashSet<_>>>()?;
            base_tokens.insert(chain.id, tokens);
        }
        let gateways = gateways
            .into_iter()
            .map(|gateway| (gateway.chain(), gateway))
            .collect();
        Ok(Self {
            gateways,
            base_tokens,
            known: Mutex::new(KnownTokens::new(cfg.sweep.known_tokens_capacity)),
            store: Mutex::new(CandidateStore::new(
                cfg.sweep.candidate_cache_capacity,
                cfg.sweep.candidate_ttl_ms,
            )),
            gate: LiquidityGate::new(&cfg.gate),
            executor,
            metrics,
        })
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    /// Turns a new pair into candidates: every side that is not a base token.
    pub fn ingest(&self, event: &PairCreatedEvent) -> Vec<CandidateToken> {
        let chain = event.chain;
        let base = self.base_tokens.get(&chain);
        let is_base = |token: &ChainAddress| base.is_some_and(|set| set.contains(token));

        let mut candidates = Vec::new();
        for token in [event.token0, event.token1] {
            if is_base(&token) {
                continue;
            }
            self.known().record(chain, token);
            if let Some(metrics) = &self.metrics {
                metrics.record_candidate(chain);
            }
            candidates.push(CandidateToken {
                token,
                chain,
                event: event.clone(),
            });
        }
        if candidates.is_empty() {
            debug!(%chain, pair = %event.pair, "pair of base tokens ignored");
        }
        candidates
    }

    /// Registers the candidate in the lifecycle store; `false` means skip it.
    pub fn admit(&self, candidate: &CandidateToken) -> bool {
        self.store().admit(candidate.clone(), now_ms())
    }

    pub fn prune(&self) {
        self.store().prune(now_ms());
    }

    pub fn candidate_state(&self, chain: ChainId, token: &ChainAddress) -> Option<CandidateState> {
        self.store().get(&(chain, *token)).map(|entry| entry.state)
    }

    pub async fn process(
        &self,
        candidate: CandidateToken,
        cancel: &CancellationToken,
    ) -> ProcessOutcome {
        let token = candidate.token;
        let origin = candidate.chain;
        let key: CandidateKey = (origin, token);

        let classified = self.known().classify(&token);
        let chain = match classified {
            Some(chain) if chain == origin => chain,
            Some(other) => {
                warn!(%token, %origin, classified = %other, "classifier disagrees with origin chain, using origin");
                origin
            }
            None => {
                self.store().drop_terminal(&key, "unknown blockchain", now_ms());
                return ProcessOutcome::Unclassified;
            }
        };
        let Some(gateway) = self.gateways.get(&chain) else {
            warn!(%chain, %token, "no gateway for chain");
            self.store().drop_terminal(&key, "no gateway", now_ms());
            return ProcessOutcome::NoGateway;
        };

        self.store().set_state(&key, CandidateState::Gating, now_ms());
        let verdict = self.gate.evaluate(gateway.as_ref(), &token).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_verdict(chain, verdict.label());
        }
        if !verdict.pass {
            let reason = verdict.reason.clone().unwrap_or_default();
            self.store().drop_transient(&key, reason, now_ms());
            return ProcessOutcome::GateFailed(verdict);
        }

        self.store().set_state(&key, CandidateState::Executing, now_ms());
        let amount = self.executor.max_investment(chain);
        let result = self
            .executor
            .attempt_purchase(gateway.as_ref(), token, amount, cancel)
            .await;
        if let Some(metrics) = &self.metrics {
            metrics.record_trade(chain, result.label());
        }
        match &result {
            PurchaseResult::Succeeded(attempt) => {
                self.store().mark_bought(&key, attempt.tx.clone(), now_ms());
            }
            PurchaseResult::Rejected => {
                info!(%chain, %token, "purchase already in flight");
            }
            PurchaseResult::ExhaustedRetries(attempt) | PurchaseResult::Cancelled(attempt) => {
                let reason = attempt.last_error.clone().unwrap_or_default();
                self.store().drop_transient(&key, reason, now_ms());
            }
        }
        ProcessOutcome::Purchase(result)
    }

    fn known(&self) -> MutexGuard<'_, KnownTokens> {
        self.known.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self) -> MutexGuard<'_, CandidateStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
