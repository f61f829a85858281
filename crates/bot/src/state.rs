use lru::LruCache;
use snipe_core::types::{ChainAddress, TxId};
use snipe_core::{CandidateToken, ChainId};
use std::num::NonZeroUsize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Discovered,
    Gating,
    Executing,
    Bought,
    Dropped,
}

/// Transient drops may be retried when the token shows up in another pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Transient,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct CandidateLifecycle {
    pub candidate: CandidateToken,
    pub state: CandidateState,
    pub first_seen_ms: u64,
    pub last_update_ms: u64,
    pub drop_reason: Option<String>,
    pub drop_kind: Option<DropKind>,
    pub tx: Option<TxId>,
}

impl CandidateLifecycle {
    fn new(candidate: CandidateToken, now_ms: u64) -> Self {
        Self {
            first_seen_ms: candidate.event.discovered_at_ms,
            candidate,
            state: CandidateState::Discovered,
            last_update_ms: now_ms,
            drop_reason: None,
            drop_kind: None,
            tx: None,
        }
    }

    fn in_flight(&self) -> bool {
        matches!(self.state, CandidateState::Gating | CandidateState::Executing)
    }
}

pub type CandidateKey = (ChainId, ChainAddress);

/// Lifecycle of every token handed to the gate, keyed by `(chain, token)`.
pub struct CandidateStore {
    entries: LruCache<CandidateKey, CandidateLifecycle>,
    ttl_ms: u64,
}

impl CandidateStore {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl_ms,
        }
    }

    /// Records a fresh sighting. Returns `false` when the token is already
    /// in flight, bought, or terminally dropped.
    pub fn admit(&mut self, candidate: CandidateToken, now_ms: u64) -> bool {
        let key = (candidate.chain, candidate.token);
        if let Some(entry) = self.entries.get_mut(&key) {
            let retry = entry.state == CandidateState::Dropped
                && entry.drop_kind == Some(DropKind::Transient);
            if retry {
                *entry = CandidateLifecycle::new(candidate, now_ms);
            }
            return retry;
        }
        self.entries.put(key, CandidateLifecycle::new(candidate, now_ms));
        true
    }

    pub fn set_state(&mut self, key: &CandidateKey, state: CandidateState, now_ms: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.state == CandidateState::Dropped {
                return;
            }
            entry.state = state;
            entry.last_update_ms = now_ms;
        }
    }

    pub fn mark_bought(&mut self, key: &CandidateKey, tx: Option<TxId>, now_ms: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = CandidateState::Bought;
            entry.tx = tx;
            entry.last_update_ms = now_ms;
        }
    }

    pub fn drop_terminal(&mut self, key: &CandidateKey, reason: impl Into<String>, now_ms: u64) {
        self.drop_with_kind(key, reason, DropKind::Terminal, now_ms);
    }

    pub fn drop_transient(&mut self, key: &CandidateKey, reason: impl Into<String>, now_ms: u64) {
        self.drop_with_kind(key, reason, DropKind::Transient, now_ms);
    }

    pub fn get(&self, key: &CandidateKey) -> Option<&CandidateLifecycle> {
        self.entries.peek(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets settled entries older than the ttl; in-flight entries stay.
    pub fn prune(&mut self, now_ms: u64) {
        if self.ttl_ms == 0 {
            return;
        }
        let expired: Vec<CandidateKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                !entry.in_flight() && now_ms.saturating_sub(entry.last_update_ms) > self.ttl_ms
            })
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            self.entries.pop(&key);
        }
    }

    fn drop_with_kind(
        &mut self,
        key: &CandidateKey,
        reason: impl Into<String>,
        kind: DropKind,
        now_ms: u64,
    ) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = CandidateState::Dropped;
            entry.drop_reason = Some(reason.into());
            entry.drop_kind = Some(kind);
            entry.last_update_ms = now_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use snipe_core::types::BlockRef;
    use snipe_core::PairCreatedEvent;

    fn candidate() -> CandidateToken {
        let token = ChainAddress::Evm(address!("0x1000000000000000000000000000000000000001"));
        CandidateToken {
            token,
            chain: ChainId::Bsc,
            event: PairCreatedEvent {
                chain: ChainId::Bsc,
                block: BlockRef::Number(1),
                token0: token,
                token1: ChainAddress::Evm(address!("0x2000000000000000000000000000000000000002")),
                pair: ChainAddress::Evm(address!("0x3000000000000000000000000000000000000003")),
                discovered_at_ms: 1_000,
            },
        }
    }

    fn key() -> CandidateKey {
        (ChainId::Bsc, candidate().token)
    }

    #[test]
    fn in_flight_and_bought_tokens_are_not_readmitted() {
        let mut store = CandidateStore::new(4, 10_000);

        assert!(store.admit(candidate(), 1_000));
        store.set_state(&key(), CandidateState::Gating, 1_100);
        assert!(!store.admit(candidate(), 1_200));

        store.mark_bought(&key(), Some(TxId("0xabc".to_string())), 1_300);
        assert!(!store.admit(candidate(), 1_400));
        let entry = store.get(&key()).unwrap();
        assert_eq!(entry.state, CandidateState::Bought);
        assert_eq!(entry.first_seen_ms, 1_000);
    }

    #[test]
    fn transient_drop_allows_retry_but_terminal_does_not() {
        let mut store = CandidateStore::new(4, 10_000);
        store.admit(candidate(), 1_000);
        store.drop_transient(&key(), "liquidity below threshold", 1_100);
        assert!(store.admit(candidate(), 1_200));
        assert_eq!(store.get(&key()).unwrap().state, CandidateState::Discovered);

        store.drop_terminal(&key(), "unclassified", 1_300);
        store.set_state(&key(), CandidateState::Executing, 1_350);
        assert!(!store.admit(candidate(), 1_400));
        assert_eq!(store.get(&key()).unwrap().state, CandidateState::Dropped);
    }

    #[test]
    fn prune_keeps_in_flight_entries() {
        let mut store = CandidateStore::new(4, 100);
        store.admit(candidate(), 1_000);
        store.set_state(&key(), CandidateState::Executing, 1_000);

        store.prune(5_000);
        assert_eq!(store.len(), 1);

        store.drop_transient(&key(), "exhausted", 5_000);
        store.prune(5_050);
        assert_eq!(store.len(), 1);
        store.prune(5_200);
        assert!(store.is_empty());
    }
}
