use crate::types::{ChainAddress, ChainId};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use tracing::error;

/// Membership test over a set of known token addresses.
pub trait TokenSet {
    fn has(&self, token: &ChainAddress) -> bool;
}

impl TokenSet for HashSet<ChainAddress> {
    fn has(&self, token: &ChainAddress) -> bool {
        self.contains(token)
    }
}

impl TokenSet for LruCache<ChainAddress, ()> {
    fn has(&self, token: &ChainAddress) -> bool {
        self.contains(token)
    }
}

/// Resolves the chain a token belongs to by membership, first match wins in
/// the order ETH, BSC, SOL.
pub fn classify<S: TokenSet>(
    token: &ChainAddress,
    known_eth: &S,
    known_bsc: &S,
    known_sol: &S,
) -> Option<ChainId> {
    if known_eth.has(token) {
        return Some(ChainId::Eth);
    }
    if known_bsc.has(token) {
        return Some(ChainId::Bsc);
    }
    if known_sol.has(token) {
        return Some(ChainId::Sol);
    }
    error!(%token, "unknown blockchain for token");
    None
}

/// Per-chain sets of token addresses discovered by the watchers, capped with
/// least-recently-recorded eviction.
pub struct KnownTokens {
    eth: LruCache<ChainAddress, ()>,
    bsc: LruCache<ChainAddress, ()>,
    sol: LruCache<ChainAddress, ()>,
}

impl KnownTokens {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            eth: LruCache::new(capacity),
            bsc: LruCache::new(capacity),
            sol: LruCache::new(capacity),
        }
    }

    pub fn record(&mut self, chain: ChainId, token: ChainAddress) {
        let set = match chain {
            ChainId::Eth => &mut self.eth,
            ChainId::Bsc => &mut self.bsc,
            ChainId::Sol => &mut self.sol,
        };
        set.put(token, ());
    }

    pub fn classify(&self, token: &ChainAddress) -> Option<ChainId> {
        classify(token, &self.eth, &self.bsc, &self.sol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SolPubkey;
    use alloy::primitives::address;

    fn evm(byte: u8) -> ChainAddress {
        let mut raw = [0u8; 20];
        raw[19] = byte;
        ChainAddress::Evm(raw.into())
    }

    #[test]
    fn single_membership_returns_that_chain() {
        let token = evm(1);
        let set: HashSet<_> = [token].into_iter().collect();
        let empty: HashSet<ChainAddress> = HashSet::new();
        assert_eq!(classify(&token, &set, &empty, &empty), Some(ChainId::Eth));
        assert_eq!(classify(&token, &empty, &set, &empty), Some(ChainId::Bsc));
        assert_eq!(classify(&token, &empty, &empty, &set), Some(ChainId::Sol));
    }

    #[test]
    fn no_membership_returns_none() {
        let empty: HashSet<ChainAddress> = HashSet::new();
        assert_eq!(classify(&evm(9), &empty, &empty, &empty), None);
    }

    #[test]
    fn multiple_membership_follows_priority() {
        let token = ChainAddress::Evm(address!("0x00000000000000000000000000000000000000aa"));
        let all: HashSet<_> = [token].into_iter().collect();
        let empty: HashSet<ChainAddress> = HashSet::new();
        assert_eq!(classify(&token, &all, &all, &all), Some(ChainId::Eth));
        assert_eq!(classify(&token, &empty, &all, &all), Some(ChainId::Bsc));
    }

    #[test]
    fn classification_is_repeatable() {
        let token = ChainAddress::Solana(SolPubkey::new([7u8; 32]));
        let sol: HashSet<_> = [token].into_iter().collect();
        let empty: HashSet<ChainAddress> = HashSet::new();
        let first = classify(&token, &empty, &empty, &sol);
        let second = classify(&token, &empty, &empty, &sol);
        assert_eq!(first, second);
    }

    #[test]
    fn known_tokens_evicts_oldest() {
        let mut known = KnownTokens::new(2);
        known.record(ChainId::Bsc, evm(1));
        known.record(ChainId::Bsc, evm(2));
        known.record(ChainId::Bsc, evm(3));
        assert_eq!(known.classify(&evm(1)), None);
        assert_eq!(known.classify(&evm(3)), Some(ChainId::Bsc));
    }

    #[test]
    fn rediscovered_token_outlives_older_ones() {
        let mut known = KnownTokens::new(2);
        known.record(ChainId::Eth, evm(1));
        known.record(ChainId::Eth, evm(2));
        known.record(ChainId::Eth, evm(1));
        known.record(ChainId::Eth, evm(3));
        assert_eq!(known.classify(&evm(1)), Some(ChainId::Eth));
        assert_eq!(known.classify(&evm(2)), None);
    }
}
