use snipe_core::types::ChainAddress;
use snipe_core::ChainId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

type Key = (ChainId, ChainAddress);

/// Tokens with an attempt sequence in flight.
#[derive(Clone, Default)]
pub(crate) struct PendingRegistry {
    inner: Arc<Mutex<HashSet<Key>>>,
}

impl PendingRegistry {
    /// Claims `token` or returns `None` when it is already claimed.
    pub(crate) fn claim(&self, chain: ChainId, token: ChainAddress) -> Option<PendingGuard> {
        let key = (chain, token);
        let inserted = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key);
        inserted.then(|| PendingGuard {
            registry: self.clone(),
            key,
        })
    }

    pub(crate) fn contains(&self, chain: ChainId, token: &ChainAddress) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(chain, *token))
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Releases the claim on drop, including on panic or task abort.
pub(crate) struct PendingGuard {
    registry: PendingRegistry,
    key: Key,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}
