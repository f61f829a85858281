use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Local nonce counter for one wallet. Synced lazily from the chain and
/// invalidated after a failed broadcast.
pub struct NonceManager {
    next: AtomicU64,
    synced: AtomicBool,
}

impl NonceManager {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            synced: AtomicBool::new(false),
        }
    }

    pub fn next_nonce(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        self.synced.store(false, Ordering::SeqCst);
    }

    pub async fn sync(&self, provider: &DynProvider, address: Address) -> Result<u64> {
        let nonce = provider.get_transaction_count(address).pending().await?;
        self.next.store(nonce, Ordering::SeqCst);
        self.synced.store(true, Ordering::SeqCst);
        Ok(nonce)
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U64};
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;

    #[tokio::test]
    async fn sync_sets_next_and_increments() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        asserter.push_success(&U64::from(7u64));

        let nonces = NonceManager::new();
        assert!(!nonces.is_synced());
        let synced = nonces
            .sync(&provider, address!("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"))
            .await
            .unwrap();

        assert_eq!(synced, 7);
        assert!(nonces.is_synced());
        assert_eq!(nonces.next_nonce(), 7);
        assert_eq!(nonces.next_nonce(), 8);
        nonces.invalidate();
        assert!(!nonces.is_synced());
        assert!(asserter.read_q().is_empty());
    }
}
