use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use snipe_core::ChainId;
use tracing::info;

#[derive(Clone)]
pub struct TxSender {
    chain: ChainId,
    provider: DynProvider,
}

impl TxSender {
    pub fn new(chain: ChainId, provider: DynProvider) -> Self {
        Self { chain, provider }
    }

    /// Broadcasts without waiting for inclusion.
    pub async fn send(&self, tx: TransactionRequest) -> Result<B256> {
        let pending = self.provider.send_transaction(tx).await?;
        let hash = *pending.inner().tx_hash();
        info!(chain = %self.chain, %hash, "tx broadcast");
        Ok(hash)
    }
}
