pub mod channel;
pub mod evm;
pub mod explorer;
pub mod gateway;
pub mod metrics;
pub mod solana;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use snipe_core::config::{AppConfig, ChainConfig, Credentials};
use snipe_core::{Error, Result};
use std::sync::Arc;

pub use channel::{tracked_channel, TrackedReceiver, TrackedSender};
pub use evm::EvmGateway;
pub use explorer::{AbiFetcher, ExplorerApi, HttpExplorer};
pub use gateway::{
    BuyOrder, ChainGateway, ChainHandle, ContractAbi, LogBatch, LogCursor, RawEvent,
    SolanaPoolInit, TxStatus,
};
pub use metrics::ChannelMetrics;
pub use solana::SolanaGateway;

/// Selects the gateway implementation for a configured chain.
pub async fn build_gateway(
    chain: &ChainConfig,
    creds: &Credentials,
    cfg: &AppConfig,
) -> Result<Arc<dyn ChainGateway>> {
    let secrets = creds
        .chains
        .get(&chain.id)
        .ok_or_else(|| Error::MissingEnv(vec![format!("rpc url for {}", chain.id)]))?;
    if chain.id.is_evm() {
        let gateway = EvmGateway::from_config(chain, secrets, creds, cfg).await?;
        Ok(Arc::new(gateway))
    } else {
        let gateway = SolanaGateway::from_config(chain, secrets, creds, cfg)?;
        Ok(Arc::new(gateway))
    }
}
