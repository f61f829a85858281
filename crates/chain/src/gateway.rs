use alloy::json_abi::JsonAbi;
use alloy::primitives::U256;
use alloy::rpc::types::Log;
use async_trait::async_trait;
use snipe_core::types::{ChainAddress, SolPubkey, TxId};
use snipe_core::{ChainId, Result};

/// Snapshot of one chain connection, refreshed by [`ChainGateway::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHandle {
    pub chain: ChainId,
    pub rpc_url: String,
    pub has_explorer_key: bool,
    pub connected: bool,
    pub checked_at_ms: u64,
}

/// Contract interface as resolved by the chain's verification service.
#[derive(Debug, Clone)]
pub enum ContractAbi {
    Evm(JsonAbi),
    /// Solana programs have no explorer ABI; instruction layouts are built in.
    Native,
}

/// Read position for [`ChainGateway::read_new_logs`]. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogCursor {
    /// Nothing read yet; the gateway anchors at the chain head.
    #[default]
    Start,
    /// Next block to read (inclusive).
    Block(u64),
    /// Newest transaction signature already read.
    Signature(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaPoolInit {
    pub signature: String,
    pub slot: u64,
    pub accounts: Vec<SolPubkey>,
}

#[derive(Debug, Clone)]
pub enum RawEvent {
    Evm(Log),
    Solana(SolanaPoolInit),
}

#[derive(Debug, Clone)]
pub struct LogBatch {
    pub events: Vec<RawEvent>,
    pub next: LogCursor,
}

impl LogBatch {
    pub fn empty(next: LogCursor) -> Self {
        Self {
            events: Vec::new(),
            next,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyOrder {
    pub token: ChainAddress,
    /// Native base units (wei or lamports), already clamped by the caller.
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Reverted,
}

/// One connected chain.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    fn chain(&self) -> ChainId;

    /// Probes the RPC endpoint once. No internal retry.
    async fn connect(&self) -> Result<ChainHandle>;

    /// Resolves a contract ABI, retrying the explorer per its policy.
    async fn fetch_abi(&self, contract: &ChainAddress) -> Result<ContractAbi>;

    async fn read_new_logs(
        &self,
        contract: &ChainAddress,
        abi: &ContractAbi,
        event_name: &str,
        cursor: &LogCursor,
    ) -> Result<LogBatch>;

    async fn get_balance(&self, address: &ChainAddress) -> Result<U256>;

    async fn token_liquidity(&self, token: &ChainAddress, abi: &ContractAbi) -> Result<U256>;

    /// Returns once broadcast, before inclusion.
    async fn submit_buy(&self, order: &BuyOrder) -> Result<TxId>;

    async fn transaction_status(&self, tx: &TxId) -> Result<TxStatus>;
}
