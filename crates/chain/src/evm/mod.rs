pub mod abi;
pub mod fees;
pub mod nonce;
pub mod sender;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxKind, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::transaction::TransactionInput;
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use anyhow::anyhow;
use async_trait::async_trait;
use snipe_core::config::{AppConfig, ChainConfig, ChainSecrets, Credentials};
use snipe_core::types::{ChainAddress, TxId};
use snipe_core::utils::{now_ms, parse_address};
use snipe_core::{ChainId, Error, Result};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::explorer::{AbiFetcher, HttpExplorer};
use crate::gateway::{
    BuyOrder, ChainGateway, ChainHandle, ContractAbi, LogBatch, LogCursor, RawEvent, TxStatus,
};
use abi::{IUniswapV2Router02, IERC20};
use fees::FeeStrategy;
use nonce::NonceManager;
use sender::TxSender;

/// Router and transaction parameters for one EVM chain.
#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub router: Address,
    pub wrapped_native: Address,
    pub gas_limit: u64,
    pub deadline_secs: u64,
    pub max_block_range: u64,
    pub fees: FeeStrategy,
}

impl EvmSettings {
    pub fn from_config(chain: &ChainConfig, cfg: &AppConfig) -> Result<Self> {
        let router = chain
            .router
            .as_deref()
            .ok_or_else(|| anyhow!("chains[{}].router is required", chain.id))?;
        let wrapped_native = chain
            .wrapped_native
            .as_deref()
            .ok_or_else(|| anyhow!("chains[{}].wrapped_native is required", chain.id))?;
        Ok(Self {
            router: parse_address(router)?,
            wrapped_native: parse_address(wrapped_native)?,
            gas_limit: cfg.executor.gas_limit,
            deadline_secs: cfg.executor.deadline_secs,
            max_block_range: cfg.watcher.max_block_range.max(1),
            fees: FeeStrategy::from_config(&cfg.executor)?,
        })
    }
}

/// Shared gateway for every EVM chain, parameterised by RPC and explorer.
pub struct EvmGateway {
    chain: ChainId,
    rpc_url: String,
    has_explorer_key: bool,
    provider: DynProvider,
    wallet: Address,
    abi: AbiFetcher,
    settings: EvmSettings,
    nonces: NonceManager,
    sender: TxSender,
    connected: AtomicBool,
}

impl EvmGateway {
    pub fn new(
        chain: ChainId,
        rpc_url: String,
        has_explorer_key: bool,
        provider: DynProvider,
        wallet: Address,
        abi: AbiFetcher,
        settings: EvmSettings,
    ) -> Self {
        let sender = TxSender::new(chain, provider.clone());
        Self {
            chain,
            rpc_url,
            has_explorer_key,
            provider,
            wallet,
            abi,
            settings,
            nonces: NonceManager::new(),
            sender,
            connected: AtomicBool::new(false),
        }
    }

    /// Builds a signing provider and explorer client from configuration.
    pub async fn from_config(
        chain: &ChainConfig,
        secrets: &ChainSecrets,
        creds: &Credentials,
        cfg: &AppConfig,
    ) -> Result<Self> {
        let key = creds
            .private_key
            .as_deref()
            .ok_or_else(|| Error::MissingEnv(vec!["PRIVATE_KEY".to_string()]))?;
        let signer = PrivateKeySigner::from_str(key.trim().trim_start_matches("0x"))
            .map_err(|err| anyhow!("invalid PRIVATE_KEY: {err}"))?;
        let wallet = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&secrets.rpc_url)
            .await
            .map_err(|err| Error::connection(chain.id, err))?
            .erased();

        let base_url = chain
            .explorer_api_base
            .clone()
            .ok_or_else(|| anyhow!("chains[{}].explorer_api_base is required", chain.id))?;
        let explorer = HttpExplorer::new(
            base_url,
            secrets.explorer_api_key.clone(),
            cfg.explorer.request_timeout_ms,
        )?;
        let abi = AbiFetcher::new(chain.id, Arc::new(explorer), &cfg.explorer);
        let settings = EvmSettings::from_config(chain, cfg)?;

        Ok(Self::new(
            chain.id,
            secrets.rpc_url.clone(),
            secrets.explorer_api_key.is_some(),
            provider,
            wallet,
            abi,
            settings,
        ))
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    /// Result of the most recent [`ChainGateway::connect`] check.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn evm_address(&self, address: &ChainAddress) -> Result<Address> {
        address.as_evm().ok_or_else(|| {
            Error::Anyhow(anyhow!("{} gateway got non-evm address {address}", self.chain))
        })
    }

    fn evm_abi<'a>(&self, abi: &'a ContractAbi) -> Result<&'a alloy::json_abi::JsonAbi> {
        match abi {
            ContractAbi::Evm(abi) => Ok(abi),
            ContractAbi::Native => Err(Error::decode(self.chain, "expected an evm abi")),
        }
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> Result<ChainHandle> {
        match self.provider.get_block_number().await {
            Ok(head) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(chain = %self.chain, head, "connected");
                if !self.nonces.is_synced() {
                    if let Err(err) = self.nonces.sync(&self.provider, self.wallet).await {
                        warn!(chain = %self.chain, ?err, "nonce sync failed");
                    }
                }
                Ok(ChainHandle {
                    chain: self.chain,
                    rpc_url: self.rpc_url.clone(),
                    has_explorer_key: self.has_explorer_key,
                    connected: true,
                    checked_at_ms: now_ms(),
                })
            }
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                error!(chain = %self.chain, %err, "connection failed");
                Err(Error::connection(self.chain, err))
            }
        }
    }

    async fn fetch_abi(&self, contract: &ChainAddress) -> Result<ContractAbi> {
        let address = self.evm_address(contract)?;
        Ok(ContractAbi::Evm(self.abi.fetch(address).await?))
    }

    async fn read_new_logs(
        &self,
        contract: &ChainAddress,
        abi: &ContractAbi,
        event_name: &str,
        cursor: &LogCursor,
    ) -> Result<LogBatch> {
        let address = self.evm_address(contract)?;
        let event = self
            .evm_abi(abi)?
            .event(event_name)
            .and_then(|events| events.first())
            .ok_or_else(|| Error::decode(self.chain, format!("event {event_name} not in abi")))?;

        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|err| Error::connection(self.chain, err))?;
        let from = match cursor {
            LogCursor::Start => head,
            LogCursor::Block(next) => *next,
            LogCursor::Signature(_) => {
                return Err(Error::decode(self.chain, "signature cursor on an evm chain"))
            }
        };
        if from > head {
            return Ok(LogBatch::empty(LogCursor::Block(from)));
        }
        let span = self.settings.max_block_range.saturating_sub(1);
        let to = head.min(from.saturating_add(span));

        let filter = Filter::new()
            .address(address)
            .event_signature(event.selector())
            .from_block(from)
            .to_block(to);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|err| Error::connection(self.chain, err))?;

        Ok(LogBatch {
            events: logs.into_iter().map(RawEvent::Evm).collect(),
            next: LogCursor::Block(to + 1),
        })
    }

    async fn get_balance(&self, address: &ChainAddress) -> Result<U256> {
        let target = self.evm_address(address)?;
        self.provider
            .get_balance(target)
            .await
            .map_err(|err| Error::balance(self.chain, target, err))
    }

    async fn token_liquidity(&self, token: &ChainAddress, abi: &ContractAbi) -> Result<U256> {
        let token = self.evm_address(token)?;
        if self.evm_abi(abi)?.function("balanceOf").is_none() {
            return Err(Error::balance(self.chain, token, "abi has no balanceOf"));
        }
        let call = IERC20::balanceOfCall { account: token };
        let tx = TransactionRequest {
            to: Some(TxKind::Call(token)),
            input: TransactionInput::new(call.abi_encode().into()),
            ..Default::default()
        };
        let data = self
            .provider
            .call(tx)
            .await
            .map_err(|err| Error::balance(self.chain, token, err))?;
        IERC20::balanceOfCall::abi_decode_returns(&data)
            .map_err(|err| Error::balance(self.chain, token, format!("decode failed: {err}")))
    }

    async fn submit_buy(&self, order: &BuyOrder) -> Result<TxId> {
        let token = self.evm_address(&order.token)?;
        if !self.nonces.is_synced() {
            self.nonces
                .sync(&self.provider, self.wallet)
                .await
                .map_err(|err| Error::transaction(self.chain, format!("nonce sync: {err}")))?;
        }

        let deadline = now_ms() / 1_000 + self.settings.deadline_secs;
        let call = IUniswapV2Router02::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
            amountOutMin: U256::ZERO,
            path: vec![self.settings.wrapped_native, token],
            to: self.wallet,
            deadline: U256::from(deadline),
        };
        let mut tx = TransactionRequest {
            from: Some(self.wallet),
            to: Some(TxKind::Call(self.settings.router)),
            input: TransactionInput::new(call.abi_encode().into()),
            value: Some(order.amount),
            gas: Some(self.settings.gas_limit),
            nonce: Some(self.nonces.next_nonce()),
            ..Default::default()
        };
        self.settings.fees.apply(&mut tx);

        match self.sender.send(tx).await {
            Ok(hash) => Ok(TxId(hash.to_string())),
            Err(err) => {
                self.nonces.invalidate();
                Err(Error::transaction(self.chain, err))
            }
        }
    }

    async fn transaction_status(&self, tx: &TxId) -> Result<TxStatus> {
        let hash = B256::from_str(&tx.0)
            .map_err(|err| Error::transaction(self.chain, format!("bad tx hash {tx}: {err}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|err| Error::connection(self.chain, err))?;
        Ok(match receipt {
            None => TxStatus::Pending,
            Some(receipt) if receipt.status() => TxStatus::Confirmed,
            Some(_) => TxStatus::Reverted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{ExplorerApi, ExplorerResponse};
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::{address, U64};
    use alloy::rpc::types::{Log, TransactionReceipt};
    use alloy::transports::mock::Asserter;
    use snipe_core::config::ExplorerConfig;
    use snipe_core::modes::GasMode;

    struct NoExplorer;

    #[async_trait]
    impl ExplorerApi for NoExplorer {
        async fn get_abi(&self, _address: Address) -> anyhow::Result<ExplorerResponse> {
            Err(anyhow!("explorer unavailable"))
        }
    }

    fn gateway(asserter: &Asserter) -> EvmGateway {
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        let abi = AbiFetcher::new(
            ChainId::Bsc,
            Arc::new(NoExplorer),
            &ExplorerConfig {
                retries: 1,
                retry_delay_ms: 0,
                request_timeout_ms: 100,
                cache_capacity: 4,
            },
        );
        let settings = EvmSettings {
            router: address!("0x10ED43C718714eb63d5aA57B78B54704E256024E"),
            wrapped_native: address!("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
            gas_limit: 300_000,
            deadline_secs: 120,
            max_block_range: 50,
            fees: FeeStrategy {
                gas_mode: GasMode::Legacy,
                max_fee_gwei: 0,
                max_priority_gwei: 0,
            },
        };
        EvmGateway::new(
            ChainId::Bsc,
            "mock".to_string(),
            true,
            provider,
            address!("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"),
            abi,
            settings,
        )
    }

    fn factory_abi() -> ContractAbi {
        ContractAbi::Evm(
            JsonAbi::parse([
                "event PairCreated(address indexed token0, address indexed token1, address pair, uint256)",
            ])
            .unwrap(),
        )
    }

    fn token_abi() -> ContractAbi {
        ContractAbi::Evm(
            JsonAbi::parse(["function balanceOf(address account) view returns (uint256)"])
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn token_liquidity_reads_balance_of_self() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        let balance = U256::from(2_000_000_000_000_000_000u128);
        asserter.push_success(&alloy::primitives::Bytes::from(
            IERC20::balanceOfCall::abi_encode_returns(&balance),
        ));

        let token = ChainAddress::Evm(address!("0x0000000000000000000000000000000000000aaa"));
        let liquidity = gateway.token_liquidity(&token, &token_abi()).await.unwrap();

        assert_eq!(liquidity, balance);
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn get_balance_reads_native_balance() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_success(&U256::from(750_000_000_000_000_000u64));
        asserter.push_failure_msg("header not found");

        let wallet = ChainAddress::Evm(gateway.wallet());
        let balance = gateway.get_balance(&wallet).await.unwrap();
        let err = gateway.get_balance(&wallet).await.unwrap_err();

        assert_eq!(balance, U256::from(750_000_000_000_000_000u64));
        assert!(matches!(err, Error::BalanceFetch { chain: ChainId::Bsc, .. }));
    }

    #[tokio::test]
    async fn token_liquidity_maps_rpc_failure() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_failure_msg("execution reverted");

        let token = ChainAddress::Evm(address!("0x0000000000000000000000000000000000000aaa"));
        let err = gateway.token_liquidity(&token, &token_abi()).await.unwrap_err();

        assert!(matches!(err, Error::BalanceFetch { chain: ChainId::Bsc, .. }));
    }

    #[tokio::test]
    async fn first_read_anchors_at_head() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_success(&U64::from(100u64));
        asserter.push_success(&Vec::<Log>::new());

        let factory = ChainAddress::Evm(address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"));
        let batch = gateway
            .read_new_logs(&factory, &factory_abi(), "PairCreated", &LogCursor::Start)
            .await
            .unwrap();

        assert!(batch.events.is_empty());
        assert_eq!(batch.next, LogCursor::Block(101));
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn block_range_is_capped() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_success(&U64::from(1_000u64));
        asserter.push_success(&Vec::<Log>::new());

        let factory = ChainAddress::Evm(address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"));
        let batch = gateway
            .read_new_logs(&factory, &factory_abi(), "PairCreated", &LogCursor::Block(10))
            .await
            .unwrap();

        assert_eq!(batch.next, LogCursor::Block(60));
    }

    #[tokio::test]
    async fn caught_up_cursor_skips_log_query() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_success(&U64::from(50u64));

        let factory = ChainAddress::Evm(address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"));
        let batch = gateway
            .read_new_logs(&factory, &factory_abi(), "PairCreated", &LogCursor::Block(51))
            .await
            .unwrap();

        assert!(batch.events.is_empty());
        assert_eq!(batch.next, LogCursor::Block(51));
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn unknown_event_is_a_decode_error() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);

        let factory = ChainAddress::Evm(address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"));
        let err = gateway
            .read_new_logs(&factory, &factory_abi(), "PoolCreated", &LogCursor::Start)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn missing_receipt_is_pending() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_success(&Option::<TransactionReceipt>::None);

        let tx = TxId(B256::repeat_byte(0x11).to_string());
        let status = gateway.transaction_status(&tx).await.unwrap();

        assert_eq!(status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn connect_reports_failure() {
        let asserter = Asserter::new();
        let gateway = gateway(&asserter);
        asserter.push_failure_msg("connection refused");

        let err = gateway.connect().await.unwrap_err();

        assert!(matches!(err, Error::Connection { chain: ChainId::Bsc, .. }));
    }
}
