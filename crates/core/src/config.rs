use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::ChainId;
use crate::utils::{
    is_valid_evm_address, is_valid_evm_private_key, mask_secret, parse_decimal_amount,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: ChainId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Literal RPC endpoint; takes precedence over `rpc_url_env`.
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub rpc_url_env: Option<String>,
    #[serde(default)]
    pub explorer_api_base: Option<String>,
    #[serde(default)]
    pub explorer_api_key_env: Option<String>,
    /// DEX factory contract (EVM) or AMM program id (Solana).
    pub factory: String,
    pub pair_event: String,
    #[serde(default)]
    pub router: Option<String>,
    #[serde(default)]
    pub wrapped_native: Option<String>,
    #[serde(default)]
    pub base_tokens: Vec<String>,
    /// Solana only: account receiving the purchase transfer.
    #[serde(default)]
    pub purchase_destination: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_seen_pairs_capacity")]
    pub seen_pairs_capacity: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_abi_retries")]
    pub retries: u32,
    #[serde(default = "default_abi_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_abi_cache_capacity")]
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_gate_concurrency")]
    pub max_concurrent_checks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
    #[serde(default = "default_gas_mode")]
    pub gas_mode: String,
    /// Zero leaves fee estimation to the node.
    #[serde(default)]
    pub max_fee_gwei: u64,
    #[serde(default)]
    pub max_priority_gwei: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_confirmation")]
    pub confirmation: String,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_sweep_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_known_tokens_capacity")]
    pub known_tokens_capacity: usize,
    #[serde(default = "default_candidate_cache_capacity")]
    pub candidate_cache_capacity: usize,
    #[serde(default = "default_candidate_ttl_ms")]
    pub candidate_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl AppConfig {
    /// Reads an optional TOML file, then `SNIPER__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|chain| chain.enabled)
    }

    pub fn chain(&self, id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.id == id)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            watcher: WatcherConfig::default(),
            explorer: ExplorerConfig::default(),
            gate: GateConfig::default(),
            executor: ExecutorConfig::default(),
            sweep: SweepConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            seen_pairs_capacity: default_seen_pairs_capacity(),
            channel_capacity: default_channel_capacity(),
            max_block_range: default_max_block_range(),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            retries: default_abi_retries(),
            retry_delay_ms: default_abi_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            cache_capacity: default_abi_cache_capacity(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_gate_call_timeout_ms(),
            max_concurrent_checks: default_gate_concurrency(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent_trades: default_max_concurrent_trades(),
            gas_mode: default_gas_mode(),
            max_fee_gwei: 0,
            max_priority_gwei: 0,
            gas_limit: default_gas_limit(),
            deadline_secs: default_deadline_secs(),
            confirmation: default_confirmation(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sweep_interval_ms(),
            cooldown_ms: default_sweep_cooldown_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            known_tokens_capacity: default_known_tokens_capacity(),
            candidate_cache_capacity: default_candidate_cache_capacity(),
            candidate_ttl_ms: default_candidate_ttl_ms(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_bind: default_metrics_bind(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig {
            id: ChainId::Eth,
            enabled: true,
            rpc_url: None,
            rpc_url_env: Some("INFURA_URL".to_string()),
            explorer_api_base: Some("https://api.etherscan.io/api".to_string()),
            explorer_api_key_env: Some("ETHERSCAN_API_KEY".to_string()),
            factory: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string(),
            pair_event: "PairCreated".to_string(),
            router: Some("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string()),
            wrapped_native: Some("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string()),
            base_tokens: vec![
                "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
                "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
                "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
                "0x6B175474E89094C44Da98b954EedeAC495271d0F".to_string(),
            ],
            purchase_destination: None,
        },
        ChainConfig {
            id: ChainId::Bsc,
            enabled: true,
            rpc_url: None,
            rpc_url_env: Some("BSC_NODE_URL".to_string()),
            explorer_api_base: Some("https://api.bscscan.com/api".to_string()),
            explorer_api_key_env: Some("BSCSCAN_API_KEY".to_string()),
            factory: "0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73".to_string(),
            pair_event: "PairCreated".to_string(),
            router: Some("0x10ED43C718714eb63d5aA57B78B54704E256024E".to_string()),
            wrapped_native: Some("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c".to_string()),
            base_tokens: vec![
                "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c".to_string(),
                "0xe9e7CEA3DedcA5984780Bafc599bD69ADd087D56".to_string(),
                "0x55d398326f99059fF775485246999027B3197955".to_string(),
            ],
            purchase_destination: None,
        },
        ChainConfig {
            id: ChainId::Sol,
            enabled: false,
            rpc_url: None,
            rpc_url_env: Some("SOLANA_RPC_URL".to_string()),
            explorer_api_base: None,
            explorer_api_key_env: None,
            factory: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
            pair_event: "initialize2".to_string(),
            router: None,
            wrapped_native: Some("So11111111111111111111111111111111111111112".to_string()),
            base_tokens: vec![
                "So11111111111111111111111111111111111111112".to_string(),
                "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            ],
            purchase_destination: None,
        },
    ]
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_seen_pairs_capacity() -> usize {
    100_000
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_abi_retries() -> u32 {
    3
}

fn default_abi_retry_delay_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_abi_cache_capacity() -> usize {
    256
}

fn default_gate_call_timeout_ms() -> u64 {
    60_000
}

fn default_gate_concurrency() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_max_concurrent_trades() -> usize {
    4
}

fn default_gas_mode() -> String {
    "eip1559".to_string()
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_confirmation() -> String {
    "submitted".to_string()
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

fn default_receipt_timeout_ms() -> u64 {
    120_000
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

fn default_sweep_cooldown_ms() -> u64 {
    60_000
}

fn default_shutdown_grace_ms() -> u64 {
    30_000
}

fn default_known_tokens_capacity() -> usize {
    100_000
}

fn default_candidate_cache_capacity() -> usize {
    10_000
}

fn default_candidate_ttl_ms() -> u64 {
    3_600_000
}

fn default_metrics_bind() -> String {
    "127.0.0.1:9898".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_MAX_INVESTMENT_AMOUNT: &str = "0.01";
const INFURA_MAINNET_BASE: &str = "https://mainnet.infura.io/v3/";

/// Endpoint and explorer key resolved for one enabled chain.
#[derive(Clone)]
pub struct ChainSecrets {
    pub rpc_url: String,
    pub explorer_api_key: Option<String>,
}

impl fmt::Debug for ChainSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSecrets")
            .field("rpc_url", &self.rpc_url)
            .field(
                "explorer_api_key",
                &self.explorer_api_key.as_deref().map(mask_secret),
            )
            .finish()
    }
}

/// Wallet material and per-chain secrets sourced from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub wallet_address: Option<Address>,
    pub private_key: Option<String>,
    pub solana_private_key: Option<String>,
    pub max_investment_amount: String,
    pub chains: HashMap<ChainId, ChainSecrets>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("wallet_address", &self.wallet_address)
            .field("private_key", &self.private_key.as_deref().map(mask_secret))
            .field(
                "solana_private_key",
                &self.solana_private_key.as_deref().map(mask_secret),
            )
            .field("max_investment_amount", &self.max_investment_amount)
            .field("chains", &self.chains)
            .finish()
    }
}

impl Credentials {
    pub fn from_env(cfg: &AppConfig) -> Result<Self> {
        Self::from_lookup(cfg, |key| std::env::var(key).ok())
    }

    /// Resolves every credential the enabled chains need and reports all
    /// missing or malformed variables in one error.
    pub fn from_lookup<F>(cfg: &AppConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(normalize_env);
        let mut problems = Vec::new();

        let max_investment_amount = get("MAX_INVESTMENT_AMOUNT")
            .unwrap_or_else(|| DEFAULT_MAX_INVESTMENT_AMOUNT.to_string());
        match parse_decimal_amount(&max_investment_amount, 18) {
            Ok(value) if !value.is_zero() => {}
            _ => problems.push("MAX_INVESTMENT_AMOUNT (must be a positive decimal)".to_string()),
        }

        let needs_evm = cfg.enabled_chains().any(|chain| chain.id.is_evm());
        let needs_solana = cfg.enabled_chains().any(|chain| !chain.id.is_evm());

        let mut wallet_address = None;
        let mut private_key = None;
        if needs_evm {
            let key = get("PRIVATE_KEY");
            let address = get("WALLET_ADDRESS");
            match key.as_deref() {
                None => problems.push("PRIVATE_KEY".to_string()),
                Some(raw) if !is_valid_evm_private_key(raw) => {
                    problems.push("PRIVATE_KEY (expected 64 hex characters)".to_string())
                }
                Some(_) => {}
            }
            match address.as_deref() {
                None => problems.push("WALLET_ADDRESS".to_string()),
                Some(raw) if !is_valid_evm_address(raw) => {
                    problems.push("WALLET_ADDRESS (expected 0x + 40 hex characters)".to_string())
                }
                Some(raw) => wallet_address = Address::from_str(raw).ok(),
            }
            if let (Some(raw_key), Some(expected)) = (key.as_deref(), wallet_address) {
                if is_valid_evm_private_key(raw_key) {
                    match PrivateKeySigner::from_str(raw_key.trim_start_matches("0x")) {
                        Ok(signer) if signer.address() == expected => {}
                        Ok(_) => problems
                            .push("WALLET_ADDRESS (does not match PRIVATE_KEY)".to_string()),
                        Err(_) => problems.push("PRIVATE_KEY (not a valid secp256k1 key)".to_string()),
                    }
                }
            }
            private_key = key;
        }

        let mut solana_private_key = None;
        if needs_solana {
            match get("SOLANA_PRIVATE_KEY") {
                None => problems.push("SOLANA_PRIVATE_KEY".to_string()),
                Some(raw) => {
                    let valid = bs58::decode(&raw)
                        .into_vec()
                        .map(|bytes| bytes.len() == 64)
                        .unwrap_or(false);
                    if valid {
                        solana_private_key = Some(raw);
                    } else {
                        problems.push(
                            "SOLANA_PRIVATE_KEY (expected base58 64-byte keypair)".to_string(),
                        );
                    }
                }
            }
        }

        let mut chains = HashMap::new();
        for chain in cfg.enabled_chains() {
            let rpc_url = resolve_rpc_url(chain, &get);
            if rpc_url.is_none() {
                let name = chain
                    .rpc_url_env
                    .clone()
                    .unwrap_or_else(|| format!("rpc_url for {}", chain.id));
                if chain.id == ChainId::Eth {
                    problems.push(format!("{name} or INFURA_PROJECT_ID"));
                } else {
                    problems.push(name);
                }
            }
            let explorer_api_key = match chain.explorer_api_key_env.as_deref() {
                Some(var) => {
                    let value = get(var);
                    if value.is_none() {
                        problems.push(var.to_string());
                    }
                    value
                }
                None => None,
            };
            if chain.id == ChainId::Sol && chain.purchase_destination.is_none() {
                problems.push("chains[sol].purchase_destination".to_string());
            }
            if let Some(rpc_url) = rpc_url {
                chains.insert(
                    chain.id,
                    ChainSecrets {
                        rpc_url,
                        explorer_api_key,
                    },
                );
            }
        }

        if !problems.is_empty() {
            return Err(Error::MissingEnv(problems));
        }

        Ok(Self {
            wallet_address,
            private_key,
            solana_private_key,
            max_investment_amount,
            chains,
        })
    }
}

fn resolve_rpc_url<F>(chain: &ChainConfig, get: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = chain.rpc_url.clone().and_then(normalize_env) {
        return Some(url);
    }
    if let Some(url) = chain.rpc_url_env.as_deref().and_then(get) {
        return Some(url);
    }
    if chain.id == ChainId::Eth {
        return get("INFURA_PROJECT_ID").map(|id| format!("{INFURA_MAINNET_BASE}{id}"));
    }
    None
}

fn normalize_env(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
