use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use snipe_core::config::ExplorerConfig;
use snipe_core::{ChainId, Error, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Etherscan-style `getabi` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl ExplorerResponse {
    pub fn is_success(&self) -> bool {
        self.status == "1"
    }

    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait ExplorerApi: Send + Sync {
    async fn get_abi(&self, address: Address) -> AnyResult<ExplorerResponse>;
}

pub struct HttpExplorer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpExplorer {
    pub fn new(base_url: String, api_key: Option<String>, timeout_ms: u64) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl ExplorerApi for HttpExplorer {
    async fn get_abi(&self, address: Address) -> AnyResult<ExplorerResponse> {
        let address = address.to_string();
        let mut query = vec![
            ("module", "contract"),
            ("action", "getabi"),
            ("address", address.as_str()),
        ];
        if let Some(key) = self.api_key.as_deref() {
            query.push(("apikey", key));
        }
        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<ExplorerResponse>()
            .await?;
        Ok(response)
    }
}

/// Explorer ABI lookups with fixed-delay retry and a bounded cache of
/// successful results.
pub struct AbiFetcher {
    chain: ChainId,
    api: Arc<dyn ExplorerApi>,
    retries: u32,
    retry_delay: Duration,
    cache: Mutex<LruCache<Address, JsonAbi>>,
}

impl AbiFetcher {
    pub fn new(chain: ChainId, api: Arc<dyn ExplorerApi>, cfg: &ExplorerConfig) -> Self {
        let capacity = NonZeroUsize::new(cfg.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            chain,
            api,
            retries: cfg.retries.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn fetch(&self, contract: Address) -> Result<JsonAbi> {
        if let Some(abi) = self.cache.lock().await.get(&contract) {
            return Ok(abi.clone());
        }

        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match self.api.get_abi(contract).await {
                Ok(response) if response.is_success() => {
                    let abi = parse_abi(&response.result_text()).map_err(|err| {
                        Error::AbiFetch {
                            chain: self.chain,
                            contract: contract.to_string(),
                            attempts: attempt,
                            reason: err.to_string(),
                        }
                    })?;
                    info!(chain = %self.chain, %contract, attempt, "abi fetched");
                    self.cache.lock().await.put(contract, abi.clone());
                    return Ok(abi);
                }
                Ok(response) => {
                    last_error = format!(
                        "status {} ({}): {}",
                        response.status,
                        response.message,
                        response.result_text()
                    );
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
            warn!(
                chain = %self.chain,
                %contract,
                attempt,
                retries = self.retries,
                error = %last_error,
                "abi fetch attempt failed"
            );
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(Error::AbiFetch {
            chain: self.chain,
            contract: contract.to_string(),
            attempts: self.retries,
            reason: last_error,
        })
    }
}

fn parse_abi(raw: &str) -> AnyResult<JsonAbi> {
    serde_json::from_str(raw).map_err(|err| anyhow!("malformed abi json: {err}"))
}
